//! Session credentials and their on-disk store.
//!
//! A successful password login yields an access token bound to a user
//! and device. The triple is persisted as a single JSON record so later
//! runs can resume the session without a network round-trip.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ident::{DeviceId, UserId};

/// Credentials identifying an authenticated session.
///
/// A loaded record is either fully present or rejected wholesale:
/// serde refuses records with missing fields, which the store maps to
/// "no stored credentials".
///
/// # Security
///
/// The `Debug` impl redacts `access_token` so the secret cannot leak
/// into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Opaque bearer token for the homeserver session.
    pub access_token: String,
    /// User the token was issued for.
    pub user_id: UserId,
    /// Device the token is bound to.
    pub device_id: DeviceId,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &format!("<redacted {} bytes>", self.access_token.len()))
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// File-backed credential store.
///
/// The record is overwritten wholesale on each save; there is no
/// concurrent writer, so a plain rewrite is sufficient.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored credentials.
    ///
    /// Returns `None` when the file is absent, unreadable, or
    /// malformed. Defects are logged and never propagate: the caller
    /// falls through to a fresh login.
    pub fn load(&self) -> Option<Credentials> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no stored credentials at {}", self.path.display());
                return None;
            },
            Err(err) => {
                tracing::error!("could not read {}: {}; logging in fresh", self.path.display(), err);
                return None;
            },
        };

        match serde_json::from_slice(&raw) {
            Ok(credentials) => Some(credentials),
            Err(err) => {
                tracing::error!(
                    "could not parse {}: {}; will overwrite on next login",
                    self.path.display(),
                    err
                );
                None
            },
        }
    }

    /// Persist credentials, replacing any previous record.
    pub fn save(&self, credentials: &Credentials) -> io::Result<()> {
        let payload = serde_json::to_vec_pretty(credentials).map_err(io::Error::from)?;
        std::fs::write(&self.path, payload)
    }
}
