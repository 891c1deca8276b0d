//! Session bootstrap and the authenticated session.
//!
//! The lifecycle has exactly two states, expressed as two types:
//! [`Bootstrapper`] (unauthenticated) consumes itself on
//! [`authenticate`](Bootstrapper::authenticate) and yields a
//! [`Session`]. Authenticated operations — device trust, the post-sync
//! sweep, the sync loop — only exist on `Session`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::client::ChatClient;
use crate::creds::{CredentialStore, Credentials};
use crate::error::ChatError;
use crate::ident::{DeviceId, UserId};
use crate::trust::TrustLedger;

/// Unauthenticated session state.
pub struct Bootstrapper {
    client: Arc<dyn ChatClient>,
    store: CredentialStore,
    password: String,
}

impl Bootstrapper {
    /// Prepare a bootstrap against the given client and credential
    /// store. The password is only used when no stored credentials
    /// exist.
    pub fn new(client: Arc<dyn ChatClient>, store: CredentialStore, password: String) -> Self {
        Self { client, store, password }
    }

    /// Establish the session identity.
    ///
    /// Stored credentials are adopted directly, with no network
    /// round-trip. Otherwise a password login runs; its failure is
    /// fatal and propagates to the caller, which terminates the
    /// process — there is no retry policy.
    pub async fn authenticate(self) -> Result<Session, ChatError> {
        if let Some(credentials) = self.store.load() {
            tracing::info!(
                "logged in from stored credentials: {} on {}",
                credentials.user_id,
                credentials.device_id
            );
            self.client.restore(credentials.clone()).await;
            return Ok(Session::new(self.client, credentials));
        }

        let credentials = self.client.login(&self.password).await?;
        tracing::info!("logged in with a password; saving session details to disk");

        if let Err(err) = self.store.save(&credentials) {
            // Not fatal: the session works in memory and the next
            // restart logs in fresh.
            tracing::warn!("could not persist credentials: {err}");
        }

        Ok(Session::new(self.client, credentials))
    }
}

/// An authenticated session.
///
/// Owns the trust ledger explicitly — trust state is a value here, not
/// hidden client-object state — and drives the two cooperating
/// futures: the continuous sync loop and the one-time post-sync trust
/// sweep.
pub struct Session {
    client: Arc<dyn ChatClient>,
    identity: Credentials,
    ledger: Mutex<TrustLedger>,
}

impl Session {
    fn new(client: Arc<dyn ChatClient>, identity: Credentials) -> Self {
        let ledger =
            TrustLedger::new(identity.user_id.clone(), identity.device_id.clone());
        Self { client, identity, ledger: Mutex::new(ledger) }
    }

    /// Handle to the underlying client capability.
    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    /// The authenticated user.
    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }

    /// The local device.
    pub fn device_id(&self) -> &DeviceId {
        &self.identity.device_id
    }

    /// Number of devices trusted so far in this process.
    pub fn trusted_count(&self) -> usize {
        self.lock_ledger().trusted_count()
    }

    /// Trust every device of a user, idempotently.
    ///
    /// The ledger decides synchronously which devices still need
    /// verification; the external calls happen afterwards, so the lock
    /// is never held across I/O. Devices outside the optional
    /// allow-list, the local device, and already-trusted devices are
    /// skipped without a verification call.
    pub async fn trust_all_devices(
        &self,
        user: &UserId,
        allowed: Option<&HashSet<DeviceId>>,
    ) {
        let devices = self.client.devices(user);
        let admitted = self.lock_ledger().admit(user, &devices, allowed);

        for device in admitted {
            self.client.verify_device(&device).await;
            tracing::debug!("trusting {} from user {}", device.id, user);
        }
    }

    /// Trust every device of every member of every known room.
    ///
    /// A room with no known members signals a likely protocol
    /// inconsistency; it is logged and the sweep continues.
    pub async fn trust_sweep(&self) {
        for room in self.client.rooms() {
            if room.members.is_empty() {
                tracing::error!("no users in room: {}", room.name);
                continue;
            }
            for user in &room.members {
                self.trust_all_devices(user, None).await;
            }
        }
    }

    /// One-time bootstrap completion: wait for the first full sync,
    /// upload pending encryption keys if the client asks for it, then
    /// run the member-trust sweep over every known room.
    pub async fn after_first_sync(&self) {
        self.client.first_sync_completed().await;

        if self.client.should_upload_keys() {
            if let Err(err) = self.client.upload_keys().await {
                tracing::error!("key upload failed: {err}");
            }
        }

        self.trust_sweep().await;
    }

    /// Run the session: the continuous sync loop and the post-sync
    /// bootstrap sweep as two cooperating futures on this task.
    ///
    /// Event callbacks are dispatched inline by the sync loop, so the
    /// sweep and live membership events may redundantly trust the same
    /// devices; ledger idempotence makes that safe. Completes when the
    /// sync loop ends (cancellation or fatal protocol error).
    pub async fn run(&self, poll_interval: Duration) -> Result<(), ChatError> {
        let sync = self.client.sync_forever(poll_interval, true);
        let bootstrap = self.after_first_sync();

        let (sync_result, ()) = tokio::join!(sync, bootstrap);
        sync_result
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, TrustLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
