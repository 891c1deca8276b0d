//! The external chat-client capability.
//!
//! Everything this crate knows about the encrypted messaging protocol
//! is reached through [`ChatClient`]. The external library owns session
//! establishment, message encryption, sync-token management, and the
//! device store; this crate only orchestrates around those
//! capabilities. Tests and the development loopback substitute
//! [`MemoryClient`](crate::MemoryClient) at the same seam.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::creds::Credentials;
use crate::error::ChatError;
use crate::event::EventSink;
use crate::ident::{DeviceId, RoomId, UserId};

/// Opaque cryptographic key material attached to a device.
///
/// This core never inspects the bytes; they are passed through to the
/// external trust-verification call.
///
/// # Security
///
/// The `Debug` impl redacts the bytes to keep key material out of logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial(Vec<u8>);

impl KeyMaterial {
    /// Wrap raw key material.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw bytes, for the external verification call.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial(<redacted {} bytes>)", self.0.len())
    }
}

/// A remote device belonging to a user, as exposed by the client's
/// device store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Device identifier, unique per owner.
    pub id: DeviceId,
    /// User the device belongs to.
    pub owner: UserId,
    /// Identity key material, opaque to this core.
    pub keys: KeyMaterial,
}

/// A room as exposed by the external client.
///
/// Owned by the client; this core only reads membership and issues
/// join/trust side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Whether the room is end-to-end encrypted.
    pub encrypted: bool,
    /// Current member user ids.
    pub members: Vec<UserId>,
}

/// Capability set consumed from the external encrypted-messaging
/// client library.
///
/// The single client instance behind this trait is shared by the sync
/// loop and the webhook path; implementations serialize their own
/// internal state.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Password login. Mints fresh credentials on success.
    async fn login(&self, password: &str) -> Result<Credentials, ChatError>;

    /// Adopt previously stored credentials without a network
    /// round-trip.
    async fn restore(&self, credentials: Credentials);

    /// All devices currently known for a user (the device-store view).
    fn devices(&self, user: &UserId) -> Vec<Device>;

    /// Mark a device's keys as verified in the external store.
    async fn verify_device(&self, device: &Device);

    /// Join a room.
    async fn join(&self, room: &RoomId) -> Result<(), ChatError>;

    /// Snapshot of all rooms currently known to the client.
    fn rooms(&self) -> Vec<Room>;

    /// Look up a single room.
    fn room(&self, room: &RoomId) -> Option<Room>;

    /// One-shot barrier completing when the first full sync has
    /// finished and the room/membership view is up to date.
    async fn first_sync_completed(&self);

    /// Whether the client still has one-time keys pending upload.
    fn should_upload_keys(&self) -> bool;

    /// Upload pending one-time encryption keys.
    async fn upload_keys(&self) -> Result<(), ChatError>;

    /// Run the continuous long-poll sync loop until cancelled or a
    /// fatal protocol error ends it. Event callbacks registered via
    /// [`register_sink`](Self::register_sink) are dispatched inline
    /// from this loop.
    async fn sync_forever(
        &self,
        poll_interval: Duration,
        full_state: bool,
    ) -> Result<(), ChatError>;

    /// Send a markdown message into a room.
    async fn send_message(&self, room: &RoomId, markdown: &str) -> Result<(), ChatError>;

    /// Register the sink receiving invite, membership, and
    /// key-verification callbacks. A later registration replaces an
    /// earlier one.
    fn register_sink(&self, sink: Arc<dyn EventSink>);

    /// Release the client. Part of unconditional shutdown cleanup.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_material_debug_is_redacted() {
        let keys = KeyMaterial::new(b"ed25519 identity key".to_vec());
        let rendered = format!("{keys:?}");
        assert!(!rendered.contains("ed25519"));
        assert!(rendered.contains("20 bytes"));
    }
}
