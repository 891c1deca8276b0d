//! In-memory chat client.
//!
//! [`MemoryClient`] implements the full [`ChatClient`] capability
//! against a scripted in-process world: no network, no cryptography.
//! It serves two roles:
//!
//! - development loopback for running the gateway without a homeserver
//! - test double: scenarios seed rooms and devices, inject events, and
//!   assert on the recorded call log
//!
//! Event delivery mirrors the real client: `deliver_*` methods invoke
//! the registered sink inline, exactly as the sync loop would.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::client::{ChatClient, Device, Room};
use crate::creds::Credentials;
use crate::error::ChatError;
use crate::event::{EventSink, Invite, Membership, MembershipChange, VerificationStage};
use crate::ident::{DeviceId, RoomId, UserId};

/// One observed capability call, in invocation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Password login was attempted.
    Login,
    /// Stored credentials were adopted.
    Restore,
    /// A room join was attempted.
    Join(RoomId),
    /// A device was marked verified.
    VerifyDevice(UserId, DeviceId),
    /// One-time keys were uploaded.
    UploadKeys,
    /// A message was sent into a room.
    Send(RoomId),
    /// The client was closed.
    Close,
}

#[derive(Clone)]
enum SyncSignal {
    Running,
    Closed,
    Failed(String),
}

struct World {
    password: String,
    login_error: Option<String>,
    login_count: u32,
    authenticated: Option<Credentials>,
    rooms: BTreeMap<RoomId, Room>,
    devices: BTreeMap<UserId, Vec<Device>>,
    joined: BTreeSet<RoomId>,
    should_upload_keys: bool,
    calls: Vec<Call>,
    messages: Vec<(RoomId, String)>,
    sink: Option<Arc<dyn EventSink>>,
}

/// Scripted in-memory implementation of [`ChatClient`].
pub struct MemoryClient {
    user_id: UserId,
    world: Mutex<World>,
    synced_tx: watch::Sender<bool>,
    sync_tx: watch::Sender<SyncSignal>,
}

impl MemoryClient {
    /// Create a client that accepts the given password for `user_id`.
    pub fn new(user_id: UserId, password: impl Into<String>) -> Self {
        let (synced_tx, _) = watch::channel(false);
        let (sync_tx, _) = watch::channel(SyncSignal::Running);

        Self {
            user_id,
            world: Mutex::new(World {
                password: password.into(),
                login_error: None,
                login_count: 0,
                authenticated: None,
                rooms: BTreeMap::new(),
                devices: BTreeMap::new(),
                joined: BTreeSet::new(),
                should_upload_keys: false,
                calls: Vec::new(),
                messages: Vec::new(),
                sink: None,
            }),
            synced_tx,
            sync_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- scripting -----------------------------------------------------

    /// Make every subsequent login fail with the given reason.
    pub fn reject_logins(&self, reason: impl Into<String>) {
        self.lock().login_error = Some(reason.into());
    }

    /// Add a room to the client's view.
    pub fn seed_room(&self, room: Room) {
        self.lock().rooms.insert(room.id.clone(), room);
    }

    /// Add a device to the device store.
    pub fn seed_device(&self, device: Device) {
        self.lock().devices.entry(device.owner.clone()).or_default().push(device);
    }

    /// Script whether the client reports pending one-time keys.
    pub fn set_should_upload_keys(&self, pending: bool) {
        self.lock().should_upload_keys = pending;
    }

    /// Complete the first-sync barrier without running the sync loop.
    pub fn complete_first_sync(&self) {
        let _ = self.synced_tx.send_replace(true);
    }

    /// End the sync loop with a fatal protocol error.
    pub fn fail_sync(&self, reason: impl Into<String>) {
        let _ = self.sync_tx.send_replace(SyncSignal::Failed(reason.into()));
    }

    /// Deliver an invite event to the registered sink, inline.
    pub async fn deliver_invite(&self, room_id: &RoomId, inviter: &UserId) {
        let (room, sink) = {
            let world = self.lock();
            (world.rooms.get(room_id).cloned(), world.sink.clone())
        };
        if let (Some(room), Some(sink)) = (room, sink) {
            let invite = Invite { room_id: room_id.clone(), inviter: inviter.clone() };
            sink.on_invite(&room, &invite).await;
        }
    }

    /// Deliver a membership-change event, updating the room's member
    /// list the way a real sync would before dispatching.
    pub async fn deliver_membership_change(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        membership: Membership,
    ) {
        let (room, sink) = {
            let mut world = self.lock();
            if let Some(room) = world.rooms.get_mut(room_id) {
                match membership {
                    Membership::Join => {
                        if !room.members.contains(user_id) {
                            room.members.push(user_id.clone());
                        }
                    },
                    Membership::Leave | Membership::Ban => {
                        room.members.retain(|member| member != user_id);
                    },
                    Membership::Knock | Membership::Invite => {},
                }
            }
            (world.rooms.get(room_id).cloned(), world.sink.clone())
        };

        if let (Some(room), Some(sink)) = (room, sink) {
            let change = MembershipChange {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
                membership,
            };
            sink.on_membership_changed(&room, &change).await;
        }
    }

    /// Deliver a key-verification event to the registered sink.
    pub async fn deliver_key_verification(&self, stage: VerificationStage) {
        let sink = self.lock().sink.clone();
        if let Some(sink) = sink {
            sink.on_key_verification(&stage).await;
        }
    }

    // --- observations --------------------------------------------------

    /// All capability calls observed so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of verification calls recorded for one device.
    pub fn verification_calls(&self, user: &UserId, device: &DeviceId) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(call, Call::VerifyDevice(u, d) if u == user && d == device)
            })
            .count()
    }

    /// Number of times the client was closed.
    pub fn close_count(&self) -> usize {
        self.lock().calls.iter().filter(|call| matches!(call, Call::Close)).count()
    }

    /// Whether a join for the room has succeeded.
    pub fn is_joined(&self, room: &RoomId) -> bool {
        self.lock().joined.contains(room)
    }

    /// Messages relayed so far, as `(room, markdown)` pairs.
    pub fn sent_messages(&self) -> Vec<(RoomId, String)> {
        self.lock().messages.clone()
    }
}

#[async_trait]
impl ChatClient for MemoryClient {
    async fn login(&self, password: &str) -> Result<Credentials, ChatError> {
        let mut world = self.lock();
        world.calls.push(Call::Login);

        if let Some(reason) = &world.login_error {
            return Err(ChatError::LoginRejected { reason: reason.clone() });
        }
        if password != world.password {
            return Err(ChatError::LoginRejected { reason: "invalid password".to_string() });
        }

        world.login_count += 1;
        let credentials = Credentials {
            access_token: format!("tok-{:08}", world.login_count),
            user_id: self.user_id.clone(),
            device_id: DeviceId::new(format!("SKALD{:05}", world.login_count)),
        };
        world.authenticated = Some(credentials.clone());
        Ok(credentials)
    }

    async fn restore(&self, credentials: Credentials) {
        let mut world = self.lock();
        world.calls.push(Call::Restore);
        world.authenticated = Some(credentials);
    }

    fn devices(&self, user: &UserId) -> Vec<Device> {
        self.lock().devices.get(user).cloned().unwrap_or_default()
    }

    async fn verify_device(&self, device: &Device) {
        let mut world = self.lock();
        world.calls.push(Call::VerifyDevice(device.owner.clone(), device.id.clone()));
    }

    async fn join(&self, room: &RoomId) -> Result<(), ChatError> {
        let mut world = self.lock();
        world.calls.push(Call::Join(room.clone()));

        if world.rooms.contains_key(room) {
            world.joined.insert(room.clone());
            Ok(())
        } else {
            Err(ChatError::UnknownRoom(room.clone()))
        }
    }

    fn rooms(&self) -> Vec<Room> {
        self.lock().rooms.values().cloned().collect()
    }

    fn room(&self, room: &RoomId) -> Option<Room> {
        self.lock().rooms.get(room).cloned()
    }

    async fn first_sync_completed(&self) {
        let mut rx = self.synced_tx.subscribe();
        let _ = rx.wait_for(|synced| *synced).await;
    }

    fn should_upload_keys(&self) -> bool {
        self.lock().should_upload_keys
    }

    async fn upload_keys(&self) -> Result<(), ChatError> {
        let mut world = self.lock();
        world.calls.push(Call::UploadKeys);
        world.should_upload_keys = false;
        Ok(())
    }

    async fn sync_forever(
        &self,
        _poll_interval: Duration,
        _full_state: bool,
    ) -> Result<(), ChatError> {
        // The first poll brings the room view up to date.
        let _ = self.synced_tx.send_replace(true);

        let mut rx = self.sync_tx.subscribe();
        let ended = rx.wait_for(|signal| !matches!(signal, SyncSignal::Running)).await;

        match ended.as_deref() {
            Ok(SyncSignal::Failed(reason)) => {
                Err(ChatError::SyncEnded { reason: reason.clone() })
            },
            _ => Ok(()),
        }
    }

    async fn send_message(&self, room: &RoomId, markdown: &str) -> Result<(), ChatError> {
        let mut world = self.lock();

        if world.authenticated.is_none() {
            return Err(ChatError::NotAuthenticated);
        }
        world.calls.push(Call::Send(room.clone()));
        if !world.rooms.contains_key(room) {
            return Err(ChatError::UnknownRoom(room.clone()));
        }

        world.messages.push((room.clone(), markdown.to_string()));
        Ok(())
    }

    fn register_sink(&self, sink: Arc<dyn EventSink>) {
        self.lock().sink = Some(sink);
    }

    async fn close(&self) {
        let mut world = self.lock();
        world.calls.push(Call::Close);
        drop(world);

        let _ = self.sync_tx.send_replace(SyncSignal::Closed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> MemoryClient {
        MemoryClient::new(UserId::new("@skald:example.org"), "hunter2")
    }

    #[tokio::test]
    async fn login_with_correct_password_mints_credentials() {
        let client = client();
        let credentials = client.login("hunter2").await.unwrap();

        assert_eq!(credentials.user_id, UserId::new("@skald:example.org"));
        assert_eq!(client.calls(), vec![Call::Login]);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_rejected() {
        let client = client();
        let err = client.login("letmein").await.unwrap_err();
        assert!(matches!(err, ChatError::LoginRejected { .. }));
    }

    #[tokio::test]
    async fn join_of_unknown_room_fails() {
        let client = client();
        let err = client.join(&RoomId::new("!nowhere:hs")).await.unwrap_err();
        assert!(matches!(err, ChatError::UnknownRoom(_)));
    }

    #[tokio::test]
    async fn sync_ends_cleanly_on_close() {
        let client = Arc::new(client());
        let sync = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client.sync_forever(Duration::from_millis(1), true).await
            })
        };

        client.close().await;
        assert!(sync.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn sync_surfaces_scripted_fatal_error() {
        let client = Arc::new(client());
        client.fail_sync("connection reset");

        let result = client.sync_forever(Duration::from_millis(1), true).await;
        assert!(matches!(result, Err(ChatError::SyncEnded { .. })));
    }

    #[tokio::test]
    async fn send_before_login_fails_gracefully() {
        let client = client();
        let err = client.send_message(&RoomId::new("!a:hs"), "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::NotAuthenticated));
    }
}
