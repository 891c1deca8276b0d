//! Scripted scenario harness for Skald integration tests.
//!
//! A [`Scenario`] wires a [`MemoryClient`] world to a fresh working
//! directory and hands out authenticated sessions, so tests read as
//! scripts: seed rooms and devices, deliver events, assert on the
//! recorded capability calls.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skald_client::{
    Bootstrapper, ChatClient, ChatError, CredentialStore, Device, KeyMaterial, MemoryClient,
    Room, RoomEventHandler, Session,
};
use skald_client::{DeviceId, RoomId, UserId};
use skald_gateway::GatewayConfig;
use tempfile::TempDir;

/// User the harness logs in as.
pub const USER: &str = "@skald:example.org";

/// Password the scripted homeserver accepts.
pub const PASSWORD: &str = "correct-horse";

/// API key the harness gateway expects from webhook callers.
pub const API_KEY: &str = "whk_secret";

/// One scripted world: an in-memory client plus an isolated working
/// directory for the credential store.
pub struct Scenario {
    client: Arc<MemoryClient>,
    workdir: TempDir,
}

impl Scenario {
    /// Create a fresh scenario.
    pub fn new() -> io::Result<Self> {
        let client = Arc::new(MemoryClient::new(UserId::new(USER), PASSWORD));
        Ok(Self { client, workdir: tempfile::tempdir()? })
    }

    /// The scripted client.
    pub fn client(&self) -> &Arc<MemoryClient> {
        &self.client
    }

    /// Credential store rooted in this scenario's working directory.
    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(self.workdir.path().join("creds.json"))
    }

    /// Seed a room into the client's view.
    pub fn seed_room(&self, id: &str, name: &str, encrypted: bool, members: &[&str]) {
        self.client.seed_room(Room {
            id: RoomId::new(id),
            name: name.to_string(),
            encrypted,
            members: members.iter().map(|member| UserId::new(*member)).collect(),
        });
    }

    /// Seed a device with synthetic key material.
    pub fn seed_device(&self, owner: &str, device: &str) {
        self.client.seed_device(Device {
            id: DeviceId::new(device),
            owner: UserId::new(owner),
            keys: KeyMaterial::new(device.as_bytes().to_vec()),
        });
    }

    /// Bootstrap an authenticated session.
    pub async fn authenticate(&self) -> Result<Arc<Session>, ChatError> {
        let bootstrapper = Bootstrapper::new(
            Arc::clone(&self.client) as Arc<dyn ChatClient>,
            self.store(),
            PASSWORD.to_string(),
        );
        Ok(Arc::new(bootstrapper.authenticate().await?))
    }

    /// Bootstrap a session and register the membership event sink, as
    /// the gateway does after authentication.
    pub async fn connect(&self) -> Result<Arc<Session>, ChatError> {
        let session = self.authenticate().await?;
        self.client.register_sink(Arc::new(RoomEventHandler::new(Arc::clone(&session))));
        Ok(session)
    }

    /// Gateway configuration bound to an ephemeral port and this
    /// scenario's working directory.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            api_key: API_KEY.to_string(),
            password: PASSWORD.to_string(),
            credentials_file: self.workdir.path().join("creds.json"),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Poll a condition until it holds or a two-second deadline passes.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
