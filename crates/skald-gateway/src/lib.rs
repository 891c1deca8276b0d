//! Skald gateway.
//!
//! Receives inbound HTTP webhooks and relays formatted messages into
//! chat rooms through an encrypted client session.
//!
//! ## Architecture
//!
//! ```text
//! skald-gateway
//!   ├─ GatewayConfig      (bind address, API key, session settings)
//!   ├─ webhook            (axum routes: POST /{room_id})
//!   ├─ formatters         (per-service payload transforms)
//!   └─ run / run_until    (chat task vs. termination signal, cleanup)
//! skald-client
//!   ├─ Bootstrapper       (credential load or password login)
//!   ├─ Session            (trust sweep + sync loop)
//!   └─ ChatClient         (external protocol capability)
//! ```
//!
//! The webhook listener starts before authentication completes;
//! requests arriving early are answered with 503 instead of waiting.
//! Shutdown races the chat task against SIGINT/SIGTERM — whichever
//! finishes first cancels the other — and a final cleanup block stops
//! the listener and closes the client unconditionally.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod formatters;
pub mod webhook;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use error::GatewayError;
use skald_client::{Bootstrapper, ChatClient, CredentialStore, RoomEventHandler};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the webhook listener binds to.
    pub bind: SocketAddr,
    /// Shared secret webhook callers must present.
    pub api_key: String,
    /// Password for the initial login (unused once credentials are
    /// stored).
    pub password: String,
    /// Path of the persisted credentials record.
    pub credentials_file: PathBuf,
    /// Long-poll interval handed to the sync loop.
    pub poll_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 4785)),
            api_key: String::new(),
            password: String::new(),
            credentials_file: PathBuf::from("creds.json"),
            poll_interval: Duration::from_millis(30_000),
        }
    }
}

/// Run the gateway until a termination signal arrives or the chat task
/// ends on its own.
pub async fn run(config: GatewayConfig, client: Arc<dyn ChatClient>) -> Result<(), GatewayError> {
    run_until(config, client, shutdown_signal()).await
}

/// Like [`run`], with the termination condition supplied by the caller.
///
/// Two terminal conditions race: `shutdown` resolving, or the chat task
/// (bootstrap + sync loop) ending with a fatal error or completion.
/// Whichever happens first cancels the other; the cleanup block —
/// stopping the web listener and closing the client — runs
/// unconditionally, exactly once.
pub async fn run_until(
    config: GatewayConfig,
    client: Arc<dyn ChatClient>,
    shutdown: impl Future<Output = ()> + Send,
) -> Result<(), GatewayError> {
    let state = webhook::AppState::new(config.api_key.clone());
    let router = webhook::router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|source| GatewayError::Bind { addr: config.bind, source })?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("webhook listener bound on {addr}");
    }

    let (stop_web, web_stopped) = tokio::sync::oneshot::channel::<()>();
    let web = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = web_stopped.await;
            })
            .await
    });

    let mut chat = tokio::spawn(chat_task(config, Arc::clone(&client), state));

    tokio::pin!(shutdown);
    let outcome = tokio::select! {
        () = &mut shutdown => {
            tracing::info!("termination signal received; shutting down");
            chat.abort();
            let _ = (&mut chat).await;
            Ok(())
        },
        joined = &mut chat => match joined {
            Ok(result) => result,
            Err(err) => Err(GatewayError::ChatTask { reason: err.to_string() }),
        },
    };

    // Cleanup runs on every exit path.
    let _ = stop_web.send(());
    match web.await {
        Ok(Err(err)) => tracing::error!("webhook listener error: {err}"),
        Ok(Ok(())) | Err(_) => {},
    }
    client.close().await;

    if let Err(err) = &outcome {
        tracing::error!("gateway stopped: {err}");
    } else {
        tracing::info!("gateway stopped");
    }
    outcome
}

/// Bootstrap the session, expose it to the webhook path, and drive the
/// sync loop plus the post-sync trust sweep to completion.
async fn chat_task(
    config: GatewayConfig,
    client: Arc<dyn ChatClient>,
    state: webhook::AppState,
) -> Result<(), GatewayError> {
    let store = CredentialStore::new(config.credentials_file);
    let bootstrapper = Bootstrapper::new(Arc::clone(&client), store, config.password);

    let session = Arc::new(bootstrapper.authenticate().await?);
    client.register_sink(Arc::new(RoomEventHandler::new(Arc::clone(&session))));
    state.provide_session(Arc::clone(&session));

    session.run(config.poll_interval).await?;
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!("could not install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }
}
