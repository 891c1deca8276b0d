//! Gateway error types.

use std::io;
use std::net::SocketAddr;

use skald_client::ChatError;
use thiserror::Error;

/// Errors that stop the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The webhook listener could not bind its address.
    #[error("could not bind webhook listener on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The chat session failed: login rejection at bootstrap, or the
    /// sync loop dying on a protocol error.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// The chat task ended abnormally.
    #[error("chat task failed: {reason}")]
    ChatTask {
        /// Description of the failure.
        reason: String,
    },
}
