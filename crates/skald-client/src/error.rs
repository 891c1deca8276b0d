//! Client error types.

use thiserror::Error;

use crate::ident::RoomId;

/// Errors surfaced by the external chat-client capability.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// The homeserver rejected the password login.
    #[error("login rejected: {reason}")]
    LoginRejected {
        /// Server-provided rejection reason.
        reason: String,
    },

    /// Joining a room failed.
    #[error("could not join {room}: {reason}")]
    JoinFailed {
        /// Room the join was attempted on.
        room: RoomId,
        /// Description of the failure.
        reason: String,
    },

    /// Sending a message into a room failed.
    #[error("could not send to {room}: {reason}")]
    SendFailed {
        /// Room the send was attempted on.
        room: RoomId,
        /// Description of the failure.
        reason: String,
    },

    /// Uploading one-time encryption keys failed.
    #[error("key upload failed: {reason}")]
    KeyUpload {
        /// Description of the failure.
        reason: String,
    },

    /// The continuous sync loop ended with a protocol error.
    #[error("sync ended: {reason}")]
    SyncEnded {
        /// Description of the failure.
        reason: String,
    },

    /// An operation requiring an authenticated session was attempted
    /// before login completed.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The client has no record of the room.
    #[error("unknown room: {0}")]
    UnknownRoom(RoomId),
}

impl ChatError {
    /// Returns true if this error must terminate the process.
    ///
    /// Only the login rejection and a sync loop dying on a protocol
    /// error are fatal; everything else degrades to a log line and a
    /// safe default action.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::LoginRejected { .. } | Self::SyncEnded { .. } => true,

            Self::JoinFailed { .. }
            | Self::SendFailed { .. }
            | Self::KeyUpload { .. }
            | Self::NotAuthenticated
            | Self::UnknownRoom(_) => false,
        }
    }
}
