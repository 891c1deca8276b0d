//! Events delivered by the external client's sync loop.
//!
//! The external library dispatches room events as callbacks. The core
//! registers an [`EventSink`] implementation; tests drive sinks
//! directly through the scripted in-memory client.

use std::fmt;

use async_trait::async_trait;

use crate::client::Room;
use crate::ident::{RoomId, UserId};

/// An invitation for our user to join a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    /// Room we were invited to.
    pub room_id: RoomId,
    /// User who sent the invitation.
    pub inviter: UserId,
}

/// Membership states a room member event can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// The user joined the room.
    Join,
    /// The user left the room.
    Leave,
    /// The user was banned from the room.
    Ban,
    /// The user knocked, requesting entry.
    Knock,
    /// The user was invited.
    Invite,
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Ban => "ban",
            Self::Knock => "knock",
            Self::Invite => "invite",
        };
        f.write_str(label)
    }
}

/// A room member's membership state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// Room the change happened in.
    pub room_id: RoomId,
    /// The affected user.
    pub user_id: UserId,
    /// The new membership state.
    pub membership: Membership,
}

/// Sub-stages of the interactive key-verification handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStage {
    /// The remote side started a verification.
    Start,
    /// Key-exchange step.
    Key,
    /// MAC confirmation step.
    Mac,
    /// The remote side cancelled.
    Cancel,
    /// Unrecognized sub-stage, with the raw event type.
    Unknown(String),
}

/// Callbacks invoked inline by the sync loop.
///
/// Implementations must not block the executor: any network work
/// (joins, verification calls) suspends cooperatively.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Our user was invited to a room.
    async fn on_invite(&self, room: &Room, invite: &Invite);

    /// A member's membership state changed.
    async fn on_membership_changed(&self, room: &Room, change: &MembershipChange);

    /// A key-verification handshake event arrived.
    async fn on_key_verification(&self, stage: &VerificationStage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_display_labels() {
        assert_eq!(Membership::Join.to_string(), "join");
        assert_eq!(Membership::Knock.to_string(), "knock");
    }
}
