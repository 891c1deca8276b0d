//! Room membership event handling.
//!
//! [`RoomEventHandler`] is the [`EventSink`] registered with the
//! external client. It joins invited rooms, trusts member devices as
//! membership changes arrive, and acknowledges key-verification
//! handshake stages.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::Room;
use crate::error::ChatError;
use crate::event::{EventSink, Invite, Membership, MembershipChange, VerificationStage};
use crate::session::Session;

/// Event sink reacting to invites, membership changes, and
/// key-verification events.
pub struct RoomEventHandler {
    session: Arc<Session>,
}

impl RoomEventHandler {
    /// Create a handler acting on behalf of the given session.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Acknowledge a key-verification sub-stage.
    ///
    /// TODO: drive the SAS handshake to completion (accept, key, and
    /// MAC replies) instead of acknowledging each stage. Until then the
    /// handshake never completes; the remote side eventually times out.
    fn acknowledge_verification(stage: &VerificationStage) -> Result<(), ChatError> {
        match stage {
            VerificationStage::Start => tracing::debug!("key verification: start"),
            VerificationStage::Key => tracing::debug!("key verification: key exchange"),
            VerificationStage::Mac => tracing::debug!("key verification: mac"),
            VerificationStage::Cancel => tracing::debug!("key verification: cancelled"),
            VerificationStage::Unknown(kind) => {
                tracing::debug!("key verification: unknown stage {kind}");
            },
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for RoomEventHandler {
    /// Join the invited room, then trust every device of every member
    /// already present — the room may have history and members at
    /// invite time.
    async fn on_invite(&self, room: &Room, invite: &Invite) {
        if let Err(err) = self.session.client().join(&invite.room_id).await {
            tracing::warn!("could not accept invite from {}: {err}", invite.inviter);
            return;
        }
        tracing::debug!("room {} is encrypted: {}", room.name, room.encrypted);

        for user in &room.members {
            self.session.trust_all_devices(user, None).await;
        }
    }

    /// Trust the affected user's devices on a join; every other
    /// membership state is logged only.
    async fn on_membership_changed(&self, room: &Room, change: &MembershipChange) {
        tracing::info!(
            "membership in {}: {} is now {}",
            room.name,
            change.user_id,
            change.membership
        );

        if change.membership == Membership::Join {
            self.session.trust_all_devices(&change.user_id, None).await;
        }
    }

    /// Acknowledge the handshake stage; a failure inside the handling
    /// is caught and logged as a generic verification error, never
    /// propagated.
    async fn on_key_verification(&self, stage: &VerificationStage) {
        if let Err(err) = Self::acknowledge_verification(stage) {
            tracing::error!("an error occurred during key verification: {err}");
        }
    }
}
