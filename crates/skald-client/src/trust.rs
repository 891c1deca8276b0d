//! Device-trust bookkeeping.
//!
//! The ledger is a pure state machine: it decides which devices still
//! need an external verification call and records them, while the
//! caller performs the calls. Trust only grows — revocation is not
//! supported here — and the set is deliberately not persisted, so a
//! restart re-verifies everything (idempotent, not harmful).

use std::collections::HashSet;

use crate::client::Device;
use crate::ident::{DeviceId, UserId};

/// Set of `(user, device)` pairs already marked verified.
#[derive(Debug)]
pub struct TrustLedger {
    own_user: UserId,
    own_device: DeviceId,
    trusted: HashSet<(UserId, DeviceId)>,
}

impl TrustLedger {
    /// Create an empty ledger for the given local identity.
    ///
    /// The local device is excluded from trust decisions for the
    /// lifetime of the ledger.
    pub fn new(own_user: UserId, own_device: DeviceId) -> Self {
        Self { own_user, own_device, trusted: HashSet::new() }
    }

    /// Decide which of a user's devices still need verification.
    ///
    /// Skips devices outside the optional allow-list, the local device,
    /// and devices already recorded. Everything admitted is recorded
    /// immediately, so a second call with the same inputs admits
    /// nothing.
    pub fn admit(
        &mut self,
        user: &UserId,
        devices: &[Device],
        allowed: Option<&HashSet<DeviceId>>,
    ) -> Vec<Device> {
        let mut admitted = Vec::new();

        for device in devices {
            if let Some(allowed) = allowed {
                if !allowed.contains(&device.id) {
                    continue;
                }
            }
            if *user == self.own_user && device.id == self.own_device {
                continue;
            }
            if self.trusted.contains(&(user.clone(), device.id.clone())) {
                tracing::debug!("device {} of {} already trusted", device.id, user);
                continue;
            }

            self.trusted.insert((user.clone(), device.id.clone()));
            admitted.push(device.clone());
        }

        admitted
    }

    /// Whether a device has been recorded as trusted.
    pub fn is_trusted(&self, user: &UserId, device: &DeviceId) -> bool {
        self.trusted.contains(&(user.clone(), device.clone()))
    }

    /// Number of trusted devices recorded so far.
    pub fn trusted_count(&self) -> usize {
        self.trusted.len()
    }
}
