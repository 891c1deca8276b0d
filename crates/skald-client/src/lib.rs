//! Session core for the Skald webhook relay.
//!
//! This crate orchestrates an end-to-end-encrypted client session on a
//! federated messaging network. All cryptographic and wire-protocol work
//! is delegated to an external client library consumed through the
//! [`ChatClient`] capability trait; this crate supplies the session
//! lifecycle around it:
//!
//! - [`CredentialStore`]: persists login credentials across restarts
//! - [`Bootstrapper`] / [`Session`]: the Unauthenticated → Authenticated
//!   state machine, key upload, and the one-time post-sync trust sweep
//! - [`TrustLedger`]: idempotent device-trust bookkeeping
//! - [`RoomEventHandler`]: joins invited rooms and trusts member devices
//!   as membership events arrive
//! - [`MemoryClient`]: in-memory capability implementation used as a
//!   development loopback and as the test double
//!
//! # Architecture
//!
//! The trust decision is a pure state transition on [`TrustLedger`];
//! the session performs the resulting verification calls. Event
//! callbacks are delivered through the [`EventSink`] trait, invoked
//! inline by the client's sync loop.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod creds;
mod error;
mod event;
mod ident;
mod membership;
mod memory;
mod session;
mod trust;

pub use client::{ChatClient, Device, KeyMaterial, Room};
pub use creds::{CredentialStore, Credentials};
pub use error::ChatError;
pub use event::{EventSink, Invite, Membership, MembershipChange, VerificationStage};
pub use ident::{DeviceId, RoomId, UserId};
pub use membership::RoomEventHandler;
pub use memory::{Call, MemoryClient};
pub use session::{Bootstrapper, Session};
pub use trust::TrustLedger;
