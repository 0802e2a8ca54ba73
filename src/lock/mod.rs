// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock manager with seniority-based (wound-wait) conflict resolution.
//!
//! # Key Concepts
//!
//! ## Seniority
//!
//! Every locker carries a [`Seniority`]: its first arrival timestamp plus a
//! tiebreaker. Lockers that still compare equal are ordered by
//! [`Locker::ordinal`], so two contenders are never left ambiguous.
//!
//! ## Wound-Wait
//!
//! When a request conflicts with existing entries on a key:
//! - If the requester is OLDER than every conflicting holder, it WOUNDS them:
//!   their lockers are aborted, their entries removed, and the request is
//!   granted.
//! - If any conflicting holder (or any conflicting queued request) is OLDER,
//!   the requester WAITS behind it, parked as a listener on that entry's
//!   seniority header.
//!
//! Grants on a key are therefore ordered by seniority, never by the arrival
//! order of the requests themselves. A holder whose deadline has passed is
//! evicted on the next attempt against its key.

mod error;
mod manager;
mod request;
mod seniority;

pub use error::LockError;
pub use manager::LockManager;
pub use request::{LockAttemptResult, LockMode, LockRequest};
pub use seniority::{Seniority, SeniorityHeader};

pub(crate) use seniority::WakeSignal;

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

/// Why a locker lost an entry it held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WoundReason<L> {
    /// An older conflicting requester took the key.
    Wounded { by: L },
    /// The locker's deadline passed while it held the key.
    Expired,
}

/// A transaction-like entity that can hold locks.
pub trait Locker: Clone + Eq + Hash + Send + Sync + Debug {
    /// Logical age used to arbitrate conflicts.
    fn seniority(&self) -> Seniority;

    /// Stable identity that orders lockers whose seniorities are equal.
    fn ordinal(&self) -> u64;

    /// Instant after which the locker's entries may be evicted and its waits
    /// give up.
    fn deadline(&self) -> Instant;

    /// Returns false once the locker can no longer acquire locks.
    fn is_active(&self) -> bool;

    /// Asks the locker to give up because of `reason`.
    ///
    /// Returns false if the locker can no longer be aborted (for example it
    /// has already prepared); an older requester then waits instead.
    fn wound(&self, reason: WoundReason<Self>) -> bool;
}
