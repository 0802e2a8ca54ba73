// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Seniority ordering and per-entity seniority headers.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::time::Clock;

/// Logical age of a lock requester.
///
/// Ordered by arrival timestamp first and tiebreaker second. A smaller value
/// is older and wins conflicts. Two requesters only compare equal when both
/// fields match, which distinct lockers never do in practice: timestamps come
/// from a strictly increasing clock and tiebreakers are random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Seniority {
    timestamp: u64,
    tiebreaker: u64,
}

impl Seniority {
    /// Creates a seniority from explicit parts.
    #[inline]
    pub fn new(timestamp: u64, tiebreaker: u64) -> Self {
        Self {
            timestamp,
            tiebreaker,
        }
    }

    /// Stamps a new arrival using `clock` and a random tiebreaker.
    pub fn generate(clock: &dyn Clock) -> Self {
        Self::new(clock.now_nanos(), rand::random())
    }

    /// Returns the arrival timestamp.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the tiebreaker.
    #[inline]
    pub fn tiebreaker(&self) -> u64 {
        self.tiebreaker
    }

    /// Returns true if `self` arrived after `other`.
    ///
    /// Timestamp collisions are resolved only by the tiebreaker.
    #[inline]
    pub fn younger_than(&self, other: &Seniority) -> bool {
        other.timestamp < self.timestamp
            || (other.timestamp == self.timestamp && other.tiebreaker < self.tiebreaker)
    }

    /// Returns true if `self` arrived before `other`.
    #[inline]
    pub fn older_than(&self, other: &Seniority) -> bool {
        other.younger_than(self)
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:016x}", self.timestamp, self.tiebreaker)
    }
}

/// One-shot wakeup handle for a parked lock request.
#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    notified: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.cond.notify_all();
    }

    /// Blocks until notified or `deadline` passes. Returns true if notified.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut notified = self.notified.lock();
        while !*notified {
            if self.cond.wait_until(&mut notified, deadline).timed_out() {
                break;
            }
        }
        *notified
    }
}

/// Ownership record of one locker on one contested key.
///
/// Carries the owner's seniority and deadline, and the listeners parked
/// until this entry goes away or changes state. The listener list is only
/// touched while holding the header's own lock.
pub struct SeniorityHeader<L> {
    owner: L,
    seniority: Seniority,
    deadline: Instant,
    listeners: Mutex<Vec<Arc<WakeSignal>>>,
}

impl<L> SeniorityHeader<L> {
    /// Creates a header owned by `owner`.
    pub fn new(owner: L, seniority: Seniority, deadline: Instant) -> Self {
        Self {
            owner,
            seniority,
            deadline,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the owner.
    #[inline]
    pub fn owner(&self) -> &L {
        &self.owner
    }

    /// Returns the owner's seniority.
    #[inline]
    pub fn seniority(&self) -> Seniority {
        self.seniority
    }

    /// Returns the owner's deadline.
    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns true if this header's owner arrived after `other`'s.
    #[inline]
    pub fn younger_than(&self, other: &SeniorityHeader<L>) -> bool {
        self.seniority.younger_than(&other.seniority)
    }

    /// Returns true once `now` is past the owner's deadline.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }

    /// Returns the number of parked listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn add_listener(&self, signal: Arc<WakeSignal>) {
        self.listeners.lock().push(signal);
    }

    /// Wakes and forgets every parked listener; returns how many were woken.
    pub(crate) fn notify_listeners(&self) -> usize {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in &listeners {
            listener.notify();
        }
        listeners.len()
    }
}

impl<L: fmt::Debug> fmt::Debug for SeniorityHeader<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeniorityHeader")
            .field("owner", &self.owner)
            .field("seniority", &self.seniority)
            .field("deadline", &self.deadline)
            .field("listeners", &self.listener_count())
            .finish()
    }
}
