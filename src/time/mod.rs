// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Clocks used to stamp transaction seniority.
//!
//! Seniority only needs a strictly increasing arrival timestamp per node; the
//! hybrid logical clock provides that even when the wall clock stalls or
//! steps backwards.

mod hlc;

pub use hlc::HlcClock;

/// Source of arrival timestamps (nanoseconds since the Unix epoch).
pub trait Clock: Send + Sync {
    /// Returns the current time. Successive calls never go backwards.
    fn now_nanos(&self) -> u64;
}
