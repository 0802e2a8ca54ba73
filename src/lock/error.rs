// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock wait error types.

use std::fmt::Debug;

/// Errors returned by blocking lock requests.
#[derive(Debug, thiserror::Error)]
pub enum LockError<L: Debug> {
    #[error("lock wait timed out, conflicting with {holder:?}")]
    Timeout { holder: Option<L> },

    #[error("locker is no longer active")]
    NotActive,
}
