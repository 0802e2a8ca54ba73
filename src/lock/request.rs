// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Lock request and attempt result types.

use std::fmt;

/// Access modes for locks and access reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared access (multiple readers allowed).
    Read,
    /// Exclusive access (single writer, no readers).
    Write,
}

impl LockMode {
    /// Returns true if holders in `self` and `other` cannot coexist.
    #[inline]
    pub fn conflicts_with(self, other: LockMode) -> bool {
        self == LockMode::Write || other == LockMode::Write
    }

    /// Returns the stronger of the two modes.
    #[inline]
    pub fn max(self, other: LockMode) -> LockMode {
        if self == LockMode::Write || other == LockMode::Write {
            LockMode::Write
        } else {
            LockMode::Read
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Read => f.write_str("READ"),
            LockMode::Write => f.write_str("WRITE"),
        }
    }
}

/// A request by `locker` for `key` in `mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest<K, L> {
    pub key: K,
    pub locker: L,
    pub mode: LockMode,
}

impl<K, L> LockRequest<K, L> {
    pub fn new(key: K, locker: L, mode: LockMode) -> Self {
        Self { key, locker, mode }
    }
}

/// Outcome of a non-blocking lock attempt.
///
/// `conflict` is present iff the request could not be granted immediately.
#[derive(Debug, Clone)]
pub struct LockAttemptResult<K, L> {
    pub request: LockRequest<K, L>,
    pub conflict: Option<L>,
}

impl<K, L> LockAttemptResult<K, L> {
    /// Returns true if the request was granted.
    #[inline]
    pub fn is_granted(&self) -> bool {
        self.conflict.is_none()
    }
}

impl<K: fmt::Debug, L: fmt::Debug> fmt::Display for LockAttemptResult<K, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LockAttemptResult[key:{:?}, locker:{:?}, mode:{}, conflict:{:?}]",
            self.request.key, self.request.locker, self.request.mode, self.conflict
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_conflicts() {
        assert!(!LockMode::Read.conflicts_with(LockMode::Read));
        assert!(LockMode::Read.conflicts_with(LockMode::Write));
        assert!(LockMode::Write.conflicts_with(LockMode::Read));
        assert!(LockMode::Write.conflicts_with(LockMode::Write));
    }

    #[test]
    fn test_mode_max() {
        assert_eq!(LockMode::Read.max(LockMode::Read), LockMode::Read);
        assert_eq!(LockMode::Read.max(LockMode::Write), LockMode::Write);
    }

    #[test]
    fn test_attempt_result_display() {
        let result = LockAttemptResult {
            request: LockRequest::new("k", 1u32, LockMode::Write),
            conflict: Some(2u32),
        };
        assert!(!result.is_granted());
        assert_eq!(
            result.to_string(),
            "LockAttemptResult[key:\"k\", locker:1, mode:WRITE, conflict:Some(2)]"
        );
    }
}
