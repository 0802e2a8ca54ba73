// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transactions and their coordination.
//!
//! A [`Transaction`] is a shared handle carrying an id, a seniority used by
//! the lock manager to arbitrate conflicts, and a deadline. It moves through
//! `Active -> Prepared -> Committed`, or to `Aborted` from either of the
//! first two states. Once prepared it can no longer be wounded by an older
//! transaction.
//!
//! The [`TransactionCoordinator`] begins transactions and drives a task
//! through a [`TransactionParticipant`], retrying tasks that fail with
//! retryable aborts.

mod context;
mod coordinator;
mod error;
mod transaction;

pub use context::TaskContext;
pub use coordinator::TransactionCoordinator;
pub use error::AbortCause;
pub use transaction::{Transaction, TxnId, TxnState};

use crate::store::StoreError;

/// A resource that takes part in two-phase commit.
pub trait TransactionParticipant: Send + Sync {
    /// Prepares `txn` for commit.
    ///
    /// Returns true if the transaction made no changes here; it is then
    /// finished and must not be committed or aborted.
    fn prepare(&self, txn: &Transaction) -> Result<bool, StoreError>;

    /// Commits a prepared transaction.
    fn commit(&self, txn: &Transaction) -> Result<(), StoreError>;

    /// Prepares and commits in one step.
    fn prepare_and_commit(&self, txn: &Transaction) -> Result<(), StoreError>;

    /// Aborts the transaction, discarding its changes.
    fn abort(&self, txn: &Transaction) -> Result<(), StoreError>;

    /// Name of the participant, for logging.
    fn type_name(&self) -> &str;
}
