// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Access reporting.
//!
//! Every object or name a transaction touches is reported to an
//! [`AccessReporter`] before the storage backend sees the request. The
//! reporter decides whether the access may proceed, typically by taking a
//! lock on the key.

mod locking;

pub use locking::LockingAccessReporter;

use crate::lock::LockMode;
use crate::store::StoreError;
use crate::txn::Transaction;

/// Receives the accesses transactions make to keys of type `K`.
pub trait AccessReporter<K>: Send + Sync {
    /// Reports that `txn` is about to access `key` in `mode`.
    ///
    /// An error here fails the operation; an abort-class error also aborts
    /// the transaction.
    fn report_access(&self, txn: &Transaction, key: K, mode: LockMode) -> Result<(), StoreError>;

    /// Attaches a human-readable description to `key` for diagnostics.
    fn set_description(&self, txn: &Transaction, key: K, description: String);

    /// Called once `txn` has committed or aborted.
    fn end_transaction(&self, _txn: &Transaction) {}
}

/// Reporter that allows every access.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAccessReporter;

impl<K> AccessReporter<K> for NoopAccessReporter {
    fn report_access(&self, _txn: &Transaction, _key: K, _mode: LockMode) -> Result<(), StoreError> {
        Ok(())
    }

    fn set_description(&self, _txn: &Transaction, _key: K, _description: String) {}
}
