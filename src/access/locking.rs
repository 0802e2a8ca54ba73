// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Access reporter backed by the lock manager.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use parking_lot::Mutex;
use tracing::trace;

use crate::config::LockConfig;
use crate::lock::{LockError, LockManager, LockMode};
use crate::store::StoreError;
use crate::txn::{AbortCause, Transaction, TxnId};

use super::AccessReporter;

/// Turns every reported access into a lock on the key.
///
/// A lock wait that runs out of time aborts the transaction with a
/// conflict naming the reporter's source, the key and the holder.
pub struct LockingAccessReporter<K> {
    source: String,
    locks: LockManager<K, Transaction>,
    descriptions: Mutex<HashMap<(TxnId, K), String>>,
}

impl<K> LockingAccessReporter<K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Creates a reporter named `source`, used in conflict messages.
    pub fn new(source: impl Into<String>, config: &LockConfig) -> Self {
        Self {
            source: source.into(),
            locks: LockManager::from_config(config),
            descriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The lock manager holding this reporter's locks.
    pub fn locks(&self) -> &LockManager<K, Transaction> {
        &self.locks
    }

    /// Describes `key` using the text attached by `owner`, then by
    /// `fallback`, then the key itself.
    fn describe(&self, key: &K, owner: Option<TxnId>, fallback: TxnId) -> String {
        let descriptions = self.descriptions.lock();
        owner
            .into_iter()
            .chain(Some(fallback))
            .find_map(|id| descriptions.get(&(id, key.clone())))
            .cloned()
            .unwrap_or_else(|| format!("{key:?}"))
    }
}

impl<K> AccessReporter<K> for LockingAccessReporter<K>
where
    K: Hash + Eq + Clone + Debug + Send + Sync,
{
    fn report_access(&self, txn: &Transaction, key: K, mode: LockMode) -> Result<(), StoreError> {
        trace!(source = %self.source, txn = %txn.id(), key = ?key, %mode, "report access");
        match self.locks.lock(txn, &key, mode) {
            Ok(()) => Ok(()),
            Err(LockError::Timeout { holder }) => {
                let holder = holder.map(|h| h.id());
                Err(StoreError::TransactionAborted {
                    txn: txn.id(),
                    cause: AbortCause::Conflict {
                        resource: self.source.clone(),
                        key: self.describe(&key, holder, txn.id()),
                        holder,
                    },
                })
            }
            Err(LockError::NotActive) => Err(match txn.abort_cause() {
                Some(cause) => StoreError::TransactionAborted {
                    txn: txn.id(),
                    cause,
                },
                None => StoreError::TransactionNotActive {
                    txn: txn.id(),
                    cause: None,
                },
            }),
        }
    }

    fn set_description(&self, txn: &Transaction, key: K, description: String) {
        self.descriptions.lock().insert((txn.id(), key), description);
    }

    fn end_transaction(&self, txn: &Transaction) {
        self.locks.release_all(txn);
        let id = txn.id();
        self.descriptions.lock().retain(|(owner, _), _| *owner != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Seniority;
    use std::time::Duration;

    fn txn(id: u64, timeout: Duration) -> Transaction {
        Transaction::new(TxnId(id), Seniority::new(id, 0), timeout)
    }

    fn reporter() -> LockingAccessReporter<String> {
        LockingAccessReporter::new("txstore.names", &LockConfig::default().with_num_shards(4))
    }

    #[test]
    fn test_access_takes_lock() {
        let reporter = reporter();
        let t = txn(1, Duration::from_secs(5));
        reporter
            .report_access(&t, "a".to_string(), LockMode::Write)
            .unwrap();
        assert_eq!(
            reporter.locks().holders(&"a".to_string()),
            vec![(t.clone(), LockMode::Write)]
        );

        reporter.end_transaction(&t);
        assert!(reporter.locks().is_empty());
    }

    #[test]
    fn test_timeout_reports_conflict_with_description() {
        let reporter = reporter();
        let older = txn(1, Duration::from_secs(5));
        let younger = txn(2, Duration::from_millis(20));
        reporter
            .report_access(&older, "a".to_string(), LockMode::Write)
            .unwrap();
        reporter.set_description(&older, "a".to_string(), "player:a".to_string());

        let err = reporter
            .report_access(&younger, "a".to_string(), LockMode::Read)
            .unwrap_err();
        match err {
            StoreError::TransactionAborted {
                cause:
                    AbortCause::Conflict {
                        resource,
                        key,
                        holder,
                    },
                ..
            } => {
                assert_eq!(resource, "txstore.names");
                assert_eq!(key, "player:a");
                assert_eq!(holder, Some(TxnId(1)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wounded_transaction_reports_abort() {
        let reporter = reporter();
        let older = txn(1, Duration::from_secs(5));
        let younger = txn(2, Duration::from_secs(5));
        reporter
            .report_access(&younger, "a".to_string(), LockMode::Write)
            .unwrap();
        reporter
            .report_access(&older, "a".to_string(), LockMode::Write)
            .unwrap();

        let err = reporter
            .report_access(&younger, "b".to_string(), LockMode::Read)
            .unwrap_err();
        assert!(err.is_abort());
        assert_eq!(err.abort_cause(), Some(&AbortCause::Wounded { by: TxnId(1) }));
    }

    #[test]
    fn test_descriptions_cleared_on_end() {
        let reporter = reporter();
        let t = txn(1, Duration::from_secs(5));
        reporter.set_description(&t, "a".to_string(), "described".to_string());
        assert_eq!(reporter.describe(&"a".to_string(), None, t.id()), "described");
        reporter.end_transaction(&t);
        assert_eq!(reporter.describe(&"a".to_string(), None, t.id()), "\"a\"");
    }

    #[test]
    fn test_descriptions_kept_per_transaction() {
        let reporter = reporter();
        let older = txn(1, Duration::from_secs(5));
        let younger = txn(2, Duration::from_millis(20));
        reporter
            .report_access(&older, "a".to_string(), LockMode::Write)
            .unwrap();
        reporter.set_description(&older, "a".to_string(), "held by older".to_string());
        reporter.set_description(&younger, "a".to_string(), "wanted by younger".to_string());

        let err = reporter
            .report_access(&younger, "a".to_string(), LockMode::Write)
            .unwrap_err();
        assert!(matches!(
            err.abort_cause(),
            Some(AbortCause::Conflict { key, .. }) if key == "held by older"
        ));

        reporter.end_transaction(&younger);
        assert_eq!(
            reporter.describe(&"a".to_string(), Some(older.id()), older.id()),
            "held by older"
        );
    }
}
