// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction coordinator.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::config::TransactionConfig;
use crate::lock::Seniority;
use crate::store::StoreError;
use crate::time::{Clock, HlcClock};

use super::{AbortCause, Transaction, TransactionParticipant, TxnId};

/// Creates transactions and drives tasks through a participant.
pub struct TransactionCoordinator<C: Clock = HlcClock> {
    clock: C,
    config: TransactionConfig,
    next_txn_id: AtomicU64,
}

impl TransactionCoordinator<HlcClock> {
    /// Creates a coordinator stamping seniority from a hybrid logical clock.
    pub fn new(config: TransactionConfig) -> Self {
        Self::with_clock(HlcClock::new(), config)
    }
}

impl Default for TransactionCoordinator<HlcClock> {
    fn default() -> Self {
        Self::new(TransactionConfig::default())
    }
}

impl<C: Clock> TransactionCoordinator<C> {
    pub fn with_clock(clock: C, config: TransactionConfig) -> Self {
        Self {
            clock,
            config,
            next_txn_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Begins a transaction with a fresh seniority.
    pub fn begin(&self) -> Transaction {
        self.begin_with_seniority(Seniority::generate(&self.clock))
    }

    /// Begins a transaction that keeps an earlier attempt's seniority, so a
    /// retried task does not lose its place to younger contenders.
    pub fn begin_with_seniority(&self, seniority: Seniority) -> Transaction {
        let id = TxnId(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
        trace!(txn = %id, %seniority, "begin");
        Transaction::new(id, seniority, self.config.timeout)
    }

    /// Runs `task` in a transaction and commits it through `participant`.
    ///
    /// A task failing with a retryable error is re-run in a new transaction
    /// with the same seniority, up to the configured retry budget. Any
    /// failure aborts the attempt's transaction at the participant.
    pub fn run<P, T, F>(&self, participant: &P, mut task: F) -> Result<T, StoreError>
    where
        P: TransactionParticipant + ?Sized,
        F: FnMut(&Transaction) -> Result<T, StoreError>,
    {
        let seniority = Seniority::generate(&self.clock);
        let mut retries = 0;
        loop {
            let txn = self.begin_with_seniority(seniority);
            let result = task(&txn)
                .and_then(|value| participant.prepare_and_commit(&txn).map(|()| value));
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            txn.abort(AbortCause::Requested(format!("task failed: {err}")));
            if !txn.is_participant_done() {
                if let Err(abort_err) = participant.abort(&txn) {
                    warn!(txn = %txn.id(), participant = participant.type_name(),
                        error = %abort_err, "participant abort failed");
                }
            }

            if err.should_retry() && retries < self.config.max_task_retries {
                retries += 1;
                debug!(txn = %txn.id(), retries, error = %err, "retrying task");
                continue;
            }
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Locker;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingParticipant {
        events: Mutex<Vec<String>>,
    }

    impl TransactionParticipant for RecordingParticipant {
        fn prepare(&self, txn: &Transaction) -> Result<bool, StoreError> {
            self.events.lock().push(format!("prepare {}", txn.id()));
            txn.begin_prepare()?;
            Ok(false)
        }

        fn commit(&self, txn: &Transaction) -> Result<(), StoreError> {
            self.events.lock().push(format!("commit {}", txn.id()));
            txn.complete_commit();
            Ok(())
        }

        fn prepare_and_commit(&self, txn: &Transaction) -> Result<(), StoreError> {
            self.events.lock().push(format!("prepare_and_commit {}", txn.id()));
            txn.begin_prepare()?;
            txn.complete_commit();
            Ok(())
        }

        fn abort(&self, txn: &Transaction) -> Result<(), StoreError> {
            self.events.lock().push(format!("abort {}", txn.id()));
            txn.begin_participant_abort()
        }

        fn type_name(&self) -> &str {
            "recording"
        }
    }

    fn conflict(txn: &Transaction) -> StoreError {
        StoreError::TransactionAborted {
            txn: txn.id(),
            cause: AbortCause::Conflict {
                resource: "test".into(),
                key: "k".into(),
                holder: None,
            },
        }
    }

    #[test]
    fn test_begin_assigns_increasing_ids_and_seniority() {
        let coordinator = TransactionCoordinator::default();
        let a = coordinator.begin();
        let b = coordinator.begin();
        assert!(a.id() < b.id());
        assert!(b.seniority().younger_than(&a.seniority()));
        assert!(a.is_active());
    }

    #[test]
    fn test_begin_applies_timeout() {
        let coordinator =
            TransactionCoordinator::new(TransactionConfig::default().with_timeout(Duration::from_secs(5)));
        let txn = coordinator.begin();
        assert_eq!(txn.deadline() - txn.started(), Duration::from_secs(5));
    }

    #[test]
    fn test_run_commits() {
        let coordinator = TransactionCoordinator::default();
        let participant = RecordingParticipant::default();
        let value = coordinator.run(&participant, |_| Ok(42)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(*participant.events.lock(), vec!["prepare_and_commit 1".to_string()]);
    }

    #[test]
    fn test_run_retries_with_same_seniority() {
        let coordinator = TransactionCoordinator::default();
        let participant = RecordingParticipant::default();
        let mut seen = Vec::new();
        let value = coordinator
            .run(&participant, |txn| {
                seen.push(txn.seniority());
                if seen.len() < 3 {
                    txn.abort(AbortCause::Timeout);
                    Err(conflict(txn))
                } else {
                    Ok("done")
                }
            })
            .unwrap();
        assert_eq!(value, "done");
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|s| *s == seen[0]));
        assert_eq!(
            *participant.events.lock(),
            vec!["abort 1", "abort 2", "prepare_and_commit 3"]
        );
    }

    #[test]
    fn test_run_does_not_retry_plain_errors() {
        let coordinator = TransactionCoordinator::default();
        let participant = RecordingParticipant::default();
        let mut attempts = 0;
        let err = coordinator
            .run(&participant, |_| -> Result<(), StoreError> {
                attempts += 1;
                Err(StoreError::NameNotBound {
                    name: "missing".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::NameNotBound { .. }));
        assert_eq!(attempts, 1);
        assert_eq!(*participant.events.lock(), vec!["abort 1".to_string()]);
    }

    #[test]
    fn test_run_gives_up_after_budget() {
        let coordinator =
            TransactionCoordinator::new(TransactionConfig::default().with_max_task_retries(2));
        let participant = RecordingParticipant::default();
        let mut attempts = 0;
        let err = coordinator
            .run(&participant, |txn| -> Result<(), StoreError> {
                attempts += 1;
                Err(conflict(txn))
            })
            .unwrap_err();
        assert!(err.is_abort());
        assert_eq!(attempts, 3);
    }
}
