// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction handle and state.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::lock::{Locker, Seniority, WoundReason};
use crate::store::StoreError;

use super::AbortCause;

/// Unique transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has prepared and can no longer be wounded.
    Prepared,
    /// Transaction has committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxnState::Active => "active",
            TxnState::Prepared => "prepared",
            TxnState::Committed => "committed",
            TxnState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

struct Status {
    state: TxnState,
    cause: Option<AbortCause>,
    participant_done: bool,
}

struct TxnInner {
    id: TxnId,
    seniority: Seniority,
    started: Instant,
    deadline: Instant,
    status: Mutex<Status>,
}

/// A transaction handle.
///
/// Handles are cheap to clone and all clones share state. Equality and
/// hashing use the transaction id.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxnInner>,
}

impl Transaction {
    /// Creates an active transaction that times out `timeout` from now.
    pub fn new(id: TxnId, seniority: Seniority, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            inner: Arc::new(TxnInner {
                id,
                seniority,
                started,
                deadline: started + timeout,
                status: Mutex::new(Status {
                    state: TxnState::Active,
                    cause: None,
                    participant_done: false,
                }),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> TxnId {
        self.inner.id
    }

    #[inline]
    pub fn seniority(&self) -> Seniority {
        self.inner.seniority
    }

    #[inline]
    pub fn started(&self) -> Instant {
        self.inner.started
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    pub fn state(&self) -> TxnState {
        self.inner.status.lock().state
    }

    pub fn is_aborted(&self) -> bool {
        self.state() == TxnState::Aborted
    }

    /// Returns why the transaction aborted, if it did.
    pub fn abort_cause(&self) -> Option<AbortCause> {
        self.inner.status.lock().cause.clone()
    }

    /// Returns true once the store participant has committed or aborted
    /// this transaction.
    pub fn is_participant_done(&self) -> bool {
        self.inner.status.lock().participant_done
    }

    /// Aborts the transaction.
    ///
    /// Returns true if this call moved the transaction to aborted. Aborting
    /// an aborted or committed transaction changes nothing, and the first
    /// cause recorded is kept.
    pub fn abort(&self, cause: AbortCause) -> bool {
        let mut status = self.inner.status.lock();
        match status.state {
            TxnState::Active | TxnState::Prepared => {
                status.state = TxnState::Aborted;
                status.cause = Some(cause);
                true
            }
            TxnState::Committed | TxnState::Aborted => false,
        }
    }

    /// Verifies the transaction may still perform operations.
    ///
    /// A transaction past its deadline is aborted with
    /// [`AbortCause::Timeout`] here.
    pub fn check_active(&self) -> Result<(), StoreError> {
        let mut status = self.inner.status.lock();
        match status.state {
            TxnState::Active if !status.participant_done => {}
            TxnState::Aborted => {
                return Err(StoreError::TransactionNotActive {
                    txn: self.id(),
                    cause: status.cause.clone(),
                })
            }
            _ => {
                return Err(StoreError::TransactionNotActive {
                    txn: self.id(),
                    cause: None,
                })
            }
        }
        if Instant::now() > self.inner.deadline {
            status.state = TxnState::Aborted;
            status.cause = Some(AbortCause::Timeout);
            return Err(StoreError::TransactionAborted {
                txn: self.id(),
                cause: AbortCause::Timeout,
            });
        }
        Ok(())
    }

    /// Moves an active transaction to prepared.
    pub(crate) fn begin_prepare(&self) -> Result<(), StoreError> {
        let mut status = self.inner.status.lock();
        if status.participant_done {
            return Err(self.finished_error());
        }
        match status.state {
            TxnState::Active => {}
            TxnState::Aborted => {
                return Err(StoreError::TransactionNotActive {
                    txn: self.id(),
                    cause: status.cause.clone(),
                })
            }
            state => {
                return Err(StoreError::IllegalState(format!(
                    "transaction {} is already {state}",
                    self.id()
                )))
            }
        }
        if Instant::now() > self.inner.deadline {
            status.state = TxnState::Aborted;
            status.cause = Some(AbortCause::Timeout);
            return Err(StoreError::TransactionAborted {
                txn: self.id(),
                cause: AbortCause::Timeout,
            });
        }
        status.state = TxnState::Prepared;
        Ok(())
    }

    /// Verifies a prepared transaction may be committed.
    pub(crate) fn check_prepared(&self) -> Result<(), StoreError> {
        let status = self.inner.status.lock();
        if status.participant_done {
            return Err(self.finished_error());
        }
        match status.state {
            TxnState::Prepared => Ok(()),
            TxnState::Aborted => Err(StoreError::TransactionNotActive {
                txn: self.id(),
                cause: status.cause.clone(),
            }),
            state => Err(StoreError::IllegalState(format!(
                "transaction {} is {state}, not prepared",
                self.id()
            ))),
        }
    }

    /// Records that the participant committed the transaction.
    pub(crate) fn complete_commit(&self) {
        let mut status = self.inner.status.lock();
        status.state = TxnState::Committed;
        status.participant_done = true;
    }

    /// Records that the participant is aborting the transaction.
    pub(crate) fn begin_participant_abort(&self) -> Result<(), StoreError> {
        let mut status = self.inner.status.lock();
        if status.participant_done {
            return Err(self.finished_error());
        }
        if status.state == TxnState::Committed {
            return Err(StoreError::IllegalState(format!(
                "transaction {} is already committed",
                self.id()
            )));
        }
        if status.state != TxnState::Aborted {
            status.state = TxnState::Aborted;
            status.cause = Some(AbortCause::Requested("aborted by coordinator".into()));
        }
        status.participant_done = true;
        Ok(())
    }

    fn finished_error(&self) -> StoreError {
        StoreError::IllegalState(format!(
            "participant already finished transaction {}",
            self.id()
        ))
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id.0)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.inner.id)
    }
}

impl Locker for Transaction {
    fn seniority(&self) -> Seniority {
        self.inner.seniority
    }

    fn ordinal(&self) -> u64 {
        self.inner.id.0
    }

    fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    fn is_active(&self) -> bool {
        self.state() == TxnState::Active
    }

    fn wound(&self, reason: WoundReason<Self>) -> bool {
        let mut status = self.inner.status.lock();
        match status.state {
            TxnState::Active => {
                status.state = TxnState::Aborted;
                status.cause = Some(match reason {
                    WoundReason::Wounded { by } => AbortCause::Wounded { by: by.id() },
                    WoundReason::Expired => AbortCause::Evicted,
                });
                true
            }
            TxnState::Aborted => true,
            TxnState::Prepared | TxnState::Committed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(id: u64) -> Transaction {
        Transaction::new(TxnId(id), Seniority::new(id, 0), Duration::from_secs(10))
    }

    #[test]
    fn test_new_transaction_is_active() {
        let t = txn(1);
        assert_eq!(t.state(), TxnState::Active);
        assert!(t.check_active().is_ok());
        assert!(t.abort_cause().is_none());
    }

    #[test]
    fn test_abort_is_idempotent() {
        let t = txn(1);
        assert!(t.abort(AbortCause::Timeout));
        assert!(!t.abort(AbortCause::Evicted));
        assert_eq!(t.abort_cause(), Some(AbortCause::Timeout));
    }

    #[test]
    fn test_check_active_after_abort() {
        let t = txn(1);
        t.abort(AbortCause::Evicted);
        match t.check_active() {
            Err(StoreError::TransactionNotActive { cause, .. }) => {
                assert_eq!(cause, Some(AbortCause::Evicted))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_check_active_times_out() {
        let t = Transaction::new(TxnId(1), Seniority::new(1, 0), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let err = t.check_active().unwrap_err();
        assert!(err.is_abort());
        assert_eq!(t.abort_cause(), Some(AbortCause::Timeout));
    }

    #[test]
    fn test_prepared_refuses_wound() {
        let t = txn(2);
        t.begin_prepare().unwrap();
        assert!(!t.wound(WoundReason::Wounded { by: txn(1) }));
        assert_eq!(t.state(), TxnState::Prepared);
    }

    #[test]
    fn test_wound_records_cause() {
        let t = txn(2);
        assert!(t.wound(WoundReason::Wounded { by: txn(1) }));
        assert_eq!(t.abort_cause(), Some(AbortCause::Wounded { by: TxnId(1) }));
        assert!(!t.is_active());
    }

    #[test]
    fn test_participant_transitions() {
        let t = txn(1);
        assert!(t.check_prepared().is_err());
        t.begin_prepare().unwrap();
        assert!(t.begin_prepare().is_err());
        t.check_prepared().unwrap();
        t.complete_commit();
        assert_eq!(t.state(), TxnState::Committed);
        assert!(t.is_participant_done());
        assert!(t.begin_participant_abort().is_err());
        assert!(!t.abort(AbortCause::Timeout));
    }

    #[test]
    fn test_participant_abort_keeps_earlier_cause() {
        let t = txn(1);
        t.abort(AbortCause::Timeout);
        t.begin_participant_abort().unwrap();
        assert_eq!(t.abort_cause(), Some(AbortCause::Timeout));
        assert!(t.begin_participant_abort().is_err());
    }

    #[test]
    fn test_equality_by_id() {
        let a = txn(1);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, txn(2));
        assert_eq!(a.to_string(), "txn:1");
    }
}
