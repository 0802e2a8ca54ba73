// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Execution context of a running task.

use super::{Transaction, TxnState};

/// Describes whether the calling task runs inside a transaction.
///
/// Services that must not be called transactionally (blocking IO, liveness
/// queries) take a context and check it.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    txn: Option<Transaction>,
}

impl TaskContext {
    /// Context of a task running outside any transaction.
    pub fn non_transactional() -> Self {
        Self { txn: None }
    }

    /// Context of a task running inside `txn`.
    pub fn transactional(txn: Transaction) -> Self {
        Self { txn: Some(txn) }
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.txn.as_ref()
    }

    /// Returns true while the task's transaction has not finished.
    pub fn in_transaction(&self) -> bool {
        self.txn
            .as_ref()
            .map_or(false, |t| matches!(t.state(), TxnState::Active | TxnState::Prepared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Seniority;
    use crate::txn::{AbortCause, TxnId};
    use std::time::Duration;

    #[test]
    fn test_in_transaction() {
        assert!(!TaskContext::non_transactional().in_transaction());

        let txn = Transaction::new(TxnId(1), Seniority::new(1, 0), Duration::from_secs(1));
        let ctx = TaskContext::transactional(txn.clone());
        assert!(ctx.in_transaction());

        txn.abort(AbortCause::Timeout);
        assert!(!ctx.in_transaction());
    }
}
