// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Data store error types.

use crate::txn::{AbortCause, TxnId};

use super::{ClassId, ObjectId};

/// Errors that can occur during data store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("object not found: {oid}")]
    ObjectNotFound { oid: ObjectId },

    #[error("name not bound: {name}")]
    NameNotBound { name: String },

    #[error("class info not found for class id {class_id}")]
    ClassInfoNotFound { class_id: ClassId },

    #[error("transaction {txn} is not active{}", not_active_suffix(.cause))]
    TransactionNotActive {
        txn: TxnId,
        cause: Option<AbortCause>,
    },

    #[error("transaction {txn} aborted: {cause}")]
    TransactionAborted { txn: TxnId, cause: AbortCause },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns true if this error aborts the transaction it occurred in.
    pub fn is_abort(&self) -> bool {
        matches!(self, StoreError::TransactionAborted { .. })
    }

    /// Returns the abort cause carried by this error, if any.
    pub fn abort_cause(&self) -> Option<&AbortCause> {
        match self {
            StoreError::TransactionAborted { cause, .. } => Some(cause),
            StoreError::TransactionNotActive { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }

    /// Returns true if the failed task may be re-run in a new transaction.
    pub fn should_retry(&self) -> bool {
        self.abort_cause().map_or(false, AbortCause::is_retryable)
    }
}

fn not_active_suffix(cause: &Option<AbortCause>) -> String {
    match cause {
        Some(cause) => format!(" ({cause})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_classification() {
        let aborted = StoreError::TransactionAborted {
            txn: TxnId(1),
            cause: AbortCause::Timeout,
        };
        assert!(aborted.is_abort());
        assert!(aborted.should_retry());

        let not_active = StoreError::TransactionNotActive {
            txn: TxnId(1),
            cause: Some(AbortCause::Wounded { by: TxnId(0) }),
        };
        assert!(!not_active.is_abort());
        assert!(not_active.should_retry());

        let not_found = StoreError::ObjectNotFound { oid: ObjectId(3) };
        assert!(!not_found.is_abort());
        assert!(!not_found.should_retry());

        let requested = StoreError::TransactionAborted {
            txn: TxnId(1),
            cause: AbortCause::Requested("stop".into()),
        };
        assert!(!requested.should_retry());
    }

    #[test]
    fn test_display() {
        let err = StoreError::TransactionNotActive {
            txn: TxnId(4),
            cause: Some(AbortCause::Timeout),
        };
        assert_eq!(err.to_string(), "transaction 4 is not active (transaction timed out)");
        let err = StoreError::TransactionNotActive {
            txn: TxnId(4),
            cause: None,
        };
        assert_eq!(err.to_string(), "transaction 4 is not active");
    }
}
