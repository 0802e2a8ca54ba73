// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction abort causes.

use super::TxnId;

/// Why a transaction was aborted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortCause {
    #[error("transaction timed out")]
    Timeout,

    #[error("lock conflict in {resource} on key {key} with {}", holder_name(.holder))]
    Conflict {
        resource: String,
        key: String,
        holder: Option<TxnId>,
    },

    #[error("wounded by older transaction {by}")]
    Wounded { by: TxnId },

    #[error("evicted after its deadline passed")]
    Evicted,

    #[error("{0}")]
    Requested(String),
}

impl AbortCause {
    /// Returns true if a task aborted for this cause may be retried in a
    /// fresh transaction.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AbortCause::Requested(_))
    }
}

fn holder_name(holder: &Option<TxnId>) -> String {
    match holder {
        Some(id) => format!("txn {id}"),
        None => "an unknown holder".to_string(),
    }
}
