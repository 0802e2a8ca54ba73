// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Service error types.

use crate::store::StoreError;

/// Errors raised by service lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("illegal service state: {0}")]
    IllegalState(String),

    #[error("operation not allowed from a transactional context")]
    TransactionalContext,

    #[error("failed to spawn shutdown worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("service hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
