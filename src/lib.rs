// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! txstore: a transactional object store with seniority-based locking.
//!
//! This crate provides the persistence and concurrency-control layer of a
//! transactional object backend: opaque objects and an ordered name
//! namespace, read and written under transactions whose conflicts are
//! resolved by a wound-wait lock manager with next-key locking for names.

pub mod access;
pub mod config;
pub mod lock;
pub mod service;
pub mod store;
pub mod time;
pub mod txn;

pub use access::{AccessReporter, LockingAccessReporter, NoopAccessReporter};
pub use config::{Config, ConfigError, LockConfig, ServiceConfig, TransactionConfig};
pub use lock::{
    LockAttemptResult, LockError, LockManager, LockMode, LockRequest, Locker, Seniority,
    SeniorityHeader, WoundReason,
};
pub use service::{
    BasicService, IoTaskOutcome, NodeId, NodeLiveness, NodeRegistry, ServiceError, ServiceHooks,
    ServiceState, ShutdownOutcome, StoreService,
};
pub use store::{BindingValue, ClassId, DataStore, MemoryBackend, ObjectId, StorageBackend, StoreError};
pub use time::{Clock, HlcClock};
pub use txn::{
    AbortCause, TaskContext, Transaction, TransactionCoordinator, TransactionParticipant, TxnId,
    TxnState,
};
