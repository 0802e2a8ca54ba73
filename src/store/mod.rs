// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transactional object and name store.
//!
//! # Key Concepts
//!
//! ## Objects
//!
//! Objects are opaque byte arrays identified by an [`ObjectId`]. Ids are
//! allocated monotonically and never reused, even when the creating
//! transaction aborts.
//!
//! ## Name Bindings
//!
//! Names map to object ids and are kept in order. Lookups of unbound names
//! and scans with [`DataStore::next_bound_name`] lock the next bound name
//! (or the end of the namespace), so a later binding in the same gap
//! conflicts with them.
//!
//! ## Layering
//!
//! [`DataStore`] owns the transactional protocol: argument checks, access
//! reporting, error translation and participant callbacks. A
//! [`StorageBackend`] supplies the raw primitives; [`MemoryBackend`] is the
//! in-memory implementation.
//!
//! # Example
//!
//! ```
//! use txstore::config::LockConfig;
//! use txstore::store::{DataStore, MemoryBackend};
//! use txstore::txn::TransactionCoordinator;
//!
//! let store = DataStore::with_locking(MemoryBackend::new(), &LockConfig::default());
//! let coordinator = TransactionCoordinator::default();
//!
//! let oid = coordinator
//!     .run(&store, |txn| {
//!         let oid = store.create_object(txn)?;
//!         store.set_object(txn, oid, b"hello")?;
//!         store.set_binding(txn, "greeting", oid)?;
//!         Ok(oid)
//!     })
//!     .unwrap();
//!
//! let found = coordinator
//!     .run(&store, |txn| store.get_binding(txn, "greeting"))
//!     .unwrap();
//! assert_eq!(found, oid);
//! ```

mod backend;
mod engine;
mod error;
mod memory;
mod names;
mod types;

pub use backend::StorageBackend;
pub use engine::{DataStore, NAMES_SOURCE, OBJECTS_SOURCE};
pub use error::StoreError;
pub use memory::MemoryBackend;
pub use names::{name_for_access, END_OF_NAMESPACE};
pub use types::{BindingValue, ClassId, ObjectId};
