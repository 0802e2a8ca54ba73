// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Storage backend trait.

use crate::txn::Transaction;

use super::{BindingValue, ClassId, ObjectId, StoreError};

/// Primitive storage operations behind a [`DataStore`](super::DataStore).
///
/// The data store validates arguments, checks the transaction and reports
/// accesses before calling into the backend, so implementations only deal
/// with storing data in the transaction's view.
pub trait StorageBackend: Send + Sync {
    /// Allocates a fresh object id with empty contents.
    fn create_object(&self, txn: &Transaction) -> Result<ObjectId, StoreError>;

    /// Notes the intent to modify an existing object.
    fn mark_for_update(&self, txn: &Transaction, oid: ObjectId) -> Result<(), StoreError>;

    fn get_object(
        &self,
        txn: &Transaction,
        oid: ObjectId,
        for_update: bool,
    ) -> Result<Vec<u8>, StoreError>;

    fn set_object(&self, txn: &Transaction, oid: ObjectId, data: &[u8]) -> Result<(), StoreError>;

    /// Stores several objects. `oids` and `data` have equal length.
    fn set_objects(
        &self,
        txn: &Transaction,
        oids: &[ObjectId],
        data: &[&[u8]],
    ) -> Result<(), StoreError> {
        for (oid, data) in oids.iter().zip(data) {
            self.set_object(txn, *oid, data)?;
        }
        Ok(())
    }

    fn remove_object(&self, txn: &Transaction, oid: ObjectId) -> Result<(), StoreError>;

    /// Looks up `name`. An unbound result carries the next bound name.
    fn get_binding(&self, txn: &Transaction, name: &str) -> Result<BindingValue, StoreError>;

    /// Binds `name` to `oid`. The result describes the previous binding; if
    /// there was none it carries the next bound name.
    fn set_binding(
        &self,
        txn: &Transaction,
        name: &str,
        oid: ObjectId,
    ) -> Result<BindingValue, StoreError>;

    /// Removes the binding for `name`. Either way the result carries the
    /// next bound name after `name`.
    fn remove_binding(&self, txn: &Transaction, name: &str) -> Result<BindingValue, StoreError>;

    /// Returns the first bound name after `name`, or the first bound name
    /// when `name` is `None`.
    fn next_bound_name(
        &self,
        txn: &Transaction,
        name: Option<&str>,
    ) -> Result<Option<String>, StoreError>;

    /// Returns the id registered for a class descriptor, registering it if
    /// needed.
    fn get_class_id(&self, txn: &Transaction, class_info: &[u8]) -> Result<ClassId, StoreError>;

    fn get_class_info(&self, txn: &Transaction, class_id: ClassId) -> Result<Vec<u8>, StoreError>;

    /// Returns the first existing object id after `oid`, or the first one
    /// when `oid` is `None`.
    fn next_object_id(
        &self,
        txn: &Transaction,
        oid: Option<ObjectId>,
    ) -> Result<Option<ObjectId>, StoreError>;

    fn shutdown(&self) -> Result<(), StoreError>;

    /// Prepares `txn`. Returns true if it made no changes.
    fn prepare(&self, txn: &Transaction) -> Result<bool, StoreError>;

    fn commit(&self, txn: &Transaction) -> Result<(), StoreError>;

    fn prepare_and_commit(&self, txn: &Transaction) -> Result<(), StoreError>;

    fn abort(&self, txn: &Transaction) -> Result<(), StoreError>;
}
