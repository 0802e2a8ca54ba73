// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transactional data store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::access::{AccessReporter, LockingAccessReporter};
use crate::config::LockConfig;
use crate::lock::LockMode;
use crate::txn::{Transaction, TransactionParticipant, TxnId};

use super::names::{lock_next_name, name_for_access};
use super::{BindingValue, ClassId, ObjectId, StorageBackend, StoreError};

/// Source name reported for object lock conflicts.
pub const OBJECTS_SOURCE: &str = "txstore.objects";

/// Source name reported for name lock conflicts.
pub const NAMES_SOURCE: &str = "txstore.names";

#[derive(Clone, Copy)]
enum OpLevel {
    Trace,
    Debug,
}

/// Transactional store of objects, name bindings and class descriptors.
///
/// Every operation checks that the transaction is active, reports the
/// accesses it makes, delegates to the backend and translates failures.
/// An abort-class failure aborts the transaction before the error is
/// returned.
///
/// Name operations lock both the name and the next bound name, so that
/// scans and lookups of unbound names conflict with concurrent bindings in
/// the same gap.
pub struct DataStore<B> {
    backend: B,
    objects: Arc<dyn AccessReporter<ObjectId>>,
    names: Arc<dyn AccessReporter<String>>,
    shut_down: AtomicBool,
}

impl<B: StorageBackend> DataStore<B> {
    pub fn new(
        backend: B,
        objects: Arc<dyn AccessReporter<ObjectId>>,
        names: Arc<dyn AccessReporter<String>>,
    ) -> Self {
        Self {
            backend,
            objects,
            names,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Creates a store whose accesses are arbitrated by lock managers.
    pub fn with_locking(backend: B, config: &LockConfig) -> Self {
        Self::new(
            backend,
            Arc::new(LockingAccessReporter::<ObjectId>::new(OBJECTS_SOURCE, config)),
            Arc::new(LockingAccessReporter::<String>::new(NAMES_SOURCE, config)),
        )
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates an empty object and returns its id.
    pub fn create_object(&self, txn: &Transaction) -> Result<ObjectId, StoreError> {
        trace!(txn = %txn.id(), "createObject");
        let result = self.in_txn(txn, || self.backend.create_object(txn));
        self.finish(Some(txn), OpLevel::Trace, "createObject", result)
    }

    /// Declares that the object will be modified.
    pub fn mark_for_update(&self, txn: &Transaction, oid: ObjectId) -> Result<(), StoreError> {
        trace!(txn = %txn.id(), %oid, "markForUpdate");
        let result = self.in_txn(txn, || {
            self.objects.report_access(txn, oid, LockMode::Write)?;
            self.backend.mark_for_update(txn, oid)
        });
        self.finish(Some(txn), OpLevel::Trace, "markForUpdate", result)
    }

    pub fn get_object(
        &self,
        txn: &Transaction,
        oid: ObjectId,
        for_update: bool,
    ) -> Result<Vec<u8>, StoreError> {
        trace!(txn = %txn.id(), %oid, for_update, "getObject");
        let mode = if for_update {
            LockMode::Write
        } else {
            LockMode::Read
        };
        let result = self.in_txn(txn, || {
            self.objects.report_access(txn, oid, mode)?;
            self.backend.get_object(txn, oid, for_update)
        });
        self.finish(Some(txn), OpLevel::Trace, "getObject", result)
    }

    pub fn set_object(&self, txn: &Transaction, oid: ObjectId, data: &[u8]) -> Result<(), StoreError> {
        trace!(txn = %txn.id(), %oid, len = data.len(), "setObject");
        let result = self.in_txn(txn, || {
            self.objects.report_access(txn, oid, LockMode::Write)?;
            self.backend.set_object(txn, oid, data)
        });
        self.finish(Some(txn), OpLevel::Trace, "setObject", result)
    }

    /// Stores several objects at once. `oids` and `data` must have equal
    /// length.
    pub fn set_objects(
        &self,
        txn: &Transaction,
        oids: &[ObjectId],
        data: &[&[u8]],
    ) -> Result<(), StoreError> {
        trace!(txn = %txn.id(), count = oids.len(), "setObjects");
        let result = if oids.len() != data.len() {
            Err(StoreError::InvalidArgument(format!(
                "{} object ids but {} data items",
                oids.len(),
                data.len()
            )))
        } else {
            self.in_txn(txn, || {
                for oid in oids {
                    self.objects.report_access(txn, *oid, LockMode::Write)?;
                }
                self.backend.set_objects(txn, oids, data)
            })
        };
        self.finish(Some(txn), OpLevel::Trace, "setObjects", result)
    }

    pub fn remove_object(&self, txn: &Transaction, oid: ObjectId) -> Result<(), StoreError> {
        trace!(txn = %txn.id(), %oid, "removeObject");
        let result = self.in_txn(txn, || {
            self.objects.report_access(txn, oid, LockMode::Write)?;
            self.backend.remove_object(txn, oid)
        });
        self.finish(Some(txn), OpLevel::Trace, "removeObject", result)
    }

    /// Returns the object bound to `name`.
    ///
    /// When the name is unbound the next bound name is read-locked as well,
    /// so a concurrent binding of `name` conflicts with this lookup.
    pub fn get_binding(&self, txn: &Transaction, name: &str) -> Result<ObjectId, StoreError> {
        trace!(txn = %txn.id(), name, "getBinding");
        let result = self.in_txn(txn, || {
            self.report_name(txn, Some(name), LockMode::Read)?;
            match self.backend.get_binding(txn, name)? {
                BindingValue::Bound { oid, .. } => Ok(oid),
                BindingValue::Unbound { next_name } => {
                    self.report_name(txn, next_name.as_deref(), LockMode::Read)?;
                    Err(StoreError::NameNotBound {
                        name: name.to_string(),
                    })
                }
            }
        });
        self.finish(Some(txn), OpLevel::Trace, "getBinding", result)
    }

    /// Binds `name` to `oid`, replacing any previous binding.
    pub fn set_binding(&self, txn: &Transaction, name: &str, oid: ObjectId) -> Result<(), StoreError> {
        trace!(txn = %txn.id(), name, %oid, "setBinding");
        let result = self.in_txn(txn, || {
            self.report_name(txn, Some(name), LockMode::Write)?;
            if let BindingValue::Unbound { next_name } = self.backend.set_binding(txn, name, oid)? {
                self.report_name(txn, next_name.as_deref(), LockMode::Write)?;
            }
            Ok(())
        });
        self.finish(Some(txn), OpLevel::Trace, "setBinding", result)
    }

    /// Removes the binding for `name`.
    ///
    /// The next bound name is locked too: for writing if a binding was
    /// removed, for reading otherwise.
    pub fn remove_binding(&self, txn: &Transaction, name: &str) -> Result<(), StoreError> {
        trace!(txn = %txn.id(), name, "removeBinding");
        let result = self.in_txn(txn, || {
            self.report_name(txn, Some(name), LockMode::Write)?;
            let removed = self.backend.remove_binding(txn, name)?;
            let mode = if removed.is_bound() {
                LockMode::Write
            } else {
                LockMode::Read
            };
            lock_next_name(
                removed.next_name().map(str::to_string),
                |next| self.report_name(txn, next, mode),
                || self.backend.next_bound_name(txn, Some(name)),
            )?;
            if removed.is_bound() {
                Ok(())
            } else {
                Err(StoreError::NameNotBound {
                    name: name.to_string(),
                })
            }
        });
        self.finish(Some(txn), OpLevel::Trace, "removeBinding", result)
    }

    /// Returns the first bound name after `name`, or the first bound name
    /// when `name` is `None`. `None` in the result means the end of the
    /// namespace.
    pub fn next_bound_name(
        &self,
        txn: &Transaction,
        name: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        trace!(txn = %txn.id(), name = ?name, "nextBoundName");
        let result = self.in_txn(txn, || {
            let first = self.backend.next_bound_name(txn, name)?;
            lock_next_name(
                first,
                |next| self.report_name(txn, next, LockMode::Read),
                || self.backend.next_bound_name(txn, name),
            )
        });
        self.finish(Some(txn), OpLevel::Trace, "nextBoundName", result)
    }

    /// Returns the id of a class descriptor, registering it if needed.
    pub fn get_class_id(&self, txn: &Transaction, class_info: &[u8]) -> Result<ClassId, StoreError> {
        debug!(txn = %txn.id(), len = class_info.len(), "getClassId");
        let result = if class_info.is_empty() {
            Err(StoreError::InvalidArgument(
                "class info must not be empty".into(),
            ))
        } else {
            self.in_txn(txn, || self.backend.get_class_id(txn, class_info))
        };
        self.finish(Some(txn), OpLevel::Debug, "getClassId", result)
    }

    pub fn get_class_info(&self, txn: &Transaction, class_id: ClassId) -> Result<Vec<u8>, StoreError> {
        debug!(txn = %txn.id(), %class_id, "getClassInfo");
        let result = if !class_id.is_valid() {
            Err(StoreError::InvalidArgument(format!(
                "class id must be greater than zero: {class_id}"
            )))
        } else {
            self.in_txn(txn, || self.backend.get_class_info(txn, class_id))
        };
        self.finish(Some(txn), OpLevel::Debug, "getClassInfo", result)
    }

    /// Returns the first existing object id after `oid`, or the first one
    /// when `oid` is `None`.
    ///
    /// Only the returned object is read-locked. Iteration is not
    /// serializable: objects created or removed between calls may or may
    /// not be seen.
    pub fn next_object_id(
        &self,
        txn: &Transaction,
        oid: Option<ObjectId>,
    ) -> Result<Option<ObjectId>, StoreError> {
        trace!(txn = %txn.id(), oid = ?oid, "nextObjectId");
        let result = self.in_txn(txn, || {
            let next = self.backend.next_object_id(txn, oid)?;
            if let Some(next) = next {
                self.objects.report_access(txn, next, LockMode::Read)?;
            }
            Ok(next)
        });
        self.finish(Some(txn), OpLevel::Trace, "nextObjectId", result)
    }

    /// Attaches a description to an object for conflict messages.
    pub fn set_object_description(&self, txn: &Transaction, oid: ObjectId, description: impl Into<String>) {
        self.objects.set_description(txn, oid, description.into());
    }

    /// Attaches a description to a name for conflict messages.
    pub fn set_binding_description(&self, txn: &Transaction, name: &str, description: impl Into<String>) {
        self.names
            .set_description(txn, name_for_access(Some(name)), description.into());
    }

    /// Shuts the backend down. Later calls do nothing.
    pub fn shutdown(&self) -> Result<(), StoreError> {
        debug!("shutdown");
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.backend.shutdown();
        self.finish(None, OpLevel::Debug, "shutdown", result)
    }

    fn report_name(&self, txn: &Transaction, name: Option<&str>, mode: LockMode) -> Result<(), StoreError> {
        self.names.report_access(txn, name_for_access(name), mode)
    }

    fn in_txn<T>(
        &self,
        txn: &Transaction,
        op: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        txn.check_active()?;
        op()
    }

    fn end_transaction(&self, txn: &Transaction) {
        self.objects.end_transaction(txn);
        self.names.end_transaction(txn);
    }

    fn finish<T>(
        &self,
        txn: Option<&Transaction>,
        level: OpLevel,
        op: &str,
        result: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let txn_id = txn.map(Transaction::id);
        match result {
            Ok(value) => {
                match level {
                    OpLevel::Trace => trace!(txn = ?txn_id, "{op} returns"),
                    OpLevel::Debug => debug!(txn = ?txn_id, "{op} returns"),
                }
                Ok(value)
            }
            Err(err) => Err(self.handle_error(txn, txn_id, level, op, err)),
        }
    }

    /// Aborts the transaction for abort-class errors and logs the failure.
    fn handle_error(
        &self,
        txn: Option<&Transaction>,
        txn_id: Option<TxnId>,
        level: OpLevel,
        op: &str,
        err: StoreError,
    ) -> StoreError {
        if let StoreError::TransactionAborted { cause, .. } = &err {
            if let Some(txn) = txn {
                txn.abort(cause.clone());
            }
            match level {
                OpLevel::Trace => trace!(target: "txstore::abort", txn = ?txn_id, error = %err, "{op} throws"),
                OpLevel::Debug => debug!(target: "txstore::abort", txn = ?txn_id, error = %err, "{op} throws"),
            }
        } else {
            match level {
                OpLevel::Trace => trace!(txn = ?txn_id, error = %err, "{op} throws"),
                OpLevel::Debug => debug!(txn = ?txn_id, error = %err, "{op} throws"),
            }
        }
        err
    }

    fn prepare_txn(&self, txn: &Transaction) -> Result<bool, StoreError> {
        txn.begin_prepare()?;
        let read_only = self.backend.prepare(txn)?;
        if read_only {
            txn.complete_commit();
            self.end_transaction(txn);
        }
        Ok(read_only)
    }

    fn commit_txn(&self, txn: &Transaction) -> Result<(), StoreError> {
        txn.check_prepared()?;
        self.backend.commit(txn)?;
        txn.complete_commit();
        self.end_transaction(txn);
        Ok(())
    }

    fn prepare_and_commit_txn(&self, txn: &Transaction) -> Result<(), StoreError> {
        txn.begin_prepare()?;
        self.backend.prepare_and_commit(txn)?;
        txn.complete_commit();
        self.end_transaction(txn);
        Ok(())
    }

    fn abort_txn(&self, txn: &Transaction) -> Result<(), StoreError> {
        txn.begin_participant_abort()?;
        let result = self.backend.abort(txn);
        self.end_transaction(txn);
        result
    }
}

impl<B: StorageBackend> TransactionParticipant for DataStore<B> {
    fn prepare(&self, txn: &Transaction) -> Result<bool, StoreError> {
        debug!(txn = %txn.id(), "prepare");
        let result = self.prepare_txn(txn);
        self.finish(Some(txn), OpLevel::Debug, "prepare", result)
    }

    fn commit(&self, txn: &Transaction) -> Result<(), StoreError> {
        debug!(txn = %txn.id(), "commit");
        let result = self.commit_txn(txn);
        self.finish(Some(txn), OpLevel::Debug, "commit", result)
    }

    fn prepare_and_commit(&self, txn: &Transaction) -> Result<(), StoreError> {
        debug!(txn = %txn.id(), "prepareAndCommit");
        let result = self.prepare_and_commit_txn(txn);
        self.finish(Some(txn), OpLevel::Debug, "prepareAndCommit", result)
    }

    fn abort(&self, txn: &Transaction) -> Result<(), StoreError> {
        debug!(txn = %txn.id(), "abort");
        let result = self.abort_txn(txn);
        self.finish(Some(txn), OpLevel::Debug, "abort", result)
    }

    fn type_name(&self) -> &str {
        "DataStore"
    }
}
