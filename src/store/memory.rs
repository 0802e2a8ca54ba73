// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-memory storage backend.
//!
//! Committed state lives in ordered maps. Each transaction buffers its
//! writes in a private write set that overlays the committed state for its
//! own reads and is applied on commit. Isolation between transactions comes
//! from the locks the data store takes before calling in.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::txn::{Transaction, TxnId};

use super::{BindingValue, ClassId, ObjectId, StorageBackend, StoreError};

#[derive(Default)]
struct Committed {
    objects: BTreeMap<ObjectId, Vec<u8>>,
    names: BTreeMap<String, ObjectId>,
    classes: Vec<Vec<u8>>,
    class_ids: HashMap<Vec<u8>, ClassId>,
}

/// Buffered writes of one transaction. `None` marks a removal.
#[derive(Default)]
struct WriteSet {
    objects: BTreeMap<ObjectId, Option<Vec<u8>>>,
    names: BTreeMap<String, Option<ObjectId>>,
    prepared: bool,
}

impl WriteSet {
    fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.names.is_empty()
    }
}

/// A [`StorageBackend`] holding everything in memory.
///
/// Class registrations take effect immediately rather than at commit, so
/// an id handed out once is never handed out for another descriptor.
pub struct MemoryBackend {
    next_oid: AtomicU64,
    committed: RwLock<Committed>,
    pending: Mutex<HashMap<TxnId, WriteSet>>,
    shut_down: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            next_oid: AtomicU64::new(1),
            committed: RwLock::new(Committed::default()),
            pending: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Number of committed objects.
    pub fn object_count(&self) -> usize {
        self.committed.read().objects.len()
    }

    /// Number of committed name bindings.
    pub fn binding_count(&self) -> usize {
        self.committed.read().names.len()
    }

    /// Number of transactions with buffered writes.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_shut_down() {
            return Err(StoreError::IllegalState("backend is shut down".into()));
        }
        Ok(())
    }

    fn object(&self, txn: &Transaction, oid: ObjectId) -> Option<Vec<u8>> {
        let pending = self.pending.lock();
        if let Some(entry) = pending.get(&txn.id()).and_then(|w| w.objects.get(&oid)) {
            return entry.clone();
        }
        self.committed.read().objects.get(&oid).cloned()
    }

    fn require_object(&self, txn: &Transaction, oid: ObjectId) -> Result<Vec<u8>, StoreError> {
        self.object(txn, oid).ok_or(StoreError::ObjectNotFound { oid })
    }

    fn binding(pending: Option<&WriteSet>, committed: &Committed, name: &str) -> Option<ObjectId> {
        match pending.and_then(|w| w.names.get(name)) {
            Some(entry) => *entry,
            None => committed.names.get(name).copied(),
        }
    }

    fn next_name(pending: Option<&WriteSet>, committed: &Committed, after: Option<&str>) -> Option<String> {
        let range = (after.map_or(Bound::Unbounded, Bound::Excluded), Bound::Unbounded);
        let from_committed = committed
            .names
            .range::<str, _>(range)
            .map(|(name, _)| name)
            .find(|name| !matches!(pending.and_then(|w| w.names.get(name.as_str())), Some(None)));
        let from_pending = pending.and_then(|w| {
            w.names
                .range::<str, _>(range)
                .find(|(_, oid)| oid.is_some())
                .map(|(name, _)| name)
        });
        match (from_committed, from_pending) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            (a, b) => a.or(b).cloned(),
        }
    }

    fn next_object(
        pending: Option<&WriteSet>,
        committed: &Committed,
        after: Option<ObjectId>,
    ) -> Option<ObjectId> {
        let range = (after.map_or(Bound::Unbounded, Bound::Excluded), Bound::Unbounded);
        let from_committed = committed
            .objects
            .range(range)
            .map(|(oid, _)| *oid)
            .find(|oid| !matches!(pending.and_then(|w| w.objects.get(oid)), Some(None)));
        let from_pending = pending.and_then(|w| {
            w.objects
                .range(range)
                .find(|(_, data)| data.is_some())
                .map(|(oid, _)| *oid)
        });
        match (from_committed, from_pending) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn write(&self, txn: &Transaction, f: impl FnOnce(&mut WriteSet)) {
        let mut pending = self.pending.lock();
        f(pending.entry(txn.id()).or_default());
    }

    fn apply(&self, writes: WriteSet) {
        let mut committed = self.committed.write();
        for (oid, data) in writes.objects {
            match data {
                Some(data) => {
                    committed.objects.insert(oid, data);
                }
                None => {
                    committed.objects.remove(&oid);
                }
            }
        }
        for (name, oid) in writes.names {
            match oid {
                Some(oid) => {
                    committed.names.insert(name, oid);
                }
                None => {
                    committed.names.remove(&name);
                }
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn create_object(&self, txn: &Transaction) -> Result<ObjectId, StoreError> {
        self.check_open()?;
        let oid = ObjectId(self.next_oid.fetch_add(1, Ordering::Relaxed));
        self.write(txn, |w| {
            w.objects.insert(oid, Some(Vec::new()));
        });
        Ok(oid)
    }

    fn mark_for_update(&self, txn: &Transaction, oid: ObjectId) -> Result<(), StoreError> {
        self.check_open()?;
        self.require_object(txn, oid).map(|_| ())
    }

    fn get_object(
        &self,
        txn: &Transaction,
        oid: ObjectId,
        _for_update: bool,
    ) -> Result<Vec<u8>, StoreError> {
        self.check_open()?;
        self.require_object(txn, oid)
    }

    fn set_object(&self, txn: &Transaction, oid: ObjectId, data: &[u8]) -> Result<(), StoreError> {
        self.check_open()?;
        if oid.0 == 0 || oid.0 >= self.next_oid.load(Ordering::Relaxed) {
            return Err(StoreError::ObjectNotFound { oid });
        }
        self.write(txn, |w| {
            w.objects.insert(oid, Some(data.to_vec()));
        });
        Ok(())
    }

    fn remove_object(&self, txn: &Transaction, oid: ObjectId) -> Result<(), StoreError> {
        self.check_open()?;
        self.require_object(txn, oid)?;
        self.write(txn, |w| {
            w.objects.insert(oid, None);
        });
        Ok(())
    }

    fn get_binding(&self, txn: &Transaction, name: &str) -> Result<BindingValue, StoreError> {
        self.check_open()?;
        let pending = self.pending.lock();
        let committed = self.committed.read();
        let writes = pending.get(&txn.id());
        Ok(match Self::binding(writes, &committed, name) {
            Some(oid) => BindingValue::Bound {
                oid,
                next_name: None,
            },
            None => BindingValue::Unbound {
                next_name: Self::next_name(writes, &committed, Some(name)),
            },
        })
    }

    fn set_binding(
        &self,
        txn: &Transaction,
        name: &str,
        oid: ObjectId,
    ) -> Result<BindingValue, StoreError> {
        self.check_open()?;
        let mut pending = self.pending.lock();
        let committed = self.committed.read();
        let writes = pending.entry(txn.id()).or_default();
        let previous = Self::binding(Some(&*writes), &committed, name);
        writes.names.insert(name.to_string(), Some(oid));
        Ok(match previous {
            Some(previous) => BindingValue::Bound {
                oid: previous,
                next_name: None,
            },
            None => BindingValue::Unbound {
                next_name: Self::next_name(Some(&*writes), &committed, Some(name)),
            },
        })
    }

    fn remove_binding(&self, txn: &Transaction, name: &str) -> Result<BindingValue, StoreError> {
        self.check_open()?;
        let mut pending = self.pending.lock();
        let committed = self.committed.read();
        let previous = Self::binding(pending.get(&txn.id()), &committed, name);
        if let Some(oid) = previous {
            let writes = pending.entry(txn.id()).or_default();
            writes.names.insert(name.to_string(), None);
            return Ok(BindingValue::Bound {
                oid,
                next_name: Self::next_name(Some(&*writes), &committed, Some(name)),
            });
        }
        Ok(BindingValue::Unbound {
            next_name: Self::next_name(pending.get(&txn.id()), &committed, Some(name)),
        })
    }

    fn next_bound_name(
        &self,
        txn: &Transaction,
        name: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        self.check_open()?;
        let pending = self.pending.lock();
        let committed = self.committed.read();
        Ok(Self::next_name(pending.get(&txn.id()), &committed, name))
    }

    fn get_class_id(&self, _txn: &Transaction, class_info: &[u8]) -> Result<ClassId, StoreError> {
        self.check_open()?;
        let mut committed = self.committed.write();
        if let Some(id) = committed.class_ids.get(class_info) {
            return Ok(*id);
        }
        let next = u32::try_from(committed.classes.len() + 1)
            .map_err(|_| StoreError::Internal("class id space exhausted".into()))?;
        let id = ClassId(next);
        committed.classes.push(class_info.to_vec());
        committed.class_ids.insert(class_info.to_vec(), id);
        debug!(class_id = %id, "registered class");
        Ok(id)
    }

    fn get_class_info(&self, _txn: &Transaction, class_id: ClassId) -> Result<Vec<u8>, StoreError> {
        self.check_open()?;
        let committed = self.committed.read();
        (class_id.0 as usize)
            .checked_sub(1)
            .and_then(|i| committed.classes.get(i))
            .cloned()
            .ok_or(StoreError::ClassInfoNotFound { class_id })
    }

    fn next_object_id(
        &self,
        txn: &Transaction,
        oid: Option<ObjectId>,
    ) -> Result<Option<ObjectId>, StoreError> {
        self.check_open()?;
        let pending = self.pending.lock();
        let committed = self.committed.read();
        Ok(Self::next_object(pending.get(&txn.id()), &committed, oid))
    }

    fn shutdown(&self) -> Result<(), StoreError> {
        self.shut_down.store(true, Ordering::Release);
        let discarded = {
            let mut pending = self.pending.lock();
            let n = pending.len();
            pending.clear();
            n
        };
        debug!(discarded, "memory backend shut down");
        Ok(())
    }

    fn prepare(&self, txn: &Transaction) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut pending = self.pending.lock();
        match pending.get_mut(&txn.id()) {
            Some(writes) if !writes.is_empty() => {
                writes.prepared = true;
                Ok(false)
            }
            _ => {
                pending.remove(&txn.id());
                Ok(true)
            }
        }
    }

    fn commit(&self, txn: &Transaction) -> Result<(), StoreError> {
        self.check_open()?;
        let writes = self.pending.lock().remove(&txn.id());
        match writes {
            Some(writes) if writes.prepared => {
                self.apply(writes);
                Ok(())
            }
            Some(_) => Err(StoreError::IllegalState(format!(
                "transaction {} committed without prepare",
                txn.id()
            ))),
            None => Ok(()),
        }
    }

    fn prepare_and_commit(&self, txn: &Transaction) -> Result<(), StoreError> {
        self.check_open()?;
        let writes = self.pending.lock().remove(&txn.id());
        if let Some(writes) = writes {
            self.apply(writes);
        }
        Ok(())
    }

    fn abort(&self, txn: &Transaction) -> Result<(), StoreError> {
        self.pending.lock().remove(&txn.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Seniority;
    use std::time::Duration;

    fn txn(id: u64) -> Transaction {
        Transaction::new(TxnId(id), Seniority::new(id, 0), Duration::from_secs(10))
    }

    #[test]
    fn test_object_visibility() {
        let backend = MemoryBackend::new();
        let t1 = txn(1);
        let oid = backend.create_object(&t1).unwrap();
        backend.set_object(&t1, oid, b"hello").unwrap();
        assert_eq!(backend.get_object(&t1, oid, false).unwrap(), b"hello");

        let t2 = txn(2);
        assert!(matches!(
            backend.get_object(&t2, oid, false),
            Err(StoreError::ObjectNotFound { .. })
        ));

        backend.prepare_and_commit(&t1).unwrap();
        assert_eq!(backend.get_object(&t2, oid, false).unwrap(), b"hello");
        assert_eq!(backend.object_count(), 1);
    }

    #[test]
    fn test_object_ids_not_reused() {
        let backend = MemoryBackend::new();
        let t1 = txn(1);
        let a = backend.create_object(&t1).unwrap();
        backend.abort(&t1).unwrap();
        let t2 = txn(2);
        let b = backend.create_object(&t2).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_set_unallocated_object_fails() {
        let backend = MemoryBackend::new();
        let t = txn(1);
        assert!(matches!(
            backend.set_object(&t, ObjectId(99), b"x"),
            Err(StoreError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn test_binding_next_names() {
        let backend = MemoryBackend::new();
        let t1 = txn(1);
        let oid = backend.create_object(&t1).unwrap();
        backend.set_binding(&t1, "a", oid).unwrap();
        backend.set_binding(&t1, "c", oid).unwrap();
        backend.prepare_and_commit(&t1).unwrap();

        let t2 = txn(2);
        assert_eq!(
            backend.get_binding(&t2, "b").unwrap(),
            BindingValue::Unbound {
                next_name: Some("c".into())
            }
        );
        assert_eq!(
            backend.set_binding(&t2, "b", oid).unwrap(),
            BindingValue::Unbound {
                next_name: Some("c".into())
            }
        );
        assert_eq!(
            backend.next_bound_name(&t2, Some("a")).unwrap().as_deref(),
            Some("b")
        );

        assert_eq!(
            backend.remove_binding(&t2, "c").unwrap(),
            BindingValue::Bound {
                oid,
                next_name: None
            }
        );
        assert_eq!(backend.next_bound_name(&t2, Some("b")).unwrap(), None);
        assert_eq!(
            backend.next_bound_name(&txn(3), Some("b")).unwrap().as_deref(),
            Some("c")
        );
        assert_eq!(backend.next_bound_name(&t2, None).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_class_registration() {
        let backend = MemoryBackend::new();
        let t = txn(1);
        let a = backend.get_class_id(&t, b"class-a").unwrap();
        let b = backend.get_class_id(&t, b"class-b").unwrap();
        assert_eq!(a, ClassId(1));
        assert_eq!(b, ClassId(2));
        assert_eq!(backend.get_class_id(&t, b"class-a").unwrap(), a);
        assert_eq!(backend.get_class_info(&t, b).unwrap(), b"class-b");
        assert!(matches!(
            backend.get_class_info(&t, ClassId(3)),
            Err(StoreError::ClassInfoNotFound { .. })
        ));
    }

    #[test]
    fn test_read_only_prepare() {
        let backend = MemoryBackend::new();
        let t = txn(1);
        assert!(backend.prepare(&t).unwrap());

        let t = txn(2);
        backend.create_object(&t).unwrap();
        assert!(!backend.prepare(&t).unwrap());
        backend.commit(&t).unwrap();
        assert_eq!(backend.object_count(), 1);
        assert_eq!(backend.pending_count(), 0);
    }

    #[test]
    fn test_next_object_id() {
        let backend = MemoryBackend::new();
        let t = txn(1);
        let a = backend.create_object(&t).unwrap();
        let b = backend.create_object(&t).unwrap();
        let c = backend.create_object(&t).unwrap();
        backend.prepare_and_commit(&t).unwrap();

        let t = txn(2);
        backend.remove_object(&t, b).unwrap();
        assert_eq!(backend.next_object_id(&t, None).unwrap(), Some(a));
        assert_eq!(backend.next_object_id(&t, Some(a)).unwrap(), Some(c));
        assert_eq!(backend.next_object_id(&t, Some(c)).unwrap(), None);
    }

    #[test]
    fn test_shutdown_rejects_operations() {
        let backend = MemoryBackend::new();
        backend.shutdown().unwrap();
        assert!(backend.is_shut_down());
        assert!(matches!(
            backend.create_object(&txn(1)),
            Err(StoreError::IllegalState(_))
        ));
    }
}
