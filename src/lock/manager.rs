// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Sharded wound-wait lock manager.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::config::LockConfig;

use super::{
    LockAttemptResult, LockError, LockMode, LockRequest, Locker, Seniority, SeniorityHeader,
    WakeSignal, WoundReason,
};

/// Total order over lockers: seniority first, then ordinal.
#[inline]
fn rank<L: Locker>(locker: &L, seniority: Seniority) -> (Seniority, u64) {
    (seniority, locker.ordinal())
}

/// A held or queued request on one key.
struct LockEntry<L> {
    header: SeniorityHeader<L>,
    mode: LockMode,
    granted: bool,
}

impl<L: Locker> LockEntry<L> {
    fn rank(&self) -> (Seniority, u64) {
        rank(self.header.owner(), self.header.seniority())
    }

    fn new(locker: &L, mode: LockMode, granted: bool) -> Self {
        Self {
            header: SeniorityHeader::new(locker.clone(), locker.seniority(), locker.deadline()),
            mode,
            granted,
        }
    }
}

/// Per-key lock state: holders and queued requests.
struct KeyState<L> {
    entries: Vec<LockEntry<L>>,
}

impl<L: Locker> KeyState<L> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn position(&self, locker: &L) -> Option<usize> {
        self.entries.iter().position(|e| e.header.owner() == locker)
    }

    /// Removes `locker`'s entry, waking everything parked on it.
    fn remove(&mut self, locker: &L) -> bool {
        match self.position(locker) {
            Some(i) => {
                let entry = self.entries.remove(i);
                entry.header.notify_listeners();
                true
            }
            None => false,
        }
    }

    /// Index of the oldest entry of another locker that conflicts with `mode`
    /// and satisfies `filter`.
    fn oldest_conflict(
        &self,
        locker: &L,
        mode: LockMode,
        filter: impl Fn(&LockEntry<L>) -> bool,
    ) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.header.owner() != locker && mode.conflicts_with(e.mode) && filter(e))
            .min_by_key(|(_, e)| e.rank())
            .map(|(i, _)| i)
    }
}

enum Attempt<L> {
    Granted,
    Blocked { index: usize, holder: L },
}

/// A shard of the lock table.
struct Shard<K, L> {
    keys: HashMap<K, KeyState<L>>,
}

/// Lock manager arbitrating keys of type `K` between lockers of type `L`.
///
/// Uses sharding to reduce contention. Each shard is protected by a RwLock
/// that is held only while inspecting or updating key state; blocked
/// requests park on their own wake signal with no shard lock held.
pub struct LockManager<K, L> {
    shards: Box<[RwLock<Shard<K, L>>]>,
    parked: Mutex<HashMap<L, Arc<WakeSignal>>>,
}

impl<K, L> LockManager<K, L>
where
    K: Hash + Eq + Clone + Debug,
    L: Locker,
{
    /// Creates a lock manager with the default shard count.
    pub fn new() -> Self {
        Self::from_config(&LockConfig::default())
    }

    /// Creates a lock manager with `num_shards` shards (at least one).
    pub fn with_shards(num_shards: usize) -> Self {
        let shards = (0..num_shards.max(1))
            .map(|_| {
                RwLock::new(Shard {
                    keys: HashMap::new(),
                })
            })
            .collect();
        Self {
            shards,
            parked: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a lock manager from configuration.
    pub fn from_config(config: &LockConfig) -> Self {
        Self::with_shards(config.num_shards)
    }

    #[inline]
    fn shard(&self, key: &K) -> &RwLock<Shard<K, L>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }

    /// Acquires `key` in `mode`, blocking while an older locker is in the way.
    ///
    /// Returns once granted, when the locker's deadline passes, or when the
    /// locker stops being active (for example because it was wounded on
    /// another key while waiting here).
    pub fn lock(&self, locker: &L, key: &K, mode: LockMode) -> Result<(), LockError<L>> {
        let deadline = locker.deadline();
        let shard = self.shard(key);

        loop {
            if !locker.is_active() {
                self.abandon(key, locker);
                return Err(LockError::NotActive);
            }

            let signal = Arc::new(WakeSignal::new());
            let holder = {
                let mut shard = shard.write();
                let state = shard
                    .keys
                    .entry(key.clone())
                    .or_insert_with(KeyState::new);
                match self.attempt(state, locker, mode, Instant::now(), true) {
                    Attempt::Granted => {
                        self.parked.lock().remove(locker);
                        return Ok(());
                    }
                    Attempt::Blocked { index, holder } => {
                        state.entries[index].header.add_listener(Arc::clone(&signal));
                        self.parked.lock().insert(locker.clone(), Arc::clone(&signal));
                        holder
                    }
                }
            };

            if Instant::now() >= deadline {
                self.abandon(key, locker);
                return Err(LockError::Timeout {
                    holder: Some(holder),
                });
            }

            trace!(key = ?key, locker = ?locker, holder = ?holder, %mode, "waiting for lock");
            signal.wait_until(deadline);
        }
    }

    /// Makes a single attempt to acquire `key`, never blocking or queueing.
    pub fn try_lock(
        &self,
        locker: &L,
        key: &K,
        mode: LockMode,
    ) -> Result<LockAttemptResult<K, L>, LockError<L>> {
        if !locker.is_active() {
            return Err(LockError::NotActive);
        }

        let mut shard = self.shard(key).write();
        let state = shard
            .keys
            .entry(key.clone())
            .or_insert_with(KeyState::new);
        let conflict = match self.attempt(state, locker, mode, Instant::now(), false) {
            Attempt::Granted => None,
            Attempt::Blocked { holder, .. } => Some(holder),
        };
        if state.entries.is_empty() {
            shard.keys.remove(key);
        }

        Ok(LockAttemptResult {
            request: LockRequest::new(key.clone(), locker.clone(), mode),
            conflict,
        })
    }

    /// Releases `locker`'s entry on `key`. Returns true if one was present.
    pub fn release(&self, locker: &L, key: &K) -> bool {
        let mut shard = self.shard(key).write();
        let (removed, empty) = match shard.keys.get_mut(key) {
            Some(state) => (state.remove(locker), state.entries.is_empty()),
            None => (false, false),
        };
        if empty {
            shard.keys.remove(key);
        }
        removed
    }

    /// Releases every entry held or queued by `locker`.
    ///
    /// Called on commit or abort.
    pub fn release_all(&self, locker: &L) {
        self.parked.lock().remove(locker);
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            shard.keys.retain(|_, state| {
                state.remove(locker);
                !state.entries.is_empty()
            });
        }
    }

    /// Returns the current holders of `key` and their modes.
    pub fn holders(&self, key: &K) -> Vec<(L, LockMode)> {
        let shard = self.shard(key).read();
        shard
            .keys
            .get(key)
            .map(|state| {
                state
                    .entries
                    .iter()
                    .filter(|e| e.granted)
                    .map(|e| (e.header.owner().clone(), e.mode))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the lockers queued on `key`, oldest first.
    pub fn waiters(&self, key: &K) -> Vec<L> {
        let shard = self.shard(key).read();
        let mut queued: Vec<_> = shard
            .keys
            .get(key)
            .map(|state| {
                state
                    .entries
                    .iter()
                    .filter(|e| !e.granted)
                    .map(|e| (e.rank(), e.header.owner().clone()))
                    .collect()
            })
            .unwrap_or_default();
        queued.sort_by_key(|(rank, _)| *rank);
        queued.into_iter().map(|(_, locker)| locker).collect()
    }

    /// Returns true if no key has any holder or queued request.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().keys.is_empty())
    }

    fn attempt(
        &self,
        state: &mut KeyState<L>,
        locker: &L,
        mode: LockMode,
        now: Instant,
        enqueue: bool,
    ) -> Attempt<L> {
        self.evict_expired(state, locker, now);

        let own = state.position(locker);
        if let Some(i) = own {
            let entry = &state.entries[i];
            if entry.granted && entry.mode.max(mode) == entry.mode {
                return Attempt::Granted;
            }
        }

        let own_rank = rank(locker, locker.seniority());

        // Anything older that conflicts, held or queued, makes us wait.
        if let Some(index) = state.oldest_conflict(locker, mode, |e| e.rank() < own_rank) {
            return Self::block(state, locker, mode, index, enqueue && own.is_none());
        }

        // Every remaining conflicting holder is younger.
        let victims: Vec<L> = state
            .entries
            .iter()
            .filter(|e| e.granted && e.header.owner() != locker && mode.conflicts_with(e.mode))
            .map(|e| e.header.owner().clone())
            .collect();
        for victim in victims {
            if victim.wound(WoundReason::Wounded { by: locker.clone() }) {
                debug!(victim = ?victim, wounded_by = ?locker, "wounded younger lock holder");
                state.remove(&victim);
                self.wake_parked(&victim);
            }
        }

        // Holders that could not be wounded still block.
        if let Some(index) = state.oldest_conflict(locker, mode, |e| e.granted) {
            let own_missing = state.position(locker).is_none();
            return Self::block(state, locker, mode, index, enqueue && own_missing);
        }

        match state.position(locker) {
            Some(i) => {
                let entry = &mut state.entries[i];
                entry.mode = entry.mode.max(mode);
                entry.granted = true;
                entry.header.notify_listeners();
            }
            None => state.entries.push(LockEntry::new(locker, mode, true)),
        }
        Attempt::Granted
    }

    fn block(
        state: &mut KeyState<L>,
        locker: &L,
        mode: LockMode,
        index: usize,
        enqueue: bool,
    ) -> Attempt<L> {
        let holder = state.entries[index].header.owner().clone();
        if enqueue {
            state.entries.push(LockEntry::new(locker, mode, false));
        }
        Attempt::Blocked { index, holder }
    }

    fn evict_expired(&self, state: &mut KeyState<L>, requester: &L, now: Instant) {
        let expired: Vec<L> = state
            .entries
            .iter()
            .filter(|e| e.granted && e.header.owner() != requester && e.header.is_expired(now))
            .map(|e| e.header.owner().clone())
            .collect();
        for owner in expired {
            // A holder that refuses keeps its entry and still blocks.
            if owner.wound(WoundReason::Expired) {
                debug!(owner = ?owner, "evicted expired lock holder");
                state.remove(&owner);
                self.wake_parked(&owner);
            }
        }
    }

    /// Drops a queued (not granted) entry left behind by a failed wait.
    fn abandon(&self, key: &K, locker: &L) {
        self.parked.lock().remove(locker);

        let mut shard = self.shard(key).write();
        let empty = match shard.keys.get_mut(key) {
            Some(state) => {
                if let Some(i) = state.position(locker) {
                    if !state.entries[i].granted {
                        let entry = state.entries.remove(i);
                        entry.header.notify_listeners();
                    }
                }
                state.entries.is_empty()
            }
            None => false,
        };
        if empty {
            shard.keys.remove(key);
        }
    }

    fn wake_parked(&self, locker: &L) {
        if let Some(signal) = self.parked.lock().get(locker) {
            signal.notify();
        }
    }
}

impl<K, L> Default for LockManager<K, L>
where
    K: Hash + Eq + Clone + Debug,
    L: Locker,
{
    fn default() -> Self {
        Self::new()
    }
}



#[cfg(test)]
mod tests_support {
    use super::*;
    use crate::lock::Seniority;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone)]
    pub(super) struct PropLocker {
        pub(super) id: u32,
        pub(super) seniority: Seniority,
        aborted: Arc<AtomicBool>,
    }

    impl PropLocker {
        pub(super) fn new(id: u32, timestamp: u64) -> Self {
            Self {
                id,
                seniority: Seniority::new(timestamp, u64::from(id)),
                aborted: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl PartialEq for PropLocker {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Eq for PropLocker {}

    impl Hash for PropLocker {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl Locker for PropLocker {
        fn seniority(&self) -> Seniority {
            self.seniority
        }

        fn ordinal(&self) -> u64 {
            u64::from(self.id)
        }

        fn deadline(&self) -> Instant {
            Instant::now() + std::time::Duration::from_secs(60)
        }

        fn is_active(&self) -> bool {
            !self.aborted.load(Ordering::SeqCst)
        }

        fn wound(&self, _reason: WoundReason<Self>) -> bool {
            self.aborted.store(true, Ordering::SeqCst);
            true
        }
    }
}
