//! Per-object read/write locks.
//!
//! Locks are keyed by `(repository id, object id)` and created lazily in a
//! concurrent map. Guards own a reference to their lock, so they can outlive
//! the map lookup and be collected into a [`LockSet`].
//!
//! Several locks are always taken in the order of their [`LockKey`]; two
//! operations locking overlapping sets therefore cannot deadlock.

use dashmap::DashMap;
use log::debug;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default number of entries above which idle locks are pruned
const DEFAULT_PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey {
    pub repository_id: String,
    pub object_id: String,
}

impl LockKey {
    pub fn new(repository_id: &str, object_id: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            object_id: object_id.to_string(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.repository_id, self.object_id)
    }
}

/// Ordered so that `Write` is the stronger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub key: LockKey,
    pub mode: LockMode,
}

impl LockRequest {
    pub fn read(repository_id: &str, object_id: &str) -> Self {
        Self {
            key: LockKey::new(repository_id, object_id),
            mode: LockMode::Read,
        }
    }

    pub fn write(repository_id: &str, object_id: &str) -> Self {
        Self {
            key: LockKey::new(repository_id, object_id),
            mode: LockMode::Write,
        }
    }
}

pub type ReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;
pub type WriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// A held lock of either mode.
pub enum LockGuard {
    Read(ReadGuard),
    Write(WriteGuard),
}

impl LockGuard {
    pub fn mode(&self) -> LockMode {
        match self {
            LockGuard::Read(_) => LockMode::Read,
            LockGuard::Write(_) => LockMode::Write,
        }
    }
}

/// Locks acquired together by [`LockCoordinator::bulk_lock`].
///
/// Dropping the set releases the locks in reverse acquisition order.
pub struct LockSet {
    guards: Vec<(LockKey, LockGuard)>,
}

impl LockSet {
    /// Keys in acquisition order.
    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.guards.iter().map(|(k, _)| k)
    }

    pub fn mode_of(&self, key: &LockKey) -> Option<LockMode> {
        self.guards
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, g)| g.mode())
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some((key, guard)) = self.guards.pop() {
            debug!("LockSet: releasing {} ({:?})", key, guard.mode());
            drop(guard);
        }
    }
}

/// Hands out per-object locks shared by every repository of a process.
pub struct LockCoordinator {
    locks: DashMap<LockKey, Arc<RwLock<()>>>,
    prune_threshold: usize,
    /// Map size that triggers the next automatic prune.
    prune_at: AtomicUsize,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    /// Create a coordinator that prunes idle entries once the map holds more
    /// than `prune_threshold` of them.
    ///
    /// After a prune the trigger moves to twice the surviving entries, so a
    /// map full of held locks is not rescanned on every acquisition.
    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        let prune_threshold = prune_threshold.max(1);
        Self {
            locks: DashMap::new(),
            prune_threshold,
            prune_at: AtomicUsize::new(prune_threshold),
        }
    }

    fn lock_for(&self, key: &LockKey) -> Arc<RwLock<()>> {
        if self.locks.len() > self.prune_at.load(Ordering::Relaxed) {
            self.auto_prune();
        }
        // The shard guard is dropped at the end of this statement, before
        // the caller blocks on the returned lock.
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Block until a shared lock on `(repository_id, object_id)` is held.
    pub fn read_lock(&self, repository_id: &str, object_id: &str) -> ReadGuard {
        let key = LockKey::new(repository_id, object_id);
        debug!("LockCoordinator::read_lock: {}", key);
        self.lock_for(&key).read_arc()
    }

    /// Block until an exclusive lock on `(repository_id, object_id)` is held.
    pub fn write_lock(&self, repository_id: &str, object_id: &str) -> WriteGuard {
        let key = LockKey::new(repository_id, object_id);
        debug!("LockCoordinator::write_lock: {}", key);
        self.lock_for(&key).write_arc()
    }

    /// Acquire every requested lock in key order.
    ///
    /// Duplicate keys are merged into one acquisition of the strongest
    /// requested mode.
    pub fn bulk_lock(&self, requests: Vec<LockRequest>) -> LockSet {
        let mut merged: BTreeMap<LockKey, LockMode> = BTreeMap::new();
        for request in requests {
            merged
                .entry(request.key)
                .and_modify(|m| *m = (*m).max(request.mode))
                .or_insert(request.mode);
        }

        let mut guards = Vec::with_capacity(merged.len());
        for (key, mode) in merged {
            debug!("LockCoordinator::bulk_lock: acquiring {} ({:?})", key, mode);
            let lock = self.lock_for(&key);
            let guard = match mode {
                LockMode::Read => LockGuard::Read(lock.read_arc()),
                LockMode::Write => LockGuard::Write(lock.write_arc()),
            };
            guards.push((key, guard));
        }
        LockSet { guards }
    }

    /// Release a set acquired by [`bulk_lock`](Self::bulk_lock).
    pub fn bulk_unlock(&self, set: LockSet) {
        drop(set);
    }

    fn auto_prune(&self) {
        self.prune_idle();
        let next = (self.locks.len() * 2).max(self.prune_threshold);
        self.prune_at.store(next, Ordering::Relaxed);
        debug!("LockCoordinator: next prune above {} entries", next);
    }

    /// Remove entries no guard or waiter refers to.
    ///
    /// Returns the number of entries removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let removed = before.saturating_sub(self.locks.len());
        if removed > 0 {
            debug!("LockCoordinator::prune_idle: removed {} idle locks", removed);
        }
        removed
    }

    /// Number of lock entries currently in the map.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_readers_share_writers_exclude() {
        let locks = Arc::new(LockCoordinator::new());
        let r1 = locks.read_lock("repo", "a");
        let r2 = locks.read_lock("repo", "a");

        let entered = Arc::new(AtomicUsize::new(0));
        let handle = {
            let locks = Arc::clone(&locks);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _w = locks.write_lock("repo", "a");
                entered.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(entered.load(Ordering::SeqCst), 0);
        drop(r1);
        drop(r2);
        handle.join().unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_keys_are_scoped_per_repository() {
        let locks = LockCoordinator::new();
        let _a = locks.write_lock("repo1", "x");
        // Would block forever if the key ignored the repository.
        let _b = locks.write_lock("repo2", "x");
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_bulk_lock_merges_to_strongest_mode() {
        let locks = LockCoordinator::new();
        let set = locks.bulk_lock(vec![
            LockRequest::read("r", "b"),
            LockRequest::write("r", "a"),
            LockRequest::write("r", "b"),
            LockRequest::read("r", "a"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.mode_of(&LockKey::new("r", "a")), Some(LockMode::Write));
        assert_eq!(set.mode_of(&LockKey::new("r", "b")), Some(LockMode::Write));
    }

    #[test]
    fn test_opposite_orders_do_not_deadlock() {
        let locks = Arc::new(LockCoordinator::new());
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let locks = Arc::clone(&locks);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let ids = if i == 0 { ["a", "b"] } else { ["b", "a"] };
                        let set = locks.bulk_lock(
                            ids.iter().map(|id| LockRequest::write("r", id)).collect(),
                        );
                        locks.bulk_unlock(set);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_prune_keeps_held_locks() {
        let locks = LockCoordinator::new();
        let held = locks.write_lock("r", "held");
        drop(locks.read_lock("r", "idle"));
        assert_eq!(locks.len(), 2);

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune_idle(), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_auto_prune_backs_off_while_locks_are_held() {
        let locks = LockCoordinator::with_prune_threshold(4);
        let held: Vec<_> = (0..5).map(|i| locks.write_lock("r", &format!("h{}", i))).collect();
        assert_eq!(locks.len(), 5);

        // The first idle acquisition prunes nothing and moves the trigger to 10.
        for i in 0..4 {
            drop(locks.read_lock("r", &format!("i{}", i)));
        }
        assert_eq!(locks.len(), 9);

        for i in 4..6 {
            drop(locks.read_lock("r", &format!("i{}", i)));
        }
        assert_eq!(locks.len(), 11);
        // Past the raised trigger: the idle entries go, the held ones stay.
        drop(locks.read_lock("r", "i6"));
        assert_eq!(locks.len(), 6);
        drop(held);
    }

    #[test]
    fn test_auto_prune_past_threshold() {
        let locks = LockCoordinator::with_prune_threshold(4);
        for i in 0..20 {
            drop(locks.write_lock("r", &i.to_string()));
        }
        assert!(locks.len() <= 5);
    }

    proptest! {
        #[test]
        fn prop_bulk_lock_acquires_in_sorted_unique_order(
            ids in proptest::collection::vec(("[ab]", "[a-e]{1,2}", any::<bool>()), 0..12)
        ) {
            let locks = LockCoordinator::new();
            let requests: Vec<LockRequest> = ids
                .iter()
                .map(|(repo, id, write)| {
                    if *write { LockRequest::write(repo, id) } else { LockRequest::read(repo, id) }
                })
                .collect();

            let set = locks.bulk_lock(requests.clone());
            let acquired: Vec<LockKey> = set.keys().cloned().collect();

            let mut expected: Vec<LockKey> = requests.iter().map(|r| r.key.clone()).collect();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(acquired, expected);

            for request in &requests {
                let mode = set.mode_of(&request.key).unwrap();
                prop_assert!(mode >= request.mode);
            }
        }
    }
}
