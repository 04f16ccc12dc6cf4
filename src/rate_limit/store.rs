//! Attempt Store
//!
//! In-memory state for every (actor, category) pair: the attempt records inside
//! the sliding window, the violation counter, and the last time the pair was
//! touched. Each pair sits behind its own mutex so that the
//! prune → count → append-or-increment sequence is atomic per key while
//! distinct keys only share the brief map lookup.

use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::error::{RateLimitError, RateLimitResult};
use crate::metrics;

/// Key for one actor's quota in one category
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct LimitKey<A> {
    /// Throttled identity
    pub actor: A,

    /// Resolved category tag
    pub category: String,
}

impl<A> LimitKey<A> {
    pub fn new(actor: A, category: impl Into<String>) -> Self {
        Self {
            actor,
            category: category.into(),
        }
    }
}

/// A single admitted attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub at: DateTime<Utc>,
    pub weight: u32,
}

/// Mutable state of one key
#[derive(Debug)]
pub struct KeyState {
    attempts: VecDeque<Attempt>,
    violations: u32,
    last_seen: DateTime<Utc>,
    /// Set once the entry has been unlinked from the map
    retired: bool,
}

impl KeyState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            attempts: VecDeque::new(),
            violations: 0,
            last_seen: now,
            retired: false,
        }
    }

    /// Drop every record that is no longer strictly inside the window
    pub fn prune(&mut self, now: DateTime<Utc>, window: chrono::Duration) {
        self.attempts.retain(|attempt| now - attempt.at < window);
    }

    /// Sum of weights of the stored records
    pub fn count(&self) -> u64 {
        self.attempts.iter().map(|a| u64::from(a.weight)).sum()
    }

    pub fn record(&mut self, at: DateTime<Utc>, weight: u32) {
        self.attempts.push_back(Attempt { at, weight });
    }

    /// Increment the violation counter and return the new value
    pub fn add_violation(&mut self) -> u32 {
        self.violations = self.violations.saturating_add(1);
        self.violations
    }

    pub fn violations(&self) -> u32 {
        self.violations
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.attempts.iter().map(|a| a.at).min()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    fn is_idle(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_seen >= ttl
    }
}

type Entry = Arc<Mutex<KeyState>>;

/// In-memory attempt store
#[derive(Debug)]
pub struct AttemptStore<A> {
    entries: RwLock<HashMap<LimitKey<A>, Entry>>,
}

impl<A> AttemptStore<A>
where
    A: Eq + Hash + Clone + Debug,
{
    /// Create a new attempt store
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Run `f` with exclusive access to the key's state, creating it if needed
    ///
    /// If the entry is retired by a reset or sweep between lookup and lock, the
    /// key is resolved again so the update lands in the live entry.
    pub fn with_entry<R>(
        &self,
        key: &LimitKey<A>,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut KeyState) -> R,
    ) -> RateLimitResult<R> {
        loop {
            let entry = self.get_or_create(key, now)?;
            let mut state = lock(&entry)?;
            if state.retired {
                continue;
            }
            state.touch(now);
            return Ok(f(&mut state));
        }
    }

    /// Run `f` with exclusive access to the key's state if it exists
    pub fn with_existing<R>(
        &self,
        key: &LimitKey<A>,
        f: impl FnOnce(&mut KeyState) -> R,
    ) -> RateLimitResult<Option<R>> {
        let entry = {
            let entries = self
                .entries
                .read()
                .map_err(|_| RateLimitError::LockPoisoned("attempt map"))?;
            match entries.get(key) {
                Some(entry) => Arc::clone(entry),
                None => return Ok(None),
            }
        };

        let mut state = lock(&entry)?;
        if state.retired {
            return Ok(None);
        }
        Ok(Some(f(&mut state)))
    }

    fn get_or_create(&self, key: &LimitKey<A>, now: DateTime<Utc>) -> RateLimitResult<Entry> {
        {
            let entries = self
                .entries
                .read()
                .map_err(|_| RateLimitError::LockPoisoned("attempt map"))?;
            if let Some(entry) = entries.get(key) {
                return Ok(Arc::clone(entry));
            }
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| RateLimitError::LockPoisoned("attempt map"))?;
        match entries.entry(key.clone()) {
            MapEntry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            MapEntry::Vacant(vacant) => {
                metrics::RATE_LIMIT_TRACKED_KEYS.inc();
                Ok(Arc::clone(
                    vacant.insert(Arc::new(Mutex::new(KeyState::new(now)))),
                ))
            }
        }
    }

    /// Remove every key belonging to `actor`, returning how many were removed
    pub fn remove_actor(&self, actor: &A) -> RateLimitResult<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RateLimitError::LockPoisoned("attempt map"))?;

        let mut removed = 0;
        let mut fault = None;
        entries.retain(|key, entry| {
            if &key.actor != actor {
                return true;
            }
            match entry.lock() {
                Ok(mut state) => state.retired = true,
                Err(_) => fault = Some(RateLimitError::LockPoisoned("attempt state")),
            }
            removed += 1;
            false
        });

        match fault {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Remove keys idle for at least `ttl` whose records have all aged out
    ///
    /// `window_of` resolves the window for a key's category so that keys with
    /// live records are never dropped.
    pub fn sweep_idle(
        &self,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
        window_of: impl Fn(&str) -> chrono::Duration,
    ) -> RateLimitResult<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RateLimitError::LockPoisoned("attempt map"))?;

        let before = entries.len();
        entries.retain(|key, entry| {
            // A poisoned entry is unusable; dropping it frees the key.
            let Ok(mut state) = entry.lock() else {
                return false;
            };
            state.prune(now, window_of(&key.category));
            if state.is_empty() && state.is_idle(now, ttl) {
                state.retired = true;
                false
            } else {
                true
            }
        });

        Ok(before - entries.len())
    }

    /// Number of tracked (actor, category) keys
    pub fn len(&self) -> RateLimitResult<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RateLimitError::LockPoisoned("attempt map"))?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> RateLimitResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Categories currently tracked for an actor
    pub fn categories_of(&self, actor: &A) -> RateLimitResult<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RateLimitError::LockPoisoned("attempt map"))?;
        let mut categories: Vec<String> = entries
            .keys()
            .filter(|key| &key.actor == actor)
            .map(|key| key.category.clone())
            .collect();
        categories.sort();
        Ok(categories)
    }

    #[cfg(test)]
    pub(crate) fn poison_for_test(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.entries.write();
            panic!("poisoning attempt map");
        }));
    }
}

impl<A> Default for AttemptStore<A>
where
    A: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock(entry: &Entry) -> RateLimitResult<MutexGuard<'_, KeyState>> {
    entry
        .lock()
        .map_err(|_| RateLimitError::LockPoisoned("attempt state"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(actor: i64, category: &str) -> LimitKey<i64> {
        LimitKey::new(actor, category)
    }

    #[test]
    fn test_store_creation() {
        let store: AttemptStore<i64> = AttemptStore::new();
        assert_eq!(store.len().unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_with_entry_creates_lazily() {
        let store = AttemptStore::new();
        let now = Utc::now();

        let count = store
            .with_entry(&key(1, "message"), now, |state| {
                state.record(now, 1);
                state.count()
            })
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_with_existing_does_not_create() {
        let store = AttemptStore::new();
        let seen = store.with_existing(&key(1, "auth"), |s| s.count()).unwrap();
        assert!(seen.is_none());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_prune_is_strict_at_window_edge() {
        let now = Utc::now();
        let mut state = KeyState::new(now);
        state.record(now - chrono::Duration::seconds(60), 1);
        state.record(now - chrono::Duration::seconds(59), 1);

        state.prune(now, chrono::Duration::seconds(60));
        assert_eq!(state.count(), 1);
    }

    #[test]
    fn test_count_sums_weights() {
        let now = Utc::now();
        let mut state = KeyState::new(now);
        state.record(now, 2);
        state.record(now, 3);
        assert_eq!(state.count(), 5);
    }

    #[test]
    fn test_remove_actor_only_touches_that_actor() {
        let store = AttemptStore::new();
        let now = Utc::now();

        for category in ["message", "auth"] {
            store.with_entry(&key(1, category), now, |s| s.record(now, 1)).unwrap();
        }
        store.with_entry(&key(2, "message"), now, |s| s.record(now, 1)).unwrap();

        assert_eq!(store.remove_actor(&1).unwrap(), 2);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.categories_of(&2).unwrap(), vec!["message".to_string()]);
        assert_eq!(store.remove_actor(&1).unwrap(), 0);
    }

    #[test]
    fn test_update_after_reset_lands_in_live_entry() {
        let store = AttemptStore::new();
        let now = Utc::now();
        let k = key(1, "auth");

        store.with_entry(&k, now, |s| s.record(now, 1)).unwrap();
        let detached = store.get_or_create(&k, now).unwrap();

        assert_eq!(store.remove_actor(&1).unwrap(), 1);
        assert!(lock(&detached).unwrap().retired);

        store.with_entry(&k, now, |s| s.record(now, 1)).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.with_existing(&k, |s| s.count()).unwrap(), Some(1));
        let live = store.get_or_create(&k, now).unwrap();
        assert!(!Arc::ptr_eq(&live, &detached));
        // the retired entry keeps only what it held before the reset
        assert_eq!(lock(&detached).unwrap().count(), 1);
    }

    #[test]
    fn test_waiter_on_retired_entry_resolves_again() {
        let store = Arc::new(AttemptStore::new());
        let now = Utc::now();
        let k = key(7, "payment");

        let old = store.get_or_create(&k, now).unwrap();
        let mut guard = lock(&old).unwrap();

        let worker = {
            let store = Arc::clone(&store);
            let k = k.clone();
            std::thread::spawn(move || {
                store
                    .with_entry(&k, now, |s| {
                        s.record(now, 1);
                        s.count()
                    })
                    .unwrap()
            })
        };

        // map, this test and the worker each hold the entry once the worker is blocked on it
        while Arc::strong_count(&old) < 3 {
            std::thread::yield_now();
        }
        guard.retired = true;
        store.entries.write().unwrap().remove(&k);
        drop(guard);

        assert_eq!(worker.join().unwrap(), 1);
        assert_eq!(lock(&old).unwrap().count(), 0);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.with_existing(&k, |s| s.count()).unwrap(), Some(1));
    }

    #[test]
    fn test_sweep_keeps_live_and_recent_keys() {
        let store = AttemptStore::new();
        let start = Utc::now();
        let window = chrono::Duration::seconds(60);
        let ttl = chrono::Duration::hours(24);

        // idle for a day, records long gone
        store.with_entry(&key(1, "message"), start, |s| s.record(start, 1)).unwrap();

        let later = start + chrono::Duration::hours(25);
        // fresh activity
        store.with_entry(&key(2, "message"), later, |s| s.record(later, 1)).unwrap();

        let removed = store.sweep_idle(later, ttl, |_| window).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.categories_of(&1).unwrap().len(), 0);
        assert_eq!(store.categories_of(&2).unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_keeps_idle_key_with_live_records() {
        let store = AttemptStore::new();
        let start = Utc::now();

        store.with_entry(&key(1, "payment"), start, |s| s.record(start, 1)).unwrap();

        let later = start + chrono::Duration::seconds(30);
        let removed = store
            .sweep_idle(later, chrono::Duration::seconds(10), |_| {
                chrono::Duration::seconds(600)
            })
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_poisoned_map_reports_fault() {
        let store: AttemptStore<i64> = AttemptStore::new();
        store.poison_for_test();
        assert!(matches!(
            store.len(),
            Err(RateLimitError::LockPoisoned(_))
        ));
    }
}
