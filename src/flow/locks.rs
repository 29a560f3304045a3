//! Exclusive mutation scopes for status buckets and flows.
//!
//! A mutation names every bucket and flow it will touch up front; the locks
//! are taken in ascending [`ScopeKey`] order so two mutations crossing the
//! same pair of buckets in opposite directions cannot deadlock. The scopes
//! only serialise writers inside this process; across processes the
//! database's immediate transactions do the same job.

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Something a mutation needs exclusive access to.
///
/// The derived ordering (buckets before flows, then by id ascending) is the
/// global lock order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeKey {
    /// The position sequence of one status bucket.
    Bucket(String),
    /// The edge set of one flow.
    Flow(String),
}

/// Registry of per-scope mutexes shared by every clone of a store.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    table: Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every scope in `keys` is held exclusively.
    ///
    /// Duplicates are ignored. The scopes stay held until the returned guard
    /// is dropped.
    pub fn acquire<I>(&self, keys: I) -> ScopeGuard
    where
        I: IntoIterator<Item = ScopeKey>,
    {
        let keys: BTreeSet<ScopeKey> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = {
                let mut table = self.table.lock();
                Arc::clone(table.entry(key.clone()).or_default())
            };
            guards.push(lock.lock_arc());
        }
        ScopeGuard { keys: keys.into_iter().collect(), _guards: guards }
    }
}

/// Held scopes; released on drop.
pub struct ScopeGuard {
    keys: Vec<ScopeKey>,
    _guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl ScopeGuard {
    /// The scopes held, in acquisition order.
    #[must_use]
    pub fn keys(&self) -> &[ScopeKey] {
        &self.keys
    }

    /// Whether `key` is among the held scopes.
    #[must_use]
    pub fn holds(&self, key: &ScopeKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard").field("keys", &self.keys).finish()
    }
}
