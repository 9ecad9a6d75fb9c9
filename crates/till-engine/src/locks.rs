//! # Keyed Locks
//!
//! A registry of async mutexes keyed by string (product id, phone number).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sale 1: lock [apple, milk]   ──► holds apple, milk                    │
//! │  sale 2: lock [milk, bread]   ──► sorted: [bread, milk]                │
//! │                                   holds bread, waits on milk           │
//! │  sale 3: lock [tea]           ──► runs in parallel                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are always taken in sorted order, so two multi-key holders can never
//! wait on each other in a cycle. Entries are removed once no guard or waiter
//! refers to them.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Registry = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    registry: Registry,
}

/// Holds one or more keys until dropped.
#[derive(Debug)]
pub struct KeyedGuard {
    registry: Registry,
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every key (duplicates ignored) in sorted order.
    ///
    /// Cancellation-safe: if the returned future is dropped part-way, the
    /// keys taken so far are released.
    pub async fn acquire<I, S>(&self, keys: I) -> KeyedGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = keys.into_iter().map(Into::into).collect();

        let mut guard = KeyedGuard {
            registry: self.registry.clone(),
            keys: Vec::with_capacity(sorted.len()),
            guards: Vec::with_capacity(sorted.len()),
        };

        for key in sorted {
            let mutex = self.entry(&key);
            guard.keys.push(key);
            guard.guards.push(mutex.lock_owned().await);
        }

        guard
    }

    /// Convenience for a single key.
    pub async fn acquire_one(&self, key: &str) -> KeyedGuard {
        self.acquire([key]).await
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.registry.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        match self.registry.lock() {
            Ok(mut map) => map
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone(),
            // every map operation here leaves it consistent
            Err(poisoned) => poisoned
                .into_inner()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone(),
        }
    }
}

impl KeyedGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        self.guards.clear();

        let mut map = match self.registry.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in &self.keys {
            // only the registry's own reference left: nobody holds or waits
            if map.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
                map.remove(key);
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
