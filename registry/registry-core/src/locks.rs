// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Keyed mutual exclusion scopes.

use std::{
    collections::{BTreeSet, HashMap},
    hash::Hash,
    sync::{Arc, Mutex, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of async mutexes addressed by key, created on demand.
///
/// Entries are dropped once no guard or waiter refers to them anymore.
pub struct KeyedLocks<K> {
    entries: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

/// Guard of a single key.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Guards of several keys, acquired in key order.
#[derive(Debug)]
pub struct MultiKeyGuard<K> {
    keys: BTreeSet<K>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl<K: Ord> MultiKeyGuard<K> {
    /// Whether `key` is held by this guard.
    pub fn holds(&self, key: &K) -> bool {
        self.keys.contains(key)
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    /// Creates an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyGuard {
        let guard = self.entry(&key).lock_owned().await;
        KeyGuard { _guard: guard }
    }

    /// Waits for exclusive access to every key in `keys`.
    ///
    /// Keys are locked in ascending order so concurrent callers with
    /// overlapping key sets cannot deadlock.
    pub async fn lock_many(&self, keys: impl IntoIterator<Item = K>) -> MultiKeyGuard<K> {
        let keys: BTreeSet<K> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.entry(key).lock_owned().await);
        }
        MultiKeyGuard {
            keys,
            _guards: guards,
        }
    }

    fn entry(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = entries.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        entries.retain(|_, weak| weak.strong_count() > 0);
        let mutex = Arc::new(AsyncMutex::new(()));
        entries.insert(key.clone(), Arc::downgrade(&mutex));
        mutex
    }

    #[cfg(test)]
    fn live_entries(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock(1u32).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(1u32).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // Other keys do not contend.
        let _other = locks.lock(2u32).await;

        drop(guard);
        waiter.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn lock_many_dedups_and_orders() {
        let locks = KeyedLocks::new();
        let guard = locks.lock_many([3u32, 1, 3, 2]).await;
        assert_eq!(guard._guards.len(), 3);
        assert!([1, 2, 3].iter().all(|key| guard.holds(key)));
        assert!(!guard.holds(&4));
    }

    #[test_log::test(tokio::test)]
    async fn unused_entries_are_dropped() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.lock(1u32).await;
            let _b = locks.lock(2u32).await;
            assert_eq!(locks.live_entries(), 2);
        }
        assert_eq!(locks.live_entries(), 0);
    }
}
