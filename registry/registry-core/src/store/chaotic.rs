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
//! Fault injecting document store.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::Value;

use crate::store::{Collection, DocumentStore, SharedStore, StoreError, Version, Versioned};

/// Selects which writes a [ChaoticStore] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    /// Only writes to this collection are considered. `None` matches all.
    pub collection: Option<Collection>,
    /// Number of matching writes that succeed before failures start.
    pub skip: usize,
    /// Number of matching writes that fail.
    pub failures: usize,
}

impl FaultPlan {
    /// Fails the matching write after `skip` successful ones, once.
    pub fn fail_once_after(collection: Option<Collection>, skip: usize) -> Self {
        Self {
            collection,
            skip,
            failures: 1,
        }
    }
}

/// Wraps a [DocumentStore] and fails writes according to a [FaultPlan].
///
/// Reads and scans are always passed through.
pub struct ChaoticStore {
    inner: SharedStore,
    plan: Mutex<Option<FaultPlan>>,
    injected: AtomicUsize,
}

impl ChaoticStore {
    /// Wraps `inner` without any planned faults.
    pub fn new(inner: SharedStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            plan: Mutex::new(None),
            injected: AtomicUsize::new(0),
        })
    }

    /// Replaces the current fault plan.
    pub fn arm(&self, plan: FaultPlan) {
        if let Ok(mut current) = self.plan.lock() {
            *current = Some(plan);
        }
    }

    /// Removes the current fault plan.
    pub fn disarm(&self) {
        if let Ok(mut current) = self.plan.lock() {
            *current = None;
        }
    }

    /// Number of faults injected so far.
    pub fn injected_faults(&self) -> usize {
        self.injected.load(Ordering::Relaxed)
    }

    fn maybe_fail(&self, op: &str, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut guard = self
            .plan
            .lock()
            .map_err(|_| StoreError::Unavailable("fault plan lock poisoned".into()))?;
        let Some(plan) = guard.as_mut() else {
            return Ok(());
        };
        if plan.collection.is_some_and(|c| c != collection) {
            return Ok(());
        }
        if plan.skip > 0 {
            plan.skip -= 1;
            return Ok(());
        }
        if plan.failures == 0 {
            *guard = None;
            return Ok(());
        }
        plan.failures -= 1;
        if plan.failures == 0 {
            *guard = None;
        }
        self.injected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%collection, %id, op, "injecting store fault");
        Err(StoreError::Unavailable(format!(
            "injected fault on {op} {collection}/{id}"
        )))
    }
}

#[async_trait]
impl DocumentStore for ChaoticStore {
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<Version, StoreError> {
        self.maybe_fail("create", collection, id)?;
        self.inner.create(collection, id, document).await
    }

    async fn read(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Versioned<Value>>, StoreError> {
        self.inner.read(collection, id).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
        document: Value,
    ) -> Result<Version, StoreError> {
        self.maybe_fail("update", collection, id)?;
        self.inner.update(collection, id, expected, document).await
    }

    async fn delete(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
    ) -> Result<(), StoreError> {
        self.maybe_fail("delete", collection, id)?;
        self.inner.delete(collection, id, expected).await
    }

    async fn scan(
        &self,
        collection: Collection,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Versioned<Value>)>, StoreError> {
        self.inner.scan(collection, after, limit).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::memory::MemoryDocumentStore;

    #[test_log::test(tokio::test)]
    async fn fails_selected_write_only() {
        let store = ChaoticStore::new(Arc::new(MemoryDocumentStore::new()));
        store.arm(FaultPlan::fail_once_after(Some(Collection::Subnets), 1));

        store
            .create(Collection::Users, "u", json!(0))
            .await
            .unwrap();
        store
            .create(Collection::Subnets, "a", json!(0))
            .await
            .unwrap();
        assert!(matches!(
            store.create(Collection::Subnets, "b", json!(0)).await,
            Err(StoreError::Unavailable(_))
        ));
        store
            .create(Collection::Subnets, "b", json!(0))
            .await
            .unwrap();

        assert_eq!(store.injected_faults(), 1);
        assert!(store.read(Collection::Subnets, "b").await.unwrap().is_some());
    }
}
