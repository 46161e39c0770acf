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
//! In-memory document store.

use std::{
    collections::BTreeMap,
    ops::Bound,
    path::Path,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Collection, DocumentStore, StoreError, Version, Versioned};

type Documents = BTreeMap<String, Versioned<Value>>;

/// Serializable content of a [MemoryDocumentStore].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Users collection.
    #[serde(default)]
    pub users: Documents,
    /// Subnets collection.
    #[serde(default)]
    pub subnets: Documents,
    /// Address pool collection.
    #[serde(default)]
    pub address_assignments: Documents,
}

impl StoreSnapshot {
    fn documents(&self, collection: Collection) -> &Documents {
        match collection {
            Collection::Users => &self.users,
            Collection::Subnets => &self.subnets,
            Collection::AddressAssignments => &self.address_assignments,
        }
    }

    fn documents_mut(&mut self, collection: Collection) -> &mut Documents {
        match collection {
            Collection::Users => &mut self.users,
            Collection::Subnets => &mut self.subnets,
            Collection::AddressAssignments => &mut self.address_assignments,
        }
    }
}

/// A [DocumentStore] keeping all documents in memory.
///
/// The content can be saved to and restored from a JSON state file.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: RwLock<StoreSnapshot>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given content.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Loads a store from `path`. A missing file yields an empty store.
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let snapshot = wgd_utils::io::read_file_if_exists(path)
            .await?
            .unwrap_or_default();
        Ok(Self::from_snapshot(snapshot))
    }

    /// Copy of the current content.
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(self.read_state()?.clone())
    }

    /// Atomically writes the current content to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let snapshot = self.snapshot().map_err(std::io::Error::other)?;
        wgd_utils::io::write_file_atomic(path, &snapshot).await
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreSnapshot>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, StoreSnapshot>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

fn check_version(
    collection: Collection,
    id: &str,
    current: &Versioned<Value>,
    expected: Version,
) -> Result<(), StoreError> {
    if current.version != expected {
        return Err(StoreError::VersionConflict {
            collection,
            id: id.to_string(),
            expected,
            actual: current.version,
        });
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<Version, StoreError> {
        let mut state = self.write_state()?;
        let documents = state.documents_mut(collection);
        if documents.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                collection,
                id: id.to_string(),
            });
        }
        documents.insert(
            id.to_string(),
            Versioned {
                version: 1,
                value: document,
            },
        );
        Ok(1)
    }

    async fn read(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Versioned<Value>>, StoreError> {
        Ok(self.read_state()?.documents(collection).get(id).cloned())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
        document: Value,
    ) -> Result<Version, StoreError> {
        let mut state = self.write_state()?;
        let current = state
            .documents_mut(collection)
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        check_version(collection, id, current, expected)?;
        current.version += 1;
        current.value = document;
        Ok(current.version)
    }

    async fn delete(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
    ) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        let documents = state.documents_mut(collection);
        let current = documents.get(id).ok_or_else(|| StoreError::NotFound {
            collection,
            id: id.to_string(),
        })?;
        check_version(collection, id, current, expected)?;
        documents.remove(id);
        Ok(())
    }

    async fn scan(
        &self,
        collection: Collection,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Versioned<Value>)>, StoreError> {
        let state = self.read_state()?;
        let lower = match after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        Ok(state
            .documents(collection)
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect())
    }
}
