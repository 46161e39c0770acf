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
//! Document store gateway.
//!
//! The registry persists its entities as JSON documents in three collections.
//! Every document carries a version which is bumped by each write, so
//! read-modify-write cycles can be made conditional on the version they read.

use std::{fmt, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

pub mod chaotic;
pub mod memory;

/// Document version. The first version of a document is 1.
pub type Version = u64;

/// Number of times a conditional write is attempted before a conflict is
/// surfaced as an error.
pub const MAX_WRITE_ATTEMPTS: usize = 10;

/// Collections of the registry store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// [crate::model::User] documents keyed by user id.
    Users,
    /// [crate::model::Subnet] documents keyed by subnet id.
    Subnets,
    /// Address pool documents keyed by subnet id.
    AddressAssignments,
}

impl Collection {
    /// Collection name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Subnets => "subnets",
            Collection::AddressAssignments => "address_assignments",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document together with its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Version of `value`.
    pub version: Version,
    /// The document.
    pub value: T,
}

/// Document store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A document with this id already exists.
    #[error("document {collection}/{id} already exists")]
    AlreadyExists {
        /// Collection.
        collection: Collection,
        /// Document id.
        id: String,
    },
    /// The document does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound {
        /// Collection.
        collection: Collection,
        /// Document id.
        id: String,
    },
    /// A conditional write found a different version than expected.
    #[error("document {collection}/{id} is at version {actual}, expected {expected}")]
    VersionConflict {
        /// Collection.
        collection: Collection,
        /// Document id.
        id: String,
        /// Version the write was conditioned on.
        expected: Version,
        /// Current version.
        actual: Version,
    },
    /// The store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A document could not be (de)serialized.
    #[error("malformed document {collection}/{id}: {reason}")]
    Malformed {
        /// Collection.
        collection: Collection,
        /// Document id.
        id: String,
        /// Serde error.
        reason: String,
    },
}

/// Persistence of versioned JSON documents.
///
/// Implementations must apply each call atomically: a conditional write
/// either stores the new document and bumps the version or changes nothing.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Stores a new document and returns its version.
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<Version, StoreError>;

    /// Reads a document.
    async fn read(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Versioned<Value>>, StoreError>;

    /// Replaces a document if it is still at `expected` and returns the new
    /// version.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
        document: Value,
    ) -> Result<Version, StoreError>;

    /// Deletes a document if it is still at `expected`.
    async fn delete(
        &self,
        collection: Collection,
        id: &str,
        expected: Version,
    ) -> Result<(), StoreError>;

    /// Returns up to `limit` documents with ids strictly greater than
    /// `after`, ordered by id.
    async fn scan(
        &self,
        collection: Collection,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Versioned<Value>)>, StoreError>;
}

/// Result of [TypedCollection::modify].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modified<T, R> {
    /// Version written.
    pub version: Version,
    /// Document written.
    pub value: T,
    /// Value returned by the modification.
    pub output: R,
}

/// Shared handle to a [DocumentStore].
pub type SharedStore = Arc<dyn DocumentStore>;

/// Typed view of one collection.
pub struct TypedCollection<T> {
    store: SharedStore,
    collection: Collection,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            collection: self.collection,
            _marker: PhantomData,
        }
    }
}

impl<T> TypedCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a typed view of `collection`.
    pub fn new(store: SharedStore, collection: Collection) -> Self {
        Self {
            store,
            collection,
            _marker: PhantomData,
        }
    }

    /// The collection.
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// See [DocumentStore::create].
    pub async fn create(&self, id: &str, value: &T) -> Result<Version, StoreError> {
        let document = self.encode(id, value)?;
        self.store.create(self.collection, id, document).await
    }

    /// See [DocumentStore::read].
    pub async fn read(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError> {
        match self.store.read(self.collection, id).await? {
            Some(doc) => Ok(Some(self.decode(id, doc)?)),
            None => Ok(None),
        }
    }

    /// See [DocumentStore::update].
    pub async fn update(
        &self,
        id: &str,
        expected: Version,
        value: &T,
    ) -> Result<Version, StoreError> {
        let document = self.encode(id, value)?;
        self.store
            .update(self.collection, id, expected, document)
            .await
    }

    /// See [DocumentStore::delete].
    pub async fn delete(&self, id: &str, expected: Version) -> Result<(), StoreError> {
        self.store.delete(self.collection, id, expected).await
    }

    /// See [DocumentStore::scan].
    pub async fn scan(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Versioned<T>)>, StoreError> {
        self.store
            .scan(self.collection, after, limit)
            .await?
            .into_iter()
            .map(|(id, doc)| {
                let decoded = self.decode(&id, doc)?;
                Ok((id, decoded))
            })
            .collect()
    }

    /// Applies `f` to the current document and writes the result
    /// conditionally on the version read.
    ///
    /// On a version conflict the document is read again and `f` is applied
    /// to the fresh copy, up to [MAX_WRITE_ATTEMPTS] times. Returns `None`
    /// if the document does not exist. If `f` fails nothing is written.
    pub async fn modify<R, E, F>(&self, id: &str, mut f: F) -> Result<Option<Modified<T, R>>, E>
    where
        F: FnMut(Version, &mut T) -> Result<R, E>,
        E: From<StoreError>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(mut current) = self.read(id).await? else {
                return Ok(None);
            };
            let output = f(current.version, &mut current.value)?;
            match self.update(id, current.version, &current.value).await {
                Ok(version) => {
                    return Ok(Some(Modified {
                        version,
                        value: current.value,
                        output,
                    }));
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::debug!(collection = %self.collection, %id, attempt, "Version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Unavailable(format!(
            "{}/{id} kept changing, gave up after {MAX_WRITE_ATTEMPTS} attempts",
            self.collection
        ))
        .into())
    }

    /// Scans the entire collection page by page.
    pub async fn scan_all(&self) -> Result<Vec<(String, Versioned<T>)>, StoreError> {
        const PAGE: usize = 256;

        let mut out = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self.scan(after.as_deref(), PAGE).await?;
            let done = page.len() < PAGE;
            after = page.last().map(|(id, _)| id.clone());
            out.extend(page);
            if done {
                return Ok(out);
            }
        }
    }

    fn encode(&self, id: &str, value: &T) -> Result<Value, StoreError> {
        serde_json::to_value(value).map_err(|e| StoreError::Malformed {
            collection: self.collection,
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, id: &str, doc: Versioned<Value>) -> Result<Versioned<T>, StoreError> {
        let value = serde_json::from_value(doc.value).map_err(|e| StoreError::Malformed {
            collection: self.collection,
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Versioned {
            version: doc.version,
            value,
        })
    }
}
