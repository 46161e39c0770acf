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
//! Subnets and their address pools.

use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use wgd_address_manager::{
    allocator::{AddressAllocator, AllocatorError},
    cidr::SubnetCidr,
};

use crate::{
    error::RegistryError,
    locks::{KeyedLocks, MultiKeyGuard},
    model::{
        AddressAssignment, Subnet, SubnetFilter, SubnetId, SubnetMetadata, SubnetMetadataPatch,
        UserId,
    },
    pagination::{self, ListingStream},
    store::{Collection, SharedStore, TypedCollection, Version},
};

/// Longest accepted subnet name.
pub const MAX_NAME_LEN: usize = 128;
/// Longest accepted subnet description.
pub const MAX_DESCRIPTION_LEN: usize = 1024;
/// Longest accepted device label.
pub const MAX_DEVICE_LABEL_LEN: usize = 64;

/// Persisted pool state of one subnet.
///
/// All assignments of a subnet live in one document so that every allocation
/// or release is a single conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    /// Subnet owning the pool.
    pub subnet_id: SubnetId,
    /// Block of the subnet.
    pub cidr: SubnetCidr,
    /// Assignments ordered by address.
    pub assignments: Vec<AddressAssignment>,
}

impl AddressPool {
    fn position(&self, address: Ipv4Addr) -> Result<usize, usize> {
        self.assignments
            .binary_search_by_key(&address, |assignment| assignment.address)
    }

    fn insert(&mut self, assignment: AddressAssignment) {
        let pos = self
            .assignments
            .partition_point(|existing| existing.address < assignment.address);
        self.assignments.insert(pos, assignment);
    }
}

struct CachedAllocator {
    version: Version,
    allocator: AddressAllocator,
}

/// Registry of subnets, each with its own address allocator.
///
/// Operations on one subnet are serialized by a per-subnet lock, operations
/// on different subnets run independently.
pub struct SubnetRegistry {
    subnets: TypedCollection<Subnet>,
    pools: TypedCollection<AddressPool>,
    locks: KeyedLocks<SubnetId>,
    create_lock: tokio::sync::Mutex<()>,
    allocators: Mutex<HashMap<SubnetId, CachedAllocator>>,
}

impl SubnetRegistry {
    /// Creates a registry backed by `store`.
    pub fn new(store: SharedStore) -> Self {
        Self {
            subnets: TypedCollection::new(store.clone(), Collection::Subnets),
            pools: TypedCollection::new(store, Collection::AddressAssignments),
            locks: KeyedLocks::new(),
            create_lock: tokio::sync::Mutex::new(()),
            allocators: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a subnet from its CIDR notation.
    pub async fn create_subnet(
        &self,
        cidr: &str,
        metadata: SubnetMetadata,
    ) -> Result<Subnet, RegistryError> {
        let cidr: SubnetCidr = cidr.trim().parse()?;
        let metadata = validate_metadata(metadata)?;

        // Overlap checks and inserts are serialized among creators.
        let _create = self.create_lock.lock().await;
        for (_, existing) in self.subnets.scan_all().await? {
            if existing.value.cidr.overlaps(&cidr) {
                return Err(RegistryError::SubnetOverlap {
                    cidr,
                    existing: existing.value.id,
                    existing_cidr: existing.value.cidr,
                });
            }
        }

        let subnet = Subnet {
            id: SubnetId::generate(),
            cidr,
            metadata,
            created_at: Utc::now(),
        };
        let key = subnet.id.to_string();
        let pool = AddressPool {
            subnet_id: subnet.id,
            cidr,
            assignments: Vec::new(),
        };
        let pool_version = self.pools.create(&key, &pool).await?;
        if let Err(e) = self.subnets.create(&key, &subnet).await {
            if let Err(cleanup) = self.pools.delete(&key, pool_version).await {
                tracing::warn!(subnet=%subnet.id, error=%cleanup, "Failed to remove pool of aborted subnet");
            }
            return Err(e.into());
        }

        tracing::info!(subnet=%subnet.id, %cidr, name=%subnet.metadata.name, "Created subnet");
        Ok(subnet)
    }

    /// Returns a subnet.
    pub async fn get_subnet(&self, id: SubnetId) -> Result<Subnet, RegistryError> {
        self.subnets
            .read(&id.to_string())
            .await?
            .map(|doc| doc.value)
            .ok_or(RegistryError::SubnetNotFound(id))
    }

    /// Updates name and description of a subnet. The CIDR never changes.
    pub async fn update_metadata(
        &self,
        id: SubnetId,
        patch: SubnetMetadataPatch,
    ) -> Result<Subnet, RegistryError> {
        let _guard = self.locks.lock(id).await;
        let modified = self
            .subnets
            .modify(&id.to_string(), |_, subnet: &mut Subnet| {
                let mut metadata = subnet.metadata.clone();
                if let Some(name) = &patch.name {
                    metadata.name = name.clone();
                }
                if let Some(description) = &patch.description {
                    metadata.description = description.clone();
                }
                subnet.metadata = validate_metadata(metadata)?;
                Ok::<_, RegistryError>(())
            })
            .await?
            .ok_or(RegistryError::SubnetNotFound(id))?;

        tracing::info!(subnet=%id, name=%modified.value.metadata.name, "Updated subnet metadata");
        Ok(modified.value)
    }

    /// Deletes a subnet without assignments.
    pub async fn delete_subnet(&self, id: SubnetId) -> Result<(), RegistryError> {
        let _guard = self.locks.lock(id).await;
        let key = id.to_string();
        let subnet = self
            .subnets
            .read(&key)
            .await?
            .ok_or(RegistryError::SubnetNotFound(id))?;
        let pool = self
            .pools
            .read(&key)
            .await?
            .ok_or_else(|| RegistryError::Internal(format!("subnet {id} has no address pool")))?;
        if !pool.value.assignments.is_empty() {
            return Err(RegistryError::SubnetNotEmpty {
                subnet: id,
                assignments: pool.value.assignments.len(),
            });
        }

        self.subnets.delete(&key, subnet.version).await?;
        self.forget_allocator(id);
        // An orphaned pool is empty and unreachable once the subnet is gone.
        if let Err(e) = self.pools.delete(&key, pool.version).await {
            tracing::warn!(subnet=%id, error=%e, "Failed to remove address pool of deleted subnet");
        }

        tracing::info!(subnet=%id, cidr=%subnet.value.cidr, "Deleted subnet");
        Ok(())
    }

    /// Lists subnets passing `filter`, resuming after the item with cursor
    /// key `after`.
    pub fn list_subnets(
        &self,
        filter: SubnetFilter,
        after: Option<String>,
    ) -> ListingStream<Subnet> {
        let subnets = self.subnets.clone();
        pagination::paginate(
            after,
            pagination::DEFAULT_PAGE_SIZE,
            move |after, limit| {
                let subnets = subnets.clone();
                async move {
                    let page = subnets.scan(after.as_deref(), limit).await?;
                    Ok::<_, RegistryError>(
                        page.into_iter()
                            .map(|(key, doc)| (key, doc.value))
                            .collect::<Vec<_>>(),
                    )
                }
            },
            move |subnet| filter.matches(subnet),
        )
    }

    /// Assigns an address of the subnet to a device of `owner`.
    ///
    /// Without `requested` the lowest free address is assigned.
    pub async fn assign(
        &self,
        subnet_id: SubnetId,
        owner: UserId,
        device_label: &str,
        requested: Option<Ipv4Addr>,
    ) -> Result<AddressAssignment, RegistryError> {
        let device_label = validate_device_label(device_label)?;
        let _guard = self.locks.lock(subnet_id).await;
        if self.subnets.read(&subnet_id.to_string()).await?.is_none() {
            return Err(RegistryError::SubnetNotFound(subnet_id));
        }

        let assignment = self
            .modify_pool(subnet_id, |allocator, pool| {
                let address = allocator
                    .allocate(requested)
                    .map_err(|e| allocation_error(subnet_id, e))?;
                let assignment = AddressAssignment {
                    subnet_id,
                    address,
                    owner,
                    device_label: device_label.clone(),
                    assigned_at: Utc::now(),
                };
                pool.insert(assignment.clone());
                Ok(assignment)
            })
            .await?;

        tracing::info!(subnet=%subnet_id, address=%assignment.address, owner=%owner, "Assigned address");
        Ok(assignment)
    }

    /// Releases an assignment.
    ///
    /// With `expected_owner` set, only an assignment of that user is released.
    pub async fn release(
        &self,
        subnet_id: SubnetId,
        address: Ipv4Addr,
        expected_owner: Option<UserId>,
    ) -> Result<AddressAssignment, RegistryError> {
        let _guard = self.locks.lock(subnet_id).await;

        let released = self
            .modify_pool(subnet_id, |allocator, pool| {
                let pos = pool.position(address).map_err(|_| RegistryError::NotAssigned {
                    subnet: subnet_id,
                    address,
                })?;
                if let Some(owner) = expected_owner {
                    if pool.assignments[pos].owner != owner {
                        return Err(RegistryError::Forbidden(format!(
                            "address {address} is assigned to another user"
                        )));
                    }
                }
                allocator
                    .free(address)
                    .map_err(|e| allocation_error(subnet_id, e))?;
                Ok(pool.assignments.remove(pos))
            })
            .await?;

        tracing::info!(subnet=%subnet_id, %address, owner=%released.owner, "Released address");
        Ok(released)
    }

    /// Every assignment of a subnet.
    pub async fn assignments(
        &self,
        subnet_id: SubnetId,
    ) -> Result<Vec<AddressAssignment>, RegistryError> {
        self.pools
            .read(&subnet_id.to_string())
            .await?
            .map(|doc| doc.value.assignments)
            .ok_or(RegistryError::SubnetNotFound(subnet_id))
    }

    /// Lists the assignments of a subnet in address order.
    pub fn list_assignments(
        &self,
        subnet_id: SubnetId,
        after: Option<String>,
    ) -> ListingStream<AddressAssignment> {
        let pools = self.pools.clone();
        pagination::paginate(
            after,
            pagination::DEFAULT_PAGE_SIZE,
            move |after, limit| {
                let pools = pools.clone();
                async move {
                    let after = after
                        .map(|key| {
                            key.parse::<Ipv4Addr>().map_err(|_| {
                                RegistryError::InvalidArgument(format!(
                                    "cursor does not refer to an address: {key:?}"
                                ))
                            })
                        })
                        .transpose()?;
                    let pool = pools
                        .read(&subnet_id.to_string())
                        .await?
                        .ok_or(RegistryError::SubnetNotFound(subnet_id))?
                        .value;
                    Ok::<_, RegistryError>(
                        pool.assignments
                            .into_iter()
                            .filter(|a| after.is_none_or(|after| a.address > after))
                            .take(limit)
                            .map(|a| (a.address.to_string(), a))
                            .collect::<Vec<_>>(),
                    )
                }
            },
            |_| true,
        )
    }

    /// Every assignment owned by `owner`, across all subnets.
    pub async fn assignments_of(
        &self,
        owner: UserId,
    ) -> Result<Vec<AddressAssignment>, RegistryError> {
        Ok(self
            .pools
            .scan_all()
            .await?
            .into_iter()
            .flat_map(|(_, doc)| doc.value.assignments)
            .filter(|a| a.owner == owner)
            .collect())
    }

    /// Locks several subnets at once, in id order.
    pub async fn lock_subnets(
        &self,
        ids: impl IntoIterator<Item = SubnetId>,
    ) -> MultiKeyGuard<SubnetId> {
        self.locks.lock_many(ids).await
    }

    /// Releases every assignment of `owner` in a subnet locked by `guard`.
    pub async fn release_owner_locked(
        &self,
        guard: &MultiKeyGuard<SubnetId>,
        subnet_id: SubnetId,
        owner: UserId,
    ) -> Result<Vec<AddressAssignment>, RegistryError> {
        check_held(guard, subnet_id)?;
        self.modify_pool(subnet_id, |allocator, pool| {
            let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut pool.assignments)
                .into_iter()
                .partition(|a| a.owner == owner);
            pool.assignments = kept;
            for assignment in &released {
                allocator
                    .free(assignment.address)
                    .map_err(|e| allocation_error(subnet_id, e))?;
            }
            Ok(released)
        })
        .await
    }

    /// Re-inserts assignments released by [Self::release_owner_locked].
    pub async fn restore_locked(
        &self,
        guard: &MultiKeyGuard<SubnetId>,
        subnet_id: SubnetId,
        assignments: &[AddressAssignment],
    ) -> Result<(), RegistryError> {
        check_held(guard, subnet_id)?;
        self.modify_pool(subnet_id, |allocator, pool| {
            for assignment in assignments {
                allocator
                    .allocate(Some(assignment.address))
                    .map_err(|e| allocation_error(subnet_id, e))?;
                pool.insert(assignment.clone());
            }
            Ok(())
        })
        .await
    }

    /// Runs `f` against the allocator and pool document of a subnet and
    /// writes the pool back conditionally.
    ///
    /// The allocator passed to `f` always matches the pool document. It is
    /// cached per subnet and only rebuilt from the document when the cached
    /// version is outdated. The caller must hold the subnet lock.
    async fn modify_pool<R, F>(&self, subnet_id: SubnetId, mut f: F) -> Result<R, RegistryError>
    where
        F: FnMut(&mut AddressAllocator, &mut AddressPool) -> Result<R, RegistryError>,
    {
        let modified = self
            .pools
            .modify(&subnet_id.to_string(), |version, pool| {
                let mut allocator = self.take_allocator(subnet_id, version, pool)?;
                let allocated = allocator.allocated_count();
                match f(&mut allocator, pool) {
                    Ok(output) => Ok((output, allocator)),
                    Err(e) => {
                        // Nothing is written, so an allocator left untouched
                        // by `f` still matches the stored version.
                        if allocator.allocated_count() == allocated {
                            self.cache()
                                .insert(subnet_id, CachedAllocator { version, allocator });
                        }
                        Err(e)
                    }
                }
            })
            .await;

        match modified {
            Ok(Some(modified)) => {
                let (output, allocator) = modified.output;
                self.cache()
                    .insert(subnet_id, CachedAllocator {
                        version: modified.version,
                        allocator,
                    });
                Ok(output)
            }
            Ok(None) => Err(RegistryError::SubnetNotFound(subnet_id)),
            Err(e) => Err(e),
        }
    }

    fn take_allocator(
        &self,
        subnet_id: SubnetId,
        version: Version,
        pool: &AddressPool,
    ) -> Result<AddressAllocator, RegistryError> {
        if let Some(cached) = self.cache().remove(&subnet_id) {
            if cached.version == version {
                return Ok(cached.allocator);
            }
        }
        tracing::debug!(subnet=%subnet_id, version, "Rebuilding address allocator");
        AddressAllocator::from_allocated(pool.cidr, pool.assignments.iter().map(|a| a.address))
            .map_err(|e| {
                RegistryError::Internal(format!("corrupt address pool of subnet {subnet_id}: {e}"))
            })
    }

    fn forget_allocator(&self, subnet_id: SubnetId) {
        self.cache().remove(&subnet_id);
    }

    #[cfg(test)]
    fn cached_version(&self, subnet_id: SubnetId) -> Option<Version> {
        self.cache().get(&subnet_id).map(|cached| cached.version)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<SubnetId, CachedAllocator>> {
        match self.allocators.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn check_held(guard: &MultiKeyGuard<SubnetId>, subnet_id: SubnetId) -> Result<(), RegistryError> {
    if !guard.holds(&subnet_id) {
        return Err(RegistryError::Internal(format!(
            "subnet {subnet_id} is not locked"
        )));
    }
    Ok(())
}

fn allocation_error(subnet_id: SubnetId, error: AllocatorError) -> RegistryError {
    match error {
        AllocatorError::NotInUsableRange { address, .. }
        | AllocatorError::AlreadyAllocated(address) => RegistryError::AddressConflict {
            address,
            reason: error.to_string(),
        },
        AllocatorError::NotAllocated(address) => RegistryError::NotAssigned {
            subnet: subnet_id,
            address,
        },
        AllocatorError::Exhausted(_) => RegistryError::AddressExhausted(subnet_id),
    }
}

fn validate_metadata(metadata: SubnetMetadata) -> Result<SubnetMetadata, RegistryError> {
    let name = metadata.name.trim().to_string();
    if name.is_empty() {
        return Err(RegistryError::InvalidArgument(
            "subnet name must not be empty".into(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RegistryError::InvalidArgument(format!(
            "subnet name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if metadata.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(RegistryError::InvalidArgument(format!(
            "subnet description exceeds {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(SubnetMetadata {
        name,
        description: metadata.description,
    })
}

fn validate_device_label(label: &str) -> Result<String, RegistryError> {
    let label = label.trim();
    if label.is_empty() || label.chars().count() > MAX_DEVICE_LABEL_LEN {
        return Err(RegistryError::InvalidArgument(format!(
            "device label must have 1 to {MAX_DEVICE_LABEL_LEN} characters"
        )));
    }
    Ok(label.to_string())
}
