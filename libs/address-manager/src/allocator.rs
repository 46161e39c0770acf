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
//! An IPv4 host address allocator for a single subnet.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::{allocator::pool::Pool, cidr::SubnetCidr};

pub mod pool;

pub use pool::PoolKind;

/// Pools with at most this many hosts (a /16) are tracked with a bitmap,
/// larger ones with a free-interval list.
pub const BITMAP_MAX_HOSTS: u32 = (1 << 16) - 2;

/// Address allocation errors.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AllocatorError {
    /// The requested address is not a usable host address of the subnet.
    #[error("address {address} is not a usable host address of {cidr}")]
    NotInUsableRange {
        /// Requested address.
        address: Ipv4Addr,
        /// Subnet block.
        cidr: SubnetCidr,
    },
    /// The requested address is already allocated.
    #[error("address {0} already allocated")]
    AlreadyAllocated(Ipv4Addr),
    /// The address to free is not allocated.
    #[error("address {0} is not allocated")]
    NotAllocated(Ipv4Addr),
    /// Every usable host address is allocated.
    #[error("no free address left in {0}")]
    Exhausted(SubnetCidr),
}

/// Allocation state of one subnet's usable host range.
///
/// Dynamic allocations always return the lowest free host address, so an
/// address that was just freed is the next one handed out unless a lower one
/// is free too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAllocator {
    cidr: SubnetCidr,
    pool: Pool,
}

impl AddressAllocator {
    /// Creates an allocator with every usable host address free. The pool
    /// representation is picked from the subnet size.
    pub fn new(cidr: SubnetCidr) -> Self {
        let kind = if cidr.host_count() <= BITMAP_MAX_HOSTS {
            PoolKind::Bitmap
        } else {
            PoolKind::Ranges
        };
        Self::with_kind(cidr, kind)
    }

    /// Creates an allocator with an explicit pool representation.
    pub fn with_kind(cidr: SubnetCidr, kind: PoolKind) -> Self {
        Self {
            cidr,
            pool: Pool::new(kind, cidr.host_count()),
        }
    }

    /// Rebuilds an allocator from the set of currently allocated addresses.
    pub fn from_allocated<I>(cidr: SubnetCidr, allocated: I) -> Result<Self, AllocatorError>
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let mut allocator = Self::new(cidr);
        for address in allocated {
            allocator.allocate(Some(address))?;
        }
        Ok(allocator)
    }

    /// The subnet block this allocator serves.
    pub fn cidr(&self) -> SubnetCidr {
        self.cidr
    }

    /// The pool representation in use.
    pub fn kind(&self) -> PoolKind {
        self.pool.kind()
    }

    /// Allocates `requested` if given, otherwise the lowest free host address.
    pub fn allocate(&mut self, requested: Option<Ipv4Addr>) -> Result<Ipv4Addr, AllocatorError> {
        match requested {
            Some(address) => {
                let offset = self.offset(address)?;
                if !self.pool.take(offset) {
                    return Err(AllocatorError::AlreadyAllocated(address));
                }
                Ok(address)
            }
            None => {
                let offset = self
                    .pool
                    .take_lowest()
                    .ok_or(AllocatorError::Exhausted(self.cidr))?;
                self.cidr
                    .host_at(offset)
                    .ok_or(AllocatorError::Exhausted(self.cidr))
            }
        }
    }

    /// Returns an allocated address to the pool.
    pub fn free(&mut self, address: Ipv4Addr) -> Result<(), AllocatorError> {
        let offset = self
            .cidr
            .host_offset(address)
            .ok_or(AllocatorError::NotAllocated(address))?;
        if !self.pool.release(offset) {
            return Err(AllocatorError::NotAllocated(address));
        }
        Ok(())
    }

    /// Returns true if `address` is a usable host address that is not
    /// allocated.
    pub fn is_free(&self, address: Ipv4Addr) -> bool {
        self.cidr
            .host_offset(address)
            .is_some_and(|offset| self.pool.is_free(offset))
    }

    /// Number of usable host addresses.
    pub fn capacity(&self) -> u32 {
        self.cidr.host_count()
    }

    /// Number of free host addresses.
    pub fn free_count(&self) -> u32 {
        self.pool.free_count()
    }

    /// Number of allocated host addresses.
    pub fn allocated_count(&self) -> u32 {
        self.capacity() - self.free_count()
    }

    fn offset(&self, address: Ipv4Addr) -> Result<u32, AllocatorError> {
        self.cidr
            .host_offset(address)
            .ok_or(AllocatorError::NotInUsableRange {
                address,
                cidr: self.cidr,
            })
    }
}
