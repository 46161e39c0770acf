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
//! Canonical IPv4 subnet blocks.
//!
//! A [SubnetCidr] is an IPv4 network address plus prefix length with no host
//! bits set. Its usable host range excludes the network and the broadcast
//! address, so prefixes longer than /30 are rejected.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest prefix that still leaves usable host addresses.
pub const MAX_PREFIX_LEN: u8 = 30;

/// CIDR parsing and validation errors.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CidrError {
    /// Not of the form `a.b.c.d/len`.
    #[error("malformed IPv4 CIDR {0:?}")]
    Malformed(String),
    /// The address has bits set below the prefix length.
    #[error("{given} has host bits set, network address is {network}")]
    HostBitsSet {
        /// The CIDR as given.
        given: Ipv4Net,
        /// The canonical network address.
        network: Ipv4Addr,
    },
    /// The prefix leaves no address besides network and broadcast.
    #[error("prefix /{0} has no usable host addresses (maximum is /{MAX_PREFIX_LEN})")]
    NoUsableHosts(u8),
}

/// A validated, canonical IPv4 subnet block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubnetCidr(Ipv4Net);

impl SubnetCidr {
    /// Validates a parsed network.
    pub fn new(net: Ipv4Net) -> Result<Self, CidrError> {
        if net.addr() != net.network() {
            return Err(CidrError::HostBitsSet {
                given: net,
                network: net.network(),
            });
        }
        if net.prefix_len() > MAX_PREFIX_LEN {
            return Err(CidrError::NoUsableHosts(net.prefix_len()));
        }
        Ok(Self(net))
    }

    /// The underlying network.
    pub fn net(&self) -> Ipv4Net {
        self.0
    }

    /// Network address.
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Broadcast address.
    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    /// Prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Number of usable host addresses, `2^(32 - prefix) - 2`.
    pub fn host_count(&self) -> u32 {
        // Fits: for /0 this is u32::MAX - 1.
        ((1u64 << (32 - u32::from(self.prefix_len()))) - 2) as u32
    }

    /// Lowest usable host address.
    pub fn first_host(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.network().to_bits() + 1)
    }

    /// Highest usable host address.
    pub fn last_host(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.broadcast().to_bits() - 1)
    }

    /// Returns true if `addr` lies strictly between network and broadcast.
    pub fn contains_host(&self, addr: Ipv4Addr) -> bool {
        self.host_offset(addr).is_some()
    }

    /// Returns true if `addr` is inside the block, including network and
    /// broadcast.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.0.contains(&addr)
    }

    /// Zero based offset of a usable host address.
    pub fn host_offset(&self, addr: Ipv4Addr) -> Option<u32> {
        let bits = addr.to_bits();
        let first = self.first_host().to_bits();
        (first..=self.last_host().to_bits())
            .contains(&bits)
            .then(|| bits - first)
    }

    /// Usable host address at `offset`.
    pub fn host_at(&self, offset: u32) -> Option<Ipv4Addr> {
        (offset < self.host_count())
            .then(|| Ipv4Addr::from_bits(self.first_host().to_bits() + offset))
    }

    /// Returns true if the two blocks share at least one address.
    pub fn overlaps(&self, other: &SubnetCidr) -> bool {
        // Aligned blocks either nest or are disjoint.
        self.0.contains(&other.0) || other.0.contains(&self.0)
    }
}

impl FromStr for SubnetCidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Ipv4Net accepts a bare address as /32; a block must name its length.
        if !trimmed.contains('/') {
            return Err(CidrError::Malformed(s.to_string()));
        }
        let net: Ipv4Net = trimmed
            .parse()
            .map_err(|_| CidrError::Malformed(s.to_string()))?;
        Self::new(net)
    }
}

impl TryFrom<String> for SubnetCidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubnetCidr> for String {
    fn from(value: SubnetCidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SubnetCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
