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
//! Registry errors.

use std::net::Ipv4Addr;

use thiserror::Error;
use wgd_address_manager::cidr::{CidrError, SubnetCidr};

use crate::{
    model::{SubnetId, UserId, UserState},
    store::StoreError,
};

/// Coarse classification of [RegistryError]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input.
    Validation,
    /// The addressed entity does not exist.
    NotFound,
    /// The request collides with existing state.
    Conflict,
    /// The entity is not in a state allowing the operation.
    InvalidState,
    /// No free address is left.
    Exhausted,
    /// The caller may not perform the operation.
    Forbidden,
    /// Transient failure. The request may be retried.
    Internal,
}

/// Errors of registry operations.
///
/// Every error except [RegistryError::Internal] leaves the registry unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The CIDR is malformed or has no usable hosts.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(#[from] CidrError),
    /// The email address is malformed.
    #[error("invalid email address {0:?}")]
    InvalidEmail(String),
    /// Any other malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The user does not exist.
    #[error("user {0} not found")]
    UserNotFound(UserId),
    /// The subnet does not exist.
    #[error("subnet {0} not found")]
    SubnetNotFound(SubnetId),
    /// The address has no assignment.
    #[error("address {address} is not assigned in subnet {subnet}")]
    NotAssigned {
        /// Subnet.
        subnet: SubnetId,
        /// Address.
        address: Ipv4Addr,
    },
    /// A user that is not removed already uses the email address.
    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),
    /// The CIDR overlaps an existing subnet.
    #[error("{cidr} overlaps subnet {existing} ({existing_cidr})")]
    SubnetOverlap {
        /// Requested block.
        cidr: SubnetCidr,
        /// Overlapped subnet.
        existing: SubnetId,
        /// Block of the overlapped subnet.
        existing_cidr: SubnetCidr,
    },
    /// The requested address cannot be assigned.
    #[error("address {address} cannot be assigned: {reason}")]
    AddressConflict {
        /// Requested address.
        address: Ipv4Addr,
        /// Why.
        reason: String,
    },
    /// The user is not in a state allowing the operation.
    #[error("user {user} is {actual}, expected {expected}")]
    InvalidState {
        /// User.
        user: UserId,
        /// Current state.
        actual: UserState,
        /// Required state(s).
        expected: &'static str,
    },
    /// The subnet still has address assignments.
    #[error("subnet {subnet} still has {assignments} address assignment(s)")]
    SubnetNotEmpty {
        /// Subnet.
        subnet: SubnetId,
        /// Remaining assignments.
        assignments: usize,
    },
    /// The caller may not perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The invite token is unknown or was already used.
    #[error("invite token is invalid or already used")]
    InvalidToken,
    /// The subnet has no free address.
    #[error("no free address left in subnet {0}")]
    AddressExhausted(SubnetId),
    /// Transient failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Classification of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidCidr(_)
            | RegistryError::InvalidEmail(_)
            | RegistryError::InvalidArgument(_) => ErrorKind::Validation,
            RegistryError::UserNotFound(_)
            | RegistryError::SubnetNotFound(_)
            | RegistryError::NotAssigned { .. } => ErrorKind::NotFound,
            RegistryError::DuplicateEmail(_)
            | RegistryError::SubnetOverlap { .. }
            | RegistryError::AddressConflict { .. } => ErrorKind::Conflict,
            RegistryError::InvalidState { .. } | RegistryError::SubnetNotEmpty { .. } => {
                ErrorKind::InvalidState
            }
            RegistryError::Forbidden(_) | RegistryError::InvalidToken => ErrorKind::Forbidden,
            RegistryError::AddressExhausted(_) => ErrorKind::Exhausted,
            RegistryError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the request may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

impl From<StoreError> for RegistryError {
    fn from(value: StoreError) -> Self {
        RegistryError::Internal(value.to_string())
    }
}
