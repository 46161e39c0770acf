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
//! Registry data model.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wgd_address_manager::cidr::SubnetCidr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// Identifier of a [User].
    UserId
);
id_type!(
    /// Identifier of a [Subnet].
    SubnetId
);

/// Admission state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    /// Invited, the invite has not been accepted yet.
    Invited,
    /// The invite was accepted, waiting for an administrator.
    PendingApproval,
    /// Approved.
    Active,
    /// Removed. Terminal.
    Removed,
}

impl UserState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        self == UserState::Removed
    }

    /// Whether the admission state machine has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: UserState) -> bool {
        use UserState::*;
        matches!(
            (self, next),
            (Invited, PendingApproval)
                | (PendingApproval, Active)
                | (Invited | PendingApproval | Active, Removed)
        )
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserState::Invited => "invited",
            UserState::PendingApproval => "pending approval",
            UserState::Active => "active",
            UserState::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May administer users and subnets.
    Admin,
    /// Regular user.
    #[default]
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Member => f.write_str("member"),
        }
    }
}

/// A human user of the VPN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Id.
    pub id: UserId,
    /// Lower-cased email address, unique among users that are not removed.
    pub email: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Admission state.
    pub state: UserState,
    /// Role.
    pub role: Role,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Time of removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
    /// Hex SHA-256 digest of the pending invite token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_token_sha256: Option<String>,
}

impl User {
    /// Whether the user is an active administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin && self.state == UserState::Active
    }
}

/// Mutable profile fields of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    /// New display name. An empty string clears it.
    pub display_name: Option<String>,
}

/// Filter applied when listing users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Only users in this state.
    pub state: Option<UserState>,
    /// Only users with this role.
    pub role: Option<Role>,
    /// Only users whose email contains this string (case insensitive).
    pub email_contains: Option<String>,
}

impl UserFilter {
    /// Whether `user` passes the filter.
    pub fn matches(&self, user: &User) -> bool {
        self.state.is_none_or(|state| user.state == state)
            && self.role.is_none_or(|role| user.role == role)
            && self
                .email_contains
                .as_ref()
                .is_none_or(|needle| user.email.contains(&needle.to_lowercase()))
    }
}

/// Descriptive subnet fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetMetadata {
    /// Human readable name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// Partial update of [SubnetMetadata].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetMetadataPatch {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
}

impl SubnetMetadataPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// An administrator defined IPv4 subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Id.
    pub id: SubnetId,
    /// Address block. Immutable.
    pub cidr: SubnetCidr,
    /// Metadata.
    pub metadata: SubnetMetadata,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Filter applied when listing subnets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetFilter {
    /// Only subnets whose name contains this string (case insensitive).
    pub name_contains: Option<String>,
    /// Only the subnet containing this address.
    pub contains_address: Option<Ipv4Addr>,
}

impl SubnetFilter {
    /// Whether `subnet` passes the filter.
    pub fn matches(&self, subnet: &Subnet) -> bool {
        self.name_contains.as_ref().is_none_or(|needle| {
            subnet
                .metadata
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        }) && self
            .contains_address
            .is_none_or(|address| subnet.cidr.contains(address))
    }
}

/// A device address handed out of a subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAssignment {
    /// Subnet the address belongs to.
    pub subnet_id: SubnetId,
    /// Assigned host address.
    pub address: Ipv4Addr,
    /// Owning user.
    pub owner: UserId,
    /// Label of the device using the address.
    pub device_label: String,
    /// Time of assignment.
    pub assigned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_edges() {
        use UserState::*;
        assert!(Invited.can_transition_to(PendingApproval));
        assert!(PendingApproval.can_transition_to(Active));
        assert!(Active.can_transition_to(Removed));
        assert!(Invited.can_transition_to(Removed));

        assert!(!Invited.can_transition_to(Active));
        assert!(!Active.can_transition_to(PendingApproval));
        assert!(!Removed.can_transition_to(Removed));
        assert!(!Removed.can_transition_to(Active));
        assert!(Removed.is_terminal());
    }

    #[test]
    fn subnet_filter() {
        let subnet = Subnet {
            id: SubnetId::generate(),
            cidr: "10.1.0.0/24".parse().unwrap(),
            metadata: SubnetMetadata {
                name: "Office Zurich".into(),
                description: String::new(),
            },
            created_at: Utc::now(),
        };

        assert!(SubnetFilter::default().matches(&subnet));
        let by_name = SubnetFilter {
            name_contains: Some("zurich".into()),
            ..Default::default()
        };
        assert!(by_name.matches(&subnet));
        let by_address = SubnetFilter {
            contains_address: Some("10.1.0.77".parse().unwrap()),
            ..Default::default()
        };
        assert!(by_address.matches(&subnet));
        let elsewhere = SubnetFilter {
            contains_address: Some("10.2.0.1".parse().unwrap()),
            ..Default::default()
        };
        assert!(!elsewhere.matches(&subnet));
    }

    #[test]
    fn ids_roundtrip_through_strings() {
        let id = UserId::generate();
        assert_eq!(id.to_string().parse::<UserId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SubnetId>().is_err());
    }
}
