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
//! Conversions between registry protobuf types and registry models.

use anyhow::Context;
use chrono::{DateTime, Utc};
use wgd_registry_core::model;

use crate::wgd::registry::v1::{AddressAssignment, Role, Subnet, User, UserState};

/// Milliseconds since the Unix epoch.
pub fn to_unix_ms(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Inverse of [to_unix_ms].
pub fn from_unix_ms(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("timestamp {ms} out of range"))
}

impl From<model::UserState> for UserState {
    fn from(state: model::UserState) -> Self {
        match state {
            model::UserState::Invited => UserState::Invited,
            model::UserState::PendingApproval => UserState::PendingApproval,
            model::UserState::Active => UserState::Active,
            model::UserState::Removed => UserState::Removed,
        }
    }
}

impl TryFrom<UserState> for model::UserState {
    type Error = anyhow::Error;

    fn try_from(state: UserState) -> Result<Self, Self::Error> {
        Ok(match state {
            UserState::Invited => model::UserState::Invited,
            UserState::PendingApproval => model::UserState::PendingApproval,
            UserState::Active => model::UserState::Active,
            UserState::Removed => model::UserState::Removed,
            UserState::Unspecified => anyhow::bail!("user state is unspecified"),
        })
    }
}

impl From<model::Role> for Role {
    fn from(role: model::Role) -> Self {
        match role {
            model::Role::Admin => Role::Admin,
            model::Role::Member => Role::Member,
        }
    }
}

impl TryFrom<Role> for model::Role {
    type Error = anyhow::Error;

    fn try_from(role: Role) -> Result<Self, Self::Error> {
        match role {
            Role::Admin => Ok(model::Role::Admin),
            Role::Member => Ok(model::Role::Member),
            Role::Unspecified => anyhow::bail!("role is unspecified"),
        }
    }
}

/// Decodes an enumeration field that must be set.
fn user_state(value: i32) -> anyhow::Result<model::UserState> {
    UserState::try_from(value)
        .with_context(|| format!("unknown user state {value}"))?
        .try_into()
}

fn role(value: i32) -> anyhow::Result<model::Role> {
    Role::try_from(value)
        .with_context(|| format!("unknown role {value}"))?
        .try_into()
}

impl From<model::User> for User {
    fn from(user: model::User) -> Self {
        User {
            id: user.id.to_string(),
            email: user.email,
            display_name: user.display_name,
            state: UserState::from(user.state).into(),
            role: Role::from(user.role).into(),
            created_at_unix_ms: to_unix_ms(user.created_at),
            approved_at_unix_ms: user.approved_at.map(to_unix_ms),
            removed_at_unix_ms: user.removed_at.map(to_unix_ms),
        }
    }
}

impl TryFrom<User> for model::User {
    type Error = anyhow::Error;

    fn try_from(user: User) -> Result<Self, Self::Error> {
        Ok(model::User {
            id: user.id.parse().context("invalid user id")?,
            email: user.email,
            display_name: user.display_name,
            state: user_state(user.state)?,
            role: role(user.role)?,
            created_at: from_unix_ms(user.created_at_unix_ms)?,
            approved_at: user.approved_at_unix_ms.map(from_unix_ms).transpose()?,
            removed_at: user.removed_at_unix_ms.map(from_unix_ms).transpose()?,
            invite_token_sha256: None,
        })
    }
}

impl From<model::Subnet> for Subnet {
    fn from(subnet: model::Subnet) -> Self {
        Subnet {
            id: subnet.id.to_string(),
            cidr: subnet.cidr.to_string(),
            name: subnet.metadata.name,
            description: subnet.metadata.description,
            created_at_unix_ms: to_unix_ms(subnet.created_at),
        }
    }
}

impl TryFrom<Subnet> for model::Subnet {
    type Error = anyhow::Error;

    fn try_from(subnet: Subnet) -> Result<Self, Self::Error> {
        Ok(model::Subnet {
            id: subnet.id.parse().context("invalid subnet id")?,
            cidr: subnet.cidr.parse().context("invalid subnet CIDR")?,
            metadata: model::SubnetMetadata {
                name: subnet.name,
                description: subnet.description,
            },
            created_at: from_unix_ms(subnet.created_at_unix_ms)?,
        })
    }
}

impl From<model::AddressAssignment> for AddressAssignment {
    fn from(assignment: model::AddressAssignment) -> Self {
        AddressAssignment {
            subnet_id: assignment.subnet_id.to_string(),
            address: assignment.address.to_string(),
            owner_user_id: assignment.owner.to_string(),
            device_label: assignment.device_label,
            assigned_at_unix_ms: to_unix_ms(assignment.assigned_at),
        }
    }
}

impl TryFrom<AddressAssignment> for model::AddressAssignment {
    type Error = anyhow::Error;

    fn try_from(assignment: AddressAssignment) -> Result<Self, Self::Error> {
        Ok(model::AddressAssignment {
            subnet_id: assignment.subnet_id.parse().context("invalid subnet id")?,
            address: assignment.address.parse().context("invalid address")?,
            owner: assignment.owner_user_id.parse().context("invalid owner id")?,
            device_label: assignment.device_label,
            assigned_at: from_unix_ms(assignment.assigned_at_unix_ms)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_survives_the_wire() {
        let now = from_unix_ms(to_unix_ms(Utc::now())).unwrap();
        let user = model::User {
            id: model::UserId::generate(),
            email: "alice@example.com".into(),
            display_name: Some("Alice".into()),
            state: model::UserState::Active,
            role: model::Role::Admin,
            created_at: now,
            approved_at: Some(now),
            removed_at: None,
            invite_token_sha256: Some("secret digest".into()),
        };

        let wire = User::from(user.clone());
        assert_eq!(wire.state, UserState::Active as i32);
        let back = model::User::try_from(wire).unwrap();
        assert_eq!(back, model::User {
            invite_token_sha256: None,
            ..user
        });
    }

    #[test]
    fn unspecified_enums_are_rejected() {
        let wire = User {
            id: model::UserId::generate().to_string(),
            email: "bob@example.com".into(),
            state: UserState::Unspecified.into(),
            role: Role::Member.into(),
            ..Default::default()
        };
        assert!(model::User::try_from(wire).is_err());
        assert!(role(42).is_err());
    }

    #[test]
    fn malformed_subnet_is_rejected() {
        let wire = Subnet {
            id: model::SubnetId::generate().to_string(),
            cidr: "10.0.0.1/24".into(),
            ..Default::default()
        };
        assert!(model::Subnet::try_from(wire).is_err());
    }
}
