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
//! User admission.
//!
//! Users move through `Invited -> PendingApproval -> Active` and can be
//! removed from any state but `Removed`. Removing a user first releases all
//! addresses assigned to the user.

use std::{collections::BTreeSet, fmt, net::Ipv4Addr, sync::Arc};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::{
    error::RegistryError,
    locks::{KeyedLocks, MultiKeyGuard},
    model::{AddressAssignment, Role, SubnetId, User, UserFilter, UserId, UserPatch, UserState},
    pagination::{self, ListingStream},
    store::{Collection, SharedStore, TypedCollection},
    subnets::SubnetRegistry,
};

/// Number of random bytes in an invite token.
pub const INVITE_TOKEN_BYTES: usize = 32;
/// Longest accepted display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 128;
/// Longest accepted email address.
pub const MAX_EMAIL_LEN: usize = 254;

/// Single-use secret the invitee presents to accept an invite.
#[derive(Clone, PartialEq, Eq)]
pub struct InviteToken(String);

impl InviteToken {
    fn generate() -> Self {
        Self(hex::encode(rand::random::<[u8; INVITE_TOKEN_BYTES]>()))
    }

    /// The token as handed to the invitee.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InviteToken(***)")
    }
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Validates and lower-cases an email address.
pub fn normalize_email(email: &str) -> Result<String, RegistryError> {
    let email = email.trim().to_lowercase();
    let invalid = || RegistryError::InvalidEmail(email.clone());
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(email)
}

/// User admission state machine.
pub struct UserAdmission {
    users: TypedCollection<User>,
    subnets: Arc<SubnetRegistry>,
    user_locks: KeyedLocks<UserId>,
    email_locks: KeyedLocks<String>,
}

impl UserAdmission {
    /// Creates the admission component. Address assignments of removed users
    /// are released through `subnets`.
    pub fn new(store: SharedStore, subnets: Arc<SubnetRegistry>) -> Self {
        Self {
            users: TypedCollection::new(store, Collection::Users),
            subnets,
            user_locks: KeyedLocks::new(),
            email_locks: KeyedLocks::new(),
        }
    }

    /// Invites a new user.
    ///
    /// Returns the user together with the plain invite token. Only a digest of
    /// the token is stored.
    pub async fn create_invited_user(
        &self,
        email: &str,
        role: Role,
    ) -> Result<(User, InviteToken), RegistryError> {
        let email = normalize_email(email)?;
        let _email_guard = self.email_locks.lock(email.clone()).await;
        if self.find_by_email(&email).await?.is_some() {
            return Err(RegistryError::DuplicateEmail(email));
        }

        let token = InviteToken::generate();
        let user = User {
            id: UserId::generate(),
            email,
            display_name: None,
            state: UserState::Invited,
            role,
            created_at: Utc::now(),
            approved_at: None,
            removed_at: None,
            invite_token_sha256: Some(token_digest(token.as_str())),
        };
        self.users.create(&user.id.to_string(), &user).await?;

        tracing::info!(user=%user.id, email=%user.email, %role, "Invited user");
        Ok((user, token))
    }

    /// Accepts an invite, moving the user to `PendingApproval`.
    pub async fn accept_invite(&self, token: &str) -> Result<User, RegistryError> {
        let digest = token_digest(token.trim());
        let candidate = self
            .users
            .scan_all()
            .await?
            .into_iter()
            .map(|(_, doc)| doc.value)
            .find(|user| user.invite_token_sha256.as_deref() == Some(digest.as_str()))
            .ok_or(RegistryError::InvalidToken)?;

        let id = candidate.id;
        let _guard = self.user_locks.lock(id).await;
        let user = self
            .modify_user(id, |user| {
                if user.invite_token_sha256.as_deref() != Some(digest.as_str()) {
                    return Err(RegistryError::InvalidToken);
                }
                require_state(user, UserState::PendingApproval, "invited")?;
                user.state = UserState::PendingApproval;
                user.invite_token_sha256 = None;
                Ok(())
            })
            .await?;

        tracing::info!(user=%id, email=%user.email, "Accepted invite");
        Ok(user)
    }

    /// Approves a user that accepted its invite.
    pub async fn approve_invited_user(&self, id: UserId) -> Result<User, RegistryError> {
        let _guard = self.user_locks.lock(id).await;
        let user = self
            .modify_user(id, |user| {
                require_state(user, UserState::Active, "pending approval")?;
                user.state = UserState::Active;
                user.approved_at = Some(Utc::now());
                Ok(())
            })
            .await?;

        tracing::info!(user=%id, email=%user.email, "Approved user");
        Ok(user)
    }

    /// Updates the profile of a user. Users may update themselves,
    /// administrators may update anyone.
    pub async fn update_user(
        &self,
        id: UserId,
        patch: UserPatch,
        actor: &User,
    ) -> Result<User, RegistryError> {
        if actor.id != id && !actor.is_admin() {
            return Err(RegistryError::Forbidden(
                "only administrators may update other users".into(),
            ));
        }
        let display_name = patch
            .display_name
            .map(|name| validate_display_name(&name))
            .transpose()?;

        let _guard = self.user_locks.lock(id).await;
        let user = self
            .modify_user(id, |user| {
                if user.state.is_terminal() {
                    return Err(invalid_state(user, "not removed"));
                }
                if let Some(display_name) = &display_name {
                    user.display_name = display_name.clone();
                }
                Ok(())
            })
            .await?;

        tracing::info!(user=%id, actor=%actor.id, "Updated user");
        Ok(user)
    }

    /// Removes a user after releasing all of its address assignments.
    ///
    /// Either every assignment is released and the user is removed, or any
    /// assignment released so far is restored and the user is left as it was.
    pub async fn delete_user(&self, id: UserId) -> Result<(), RegistryError> {
        let _guard = self.user_locks.lock(id).await;
        let key = id.to_string();
        let current = self
            .users
            .read(&key)
            .await?
            .ok_or(RegistryError::UserNotFound(id))?;
        if current.value.state.is_terminal() {
            return Err(invalid_state(&current.value, "not removed"));
        }

        let owned: BTreeSet<SubnetId> = self
            .subnets
            .assignments_of(id)
            .await?
            .into_iter()
            .map(|a| a.subnet_id)
            .collect();
        let subnet_guard = self.subnets.lock_subnets(owned.iter().copied()).await;

        let mut released: Vec<(SubnetId, Vec<AddressAssignment>)> = Vec::new();
        for subnet_id in owned {
            match self
                .subnets
                .release_owner_locked(&subnet_guard, subnet_id, id)
                .await
            {
                Ok(assignments) => released.push((subnet_id, assignments)),
                Err(e) => {
                    tracing::warn!(user=%id, subnet=%subnet_id, error=%e, "Releasing addresses failed, restoring");
                    self.restore(&subnet_guard, id, released).await;
                    return Err(as_internal(e));
                }
            }
        }

        let mut removed = current.value;
        removed.state = UserState::Removed;
        removed.removed_at = Some(Utc::now());
        removed.invite_token_sha256 = None;
        if let Err(e) = self.users.update(&key, current.version, &removed).await {
            tracing::warn!(user=%id, error=%e, "Removing user failed, restoring addresses");
            self.restore(&subnet_guard, id, released).await;
            return Err(e.into());
        }

        let freed: usize = released.iter().map(|(_, a)| a.len()).sum();
        tracing::info!(user=%id, email=%removed.email, freed, "Removed user");
        Ok(())
    }

    /// Assigns an address of a subnet to a device of `owner`.
    pub async fn assign_address(
        &self,
        owner: UserId,
        subnet_id: SubnetId,
        device_label: &str,
        requested: Option<Ipv4Addr>,
    ) -> Result<AddressAssignment, RegistryError> {
        // Holding the owner lock keeps the owner from being removed meanwhile.
        let _guard = self.user_locks.lock(owner).await;
        let user = self.get_user(owner).await?;
        if user.state.is_terminal() {
            return Err(invalid_state(&user, "not removed"));
        }
        self.subnets
            .assign(subnet_id, owner, device_label, requested)
            .await
    }

    /// Returns a user.
    pub async fn get_user(&self, id: UserId) -> Result<User, RegistryError> {
        self.users
            .read(&id.to_string())
            .await?
            .map(|doc| doc.value)
            .ok_or(RegistryError::UserNotFound(id))
    }

    /// Returns the user with `email` that is not removed, if any.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, RegistryError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .users
            .scan_all()
            .await?
            .into_iter()
            .map(|(_, doc)| doc.value)
            .find(|user| user.email == email && !user.state.is_terminal()))
    }

    /// Resolves an authenticated subject (an email address) to an active
    /// user.
    pub async fn authenticate(&self, subject: &str) -> Result<User, RegistryError> {
        let user = self
            .find_by_email(subject)
            .await?
            .ok_or_else(|| RegistryError::Forbidden(format!("unknown user {subject}")))?;
        if user.state != UserState::Active {
            return Err(RegistryError::Forbidden(format!(
                "user {} is {}",
                user.email, user.state
            )));
        }
        Ok(user)
    }

    /// Makes sure `email` belongs to an active administrator, creating or
    /// promoting the user as needed.
    pub async fn ensure_admin(&self, email: &str) -> Result<User, RegistryError> {
        let email = normalize_email(email)?;
        let _email_guard = self.email_locks.lock(email.clone()).await;

        let Some(existing) = self.find_by_email(&email).await? else {
            let now = Utc::now();
            let user = User {
                id: UserId::generate(),
                email,
                display_name: None,
                state: UserState::Active,
                role: Role::Admin,
                created_at: now,
                approved_at: Some(now),
                removed_at: None,
                invite_token_sha256: None,
            };
            self.users.create(&user.id.to_string(), &user).await?;
            tracing::info!(user=%user.id, email=%user.email, "Created bootstrap administrator");
            return Ok(user);
        };
        if existing.is_admin() {
            return Ok(existing);
        }

        let _guard = self.user_locks.lock(existing.id).await;
        let user = self
            .modify_user(existing.id, |user| {
                if user.state.is_terminal() {
                    return Err(invalid_state(user, "not removed"));
                }
                user.role = Role::Admin;
                if user.state != UserState::Active {
                    user.state = UserState::Active;
                    user.approved_at = Some(Utc::now());
                    user.invite_token_sha256 = None;
                }
                Ok(())
            })
            .await?;
        tracing::info!(user=%user.id, email=%user.email, "Promoted user to administrator");
        Ok(user)
    }

    /// Lists users passing `filter`, resuming after the item with cursor key
    /// `after`.
    pub fn list_users(&self, filter: UserFilter, after: Option<String>) -> ListingStream<User> {
        let users = self.users.clone();
        pagination::paginate(
            after,
            pagination::DEFAULT_PAGE_SIZE,
            move |after, limit| {
                let users = users.clone();
                async move {
                    let page = users.scan(after.as_deref(), limit).await?;
                    Ok::<_, RegistryError>(
                        page.into_iter()
                            .map(|(key, doc)| (key, doc.value))
                            .collect::<Vec<_>>(),
                    )
                }
            },
            move |user| filter.matches(user),
        )
    }

    async fn modify_user<F>(&self, id: UserId, mut f: F) -> Result<User, RegistryError>
    where
        F: FnMut(&mut User) -> Result<(), RegistryError>,
    {
        self.users
            .modify(&id.to_string(), |_, user| f(user))
            .await?
            .map(|modified| modified.value)
            .ok_or(RegistryError::UserNotFound(id))
    }

    async fn restore(
        &self,
        guard: &MultiKeyGuard<SubnetId>,
        user: UserId,
        released: Vec<(SubnetId, Vec<AddressAssignment>)>,
    ) {
        for (subnet_id, assignments) in released.into_iter().rev() {
            if let Err(e) = self
                .subnets
                .restore_locked(guard, subnet_id, &assignments)
                .await
            {
                tracing::error!(
                    %user,
                    subnet=%subnet_id,
                    error=%e,
                    lost = assignments.len(),
                    "Failed to restore address assignments"
                );
            }
        }
    }
}

fn invalid_state(user: &User, expected: &'static str) -> RegistryError {
    RegistryError::InvalidState {
        user: user.id,
        actual: user.state,
        expected,
    }
}

/// Fails unless the user may transition to `next`.
fn require_state(user: &User, next: UserState, expected: &'static str) -> Result<(), RegistryError> {
    if !user.state.can_transition_to(next) {
        return Err(invalid_state(user, expected));
    }
    Ok(())
}

fn validate_display_name(name: &str) -> Result<Option<String>, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(RegistryError::InvalidArgument(format!(
            "display name exceeds {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(Some(name.to_string()))
}

fn as_internal(error: RegistryError) -> RegistryError {
    match error {
        RegistryError::Internal(_) => error,
        other => RegistryError::Internal(other.to_string()),
    }
}
