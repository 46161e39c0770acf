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
//! Request facade of the registry.

use std::{net::Ipv4Addr, sync::Arc};

use futures::{StreamExt, TryStreamExt, future};

use crate::{
    error::RegistryError,
    model::{
        AddressAssignment, Role, Subnet, SubnetFilter, SubnetId, SubnetMetadata,
        SubnetMetadataPatch, User, UserFilter, UserId, UserPatch,
    },
    pagination::{self, ListingStream},
    store::{Collection, SharedStore},
    subnets::SubnetRegistry,
    users::{InviteToken, UserAdmission},
};

/// Entry point for every registry operation.
///
/// Operations taking an `actor` are authorized against it. Mutations run in a
/// spawned task, so they complete even if the caller stops waiting.
#[derive(Clone)]
pub struct RegistryService {
    store: SharedStore,
    subnets: Arc<SubnetRegistry>,
    users: Arc<UserAdmission>,
}

impl RegistryService {
    /// Creates the registry on top of `store`.
    pub fn new(store: SharedStore) -> Self {
        let subnets = Arc::new(SubnetRegistry::new(store.clone()));
        let users = Arc::new(UserAdmission::new(store.clone(), subnets.clone()));
        Self {
            store,
            subnets,
            users,
        }
    }

    /// The subnet registry.
    pub fn subnets(&self) -> &Arc<SubnetRegistry> {
        &self.subnets
    }

    /// The user admission component.
    pub fn users(&self) -> &Arc<UserAdmission> {
        &self.users
    }

    /// Checks that the store is reachable.
    pub async fn health_check(&self) -> Result<(), RegistryError> {
        self.store.scan(Collection::Users, None, 1).await?;
        Ok(())
    }

    /// Resolves the subject of an authenticated request to its user.
    pub async fn authenticate(&self, subject: &str) -> Result<User, RegistryError> {
        self.users.authenticate(subject).await
    }

    /// Accepts an invite. The token itself is the credential.
    pub async fn accept_invite(&self, token: String) -> Result<User, RegistryError> {
        let users = self.users.clone();
        detached(async move { users.accept_invite(&token).await }).await
    }

    /// Invites a user.
    pub async fn create_invited_user(
        &self,
        actor: &User,
        email: String,
        role: Role,
    ) -> Result<(User, InviteToken), RegistryError> {
        require_admin(actor, "invite users")?;
        let users = self.users.clone();
        detached(async move { users.create_invited_user(&email, role).await }).await
    }

    /// Approves a user with an accepted invite.
    pub async fn approve_invited_user(
        &self,
        actor: &User,
        id: UserId,
    ) -> Result<User, RegistryError> {
        require_admin(actor, "approve users")?;
        let users = self.users.clone();
        detached(async move { users.approve_invited_user(id).await }).await
    }

    /// Lists users. Members only see themselves.
    pub fn get_users(
        &self,
        actor: &User,
        filter: UserFilter,
        after: Option<&str>,
    ) -> Result<ListingStream<User>, RegistryError> {
        let after = decode_after(after)?;
        let stream = self.users.list_users(filter, after);
        if actor.is_admin() {
            return Ok(stream);
        }
        let own = actor.id;
        Ok(stream
            .try_filter(move |listed| future::ready(listed.item.id == own))
            .boxed())
    }

    /// Updates a user profile.
    pub async fn update_user(
        &self,
        actor: &User,
        id: UserId,
        patch: UserPatch,
    ) -> Result<User, RegistryError> {
        let users = self.users.clone();
        let actor = actor.clone();
        detached(async move { users.update_user(id, patch, &actor).await }).await
    }

    /// Removes a user and releases its addresses.
    pub async fn delete_user(&self, actor: &User, id: UserId) -> Result<(), RegistryError> {
        require_admin(actor, "remove users")?;
        if actor.id == id {
            return Err(RegistryError::Forbidden(
                "administrators cannot remove themselves".into(),
            ));
        }
        let users = self.users.clone();
        detached(async move { users.delete_user(id).await }).await
    }

    /// Creates a subnet.
    pub async fn create_subnet(
        &self,
        actor: &User,
        cidr: String,
        metadata: SubnetMetadata,
    ) -> Result<Subnet, RegistryError> {
        require_admin(actor, "create subnets")?;
        let subnets = self.subnets.clone();
        detached(async move { subnets.create_subnet(&cidr, metadata).await }).await
    }

    /// Lists subnets.
    pub fn get_subnets(
        &self,
        _actor: &User,
        filter: SubnetFilter,
        after: Option<&str>,
    ) -> Result<ListingStream<Subnet>, RegistryError> {
        Ok(self.subnets.list_subnets(filter, decode_after(after)?))
    }

    /// Updates subnet metadata.
    pub async fn update_subnet_meta(
        &self,
        actor: &User,
        id: SubnetId,
        patch: SubnetMetadataPatch,
    ) -> Result<Subnet, RegistryError> {
        require_admin(actor, "update subnets")?;
        let subnets = self.subnets.clone();
        detached(async move { subnets.update_metadata(id, patch).await }).await
    }

    /// Assigns an address to a device of `owner`. Members may only assign
    /// addresses to themselves.
    pub async fn assign_subnet_address(
        &self,
        actor: &User,
        subnet_id: SubnetId,
        owner: UserId,
        device_label: String,
        requested: Option<Ipv4Addr>,
    ) -> Result<AddressAssignment, RegistryError> {
        if owner != actor.id {
            require_admin(actor, "assign addresses to other users")?;
        }
        let users = self.users.clone();
        detached(async move {
            users
                .assign_address(owner, subnet_id, &device_label, requested)
                .await
        })
        .await
    }

    /// Releases an assigned address. Members may only release their own.
    pub async fn remove_subnet_address(
        &self,
        actor: &User,
        subnet_id: SubnetId,
        address: Ipv4Addr,
    ) -> Result<AddressAssignment, RegistryError> {
        let expected_owner = (!actor.is_admin()).then_some(actor.id);
        let subnets = self.subnets.clone();
        detached(async move { subnets.release(subnet_id, address, expected_owner).await }).await
    }

    /// Deletes a subnet without assignments.
    pub async fn delete_subnet(&self, actor: &User, id: SubnetId) -> Result<(), RegistryError> {
        require_admin(actor, "delete subnets")?;
        let subnets = self.subnets.clone();
        detached(async move { subnets.delete_subnet(id).await }).await
    }

    /// Lists the assignments of a subnet. Members only see their own.
    pub fn get_subnet_addresses(
        &self,
        actor: &User,
        subnet_id: SubnetId,
        after: Option<&str>,
    ) -> Result<ListingStream<AddressAssignment>, RegistryError> {
        let stream = self
            .subnets
            .list_assignments(subnet_id, decode_after(after)?);
        if actor.is_admin() {
            return Ok(stream);
        }
        let own = actor.id;
        Ok(stream
            .try_filter(move |listed| future::ready(listed.item.owner == own))
            .boxed())
    }
}

fn require_admin(actor: &User, action: &str) -> Result<(), RegistryError> {
    if !actor.is_admin() {
        return Err(RegistryError::Forbidden(format!(
            "only administrators may {action}"
        )));
    }
    Ok(())
}

fn decode_after(after: Option<&str>) -> Result<Option<String>, RegistryError> {
    after
        .filter(|cursor| !cursor.is_empty())
        .map(pagination::decode_cursor)
        .transpose()
}

/// Runs a mutation to completion independently of the caller.
async fn detached<T, Fut>(mutation: Fut) -> Result<T, RegistryError>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, RegistryError>> + Send + 'static,
{
    tokio::spawn(mutation)
        .await
        .map_err(|e| RegistryError::Internal(format!("registry task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;
    use crate::store::memory::MemoryDocumentStore;

    struct Fixture {
        service: RegistryService,
        admin: User,
    }

    async fn fixture() -> Fixture {
        let service = RegistryService::new(Arc::new(MemoryDocumentStore::new()));
        let admin = service
            .users()
            .ensure_admin("admin@example.com")
            .await
            .unwrap();
        Fixture { service, admin }
    }

    impl Fixture {
        async fn member(&self, email: &str) -> User {
            let (user, token) = self
                .service
                .create_invited_user(&self.admin, email.into(), Role::Member)
                .await
                .unwrap();
            self.service
                .accept_invite(token.into_string())
                .await
                .unwrap();
            self.service
                .approve_invited_user(&self.admin, user.id)
                .await
                .unwrap()
        }

        async fn subnet(&self, cidr: &str) -> Subnet {
            self.service
                .create_subnet(&self.admin, cidr.into(), SubnetMetadata {
                    name: format!("net {cidr}"),
                    description: String::new(),
                })
                .await
                .unwrap()
        }
    }

    #[test_log::test(tokio::test)]
    async fn members_cannot_administer() {
        let f = fixture().await;
        let alice = f.member("alice@example.com").await;
        let subnet = f.subnet("10.0.0.0/24").await;

        assert!(matches!(
            f.service
                .create_subnet(&alice, "10.1.0.0/24".into(), SubnetMetadata::default())
                .await,
            Err(RegistryError::Forbidden(_))
        ));
        assert!(matches!(
            f.service
                .create_invited_user(&alice, "eve@example.com".into(), Role::Admin)
                .await,
            Err(RegistryError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.delete_subnet(&alice, subnet.id).await,
            Err(RegistryError::Forbidden(_))
        ));
        assert!(matches!(
            f.service
                .update_subnet_meta(&alice, subnet.id, SubnetMetadataPatch::default())
                .await,
            Err(RegistryError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.delete_user(&alice, f.admin.id).await,
            Err(RegistryError::Forbidden(_))
        ));
        assert!(matches!(
            f.service
                .assign_subnet_address(&alice, subnet.id, f.admin.id, "x".into(), None)
                .await,
            Err(RegistryError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.delete_user(&f.admin, f.admin.id).await,
            Err(RegistryError::Forbidden(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn members_manage_their_own_addresses() {
        let f = fixture().await;
        let alice = f.member("alice@example.com").await;
        let bob = f.member("bob@example.com").await;
        let subnet = f.subnet("10.0.0.0/24").await;

        let own = f
            .service
            .assign_subnet_address(&alice, subnet.id, alice.id, "laptop".into(), None)
            .await
            .unwrap();
        let bobs = f
            .service
            .assign_subnet_address(&f.admin, subnet.id, bob.id, "phone".into(), None)
            .await
            .unwrap();

        let visible = pagination::collect(
            f.service
                .get_subnet_addresses(&alice, subnet.id, None)
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(visible, vec![own.clone()]);
        let all = pagination::collect(
            f.service
                .get_subnet_addresses(&f.admin, subnet.id, None)
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(all.len(), 2);

        assert!(matches!(
            f.service
                .remove_subnet_address(&alice, subnet.id, bobs.address)
                .await,
            Err(RegistryError::Forbidden(_))
        ));
        f.service
            .remove_subnet_address(&alice, subnet.id, own.address)
            .await
            .unwrap();
        f.service
            .remove_subnet_address(&f.admin, subnet.id, bobs.address)
            .await
            .unwrap();
        f.service.delete_subnet(&f.admin, subnet.id).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn members_only_list_themselves() {
        let f = fixture().await;
        let alice = f.member("alice@example.com").await;
        f.member("bob@example.com").await;

        let seen = pagination::collect(
            f.service
                .get_users(&alice, UserFilter::default(), None)
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, alice.id);

        let everyone = pagination::collect(
            f.service
                .get_users(&f.admin, UserFilter::default(), None)
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(everyone.len(), 3);

        assert!(matches!(
            f.service
                .get_users(&f.admin, UserFilter::default(), Some("not hex")),
            Err(RegistryError::InvalidArgument(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn abandoned_request_still_completes() {
        let f = fixture().await;
        let request = f.service.create_subnet(&f.admin, "10.9.0.0/24".into(), SubnetMetadata {
            name: "abandoned".into(),
            description: String::new(),
        });
        // The caller drops the request after the mutation started.
        assert!(request.now_or_never().is_none());

        let mut subnets = Vec::new();
        for _ in 0..50 {
            subnets = pagination::collect(
                f.service
                    .get_subnets(&f.admin, SubnetFilter::default(), None)
                    .unwrap(),
            )
            .await
            .unwrap();
            if !subnets.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].metadata.name, "abandoned");
    }

    #[test_log::test(tokio::test)]
    async fn health_check_probes_the_store() {
        let f = fixture().await;
        f.service.health_check().await.unwrap();
    }
}
