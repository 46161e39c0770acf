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
//! Registry API client.

use std::{net::Ipv4Addr, ops::Deref, sync::Arc};

use futures::StreamExt;
use wgd_registry::crpc_api::{
    ACCEPT_INVITE, APPROVE_INVITED_USER, ASSIGN_SUBNET_ADDRESS, CREATE_INVITED_USER,
    CREATE_SUBNET, DELETE_SUBNET, DELETE_USER, GET_SUBNET_ADDRESSES, GET_SUBNETS, GET_USERS,
    HEALTH_CHECK, REMOVE_SUBNET_ADDRESS, SERVICE_PATH, UPDATE_SUBNET_META, UPDATE_USER,
};
use wgd_registry_core::{
    model::{
        AddressAssignment, Role, Subnet, SubnetFilter, SubnetId, SubnetMetadata,
        SubnetMetadataPatch, User, UserFilter, UserId, UserPatch,
    },
    pagination::Listed,
};
use wgd_registry_protobuf::wgd::registry::v1 as rpc;
use wgd_reqwest_connect_rpc::{
    client::{CrpcClient, CrpcClientError, CrpcStream},
    token_source::TokenSource,
};

/// Registry API client trait.
///
/// Listings are server streams. Every item carries a cursor; passing the
/// cursor of the last item received as `after` resumes an interrupted
/// listing.
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Returns the serving status of the registry.
    async fn health_check(&self) -> Result<String, CrpcClientError>;
    /// Redeems an invite token, moving the invited user to pending approval.
    async fn accept_invite(&self, invite_token: &str) -> Result<User, CrpcClientError>;
    /// Invites `email` with `role`. Returns the invited user and the invite
    /// token to hand to them.
    async fn create_invited_user(
        &self,
        email: &str,
        role: Role,
    ) -> Result<(User, String), CrpcClientError>;
    /// Approves a user pending approval.
    async fn approve_invited_user(&self, user_id: UserId) -> Result<User, CrpcClientError>;
    /// Lists users matching `filter`.
    async fn get_users(
        &self,
        filter: UserFilter,
        after: Option<String>,
    ) -> Result<CrpcStream<Listed<User>>, CrpcClientError>;
    /// Updates the profile of a user.
    async fn update_user(
        &self,
        user_id: UserId,
        patch: UserPatch,
    ) -> Result<User, CrpcClientError>;
    /// Removes a user together with their address assignments.
    async fn delete_user(&self, user_id: UserId) -> Result<(), CrpcClientError>;
    /// Creates a subnet for `cidr`.
    async fn create_subnet(
        &self,
        cidr: &str,
        metadata: SubnetMetadata,
    ) -> Result<Subnet, CrpcClientError>;
    /// Lists subnets matching `filter`.
    async fn get_subnets(
        &self,
        filter: SubnetFilter,
        after: Option<String>,
    ) -> Result<CrpcStream<Listed<Subnet>>, CrpcClientError>;
    /// Updates the name or description of a subnet.
    async fn update_subnet_meta(
        &self,
        subnet_id: SubnetId,
        patch: SubnetMetadataPatch,
    ) -> Result<Subnet, CrpcClientError>;
    /// Assigns an address of a subnet to a device of a user. Without
    /// `requested` the lowest free address is assigned.
    async fn assign_subnet_address(
        &self,
        subnet_id: SubnetId,
        user_id: UserId,
        device_label: &str,
        requested: Option<Ipv4Addr>,
    ) -> Result<AddressAssignment, CrpcClientError>;
    /// Releases an assigned address.
    async fn remove_subnet_address(
        &self,
        subnet_id: SubnetId,
        address: Ipv4Addr,
    ) -> Result<(), CrpcClientError>;
    /// Deletes a subnet without assignments.
    async fn delete_subnet(&self, subnet_id: SubnetId) -> Result<(), CrpcClientError>;
    /// Lists the address assignments of a subnet.
    async fn get_subnet_addresses(
        &self,
        subnet_id: SubnetId,
        after: Option<String>,
    ) -> Result<CrpcStream<Listed<AddressAssignment>>, CrpcClientError>;
}

/// Connect RPC registry client.
#[derive(Clone)]
pub struct CrpcRegistryClient {
    client: CrpcClient,
}

impl Deref for CrpcRegistryClient {
    type Target = CrpcClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl CrpcRegistryClient {
    /// Creates a new registry client from the given base URL.
    pub fn new(base_url: &url::Url) -> anyhow::Result<Self> {
        Ok(CrpcRegistryClient {
            client: CrpcClient::new(base_url)?,
        })
    }

    /// Creates a new registry client from the given base URL and [`reqwest::Client`].
    pub fn new_with_client(base_url: &url::Url, client: reqwest::Client) -> anyhow::Result<Self> {
        Ok(CrpcRegistryClient {
            client: CrpcClient::new_with_client(base_url, client)?,
        })
    }

    /// Uses the provided token source for authentication.
    pub fn use_token_source(&mut self, token_source: Arc<dyn TokenSource>) -> &mut Self {
        self.client.use_token_source(token_source);
        self
    }

    async fn unary<Req, Res>(&self, rpc: &str, req: Req) -> Result<Res, CrpcClientError>
    where
        Req: prost::Message + Default,
        Res: prost::Message + Default,
    {
        self.client
            .unary_request(&format!("{SERVICE_PATH}{rpc}"), req)
            .await
    }

    async fn listing<Req, Res, W, T>(
        &self,
        rpc: &str,
        req: Req,
        split: fn(Res) -> (Option<W>, String),
    ) -> Result<CrpcStream<Listed<T>>, CrpcClientError>
    where
        Req: prost::Message + Default,
        Res: prost::Message + Default + Send + 'static,
        W: 'static,
        T: TryFrom<W, Error = anyhow::Error> + Send + 'static,
    {
        let stream = self
            .client
            .server_streaming_request::<Req, Res>(&format!("{SERVICE_PATH}{rpc}"), req)
            .await?;
        Ok(stream
            .map(move |item| -> Result<Listed<T>, CrpcClientError> {
                let (wire, cursor) = split(item?);
                Ok(Listed {
                    item: decode(wire)?,
                    cursor,
                })
            })
            .boxed())
    }
}

/// Decodes a message field the registry always sets.
fn decode<W, T>(wire: Option<W>) -> Result<T, CrpcClientError>
where
    T: TryFrom<W, Error = anyhow::Error>,
{
    let wire = wire.ok_or_else(|| {
        CrpcClientError::DecodeError {
            context: "response field missing".into(),
            source: "missing field".into(),
            body: None,
        }
    })?;
    T::try_from(wire).map_err(|e| {
        CrpcClientError::DecodeError {
            context: "invalid response field".into(),
            source: e.into(),
            body: None,
        }
    })
}

#[async_trait::async_trait]
impl RegistryClient for CrpcRegistryClient {
    async fn health_check(&self) -> Result<String, CrpcClientError> {
        let res: rpc::HealthCheckResponse =
            self.unary(HEALTH_CHECK, rpc::HealthCheckRequest {}).await?;
        Ok(res.status)
    }

    async fn accept_invite(&self, invite_token: &str) -> Result<User, CrpcClientError> {
        let res: rpc::AcceptInviteResponse = self
            .unary(ACCEPT_INVITE, rpc::AcceptInviteRequest {
                invite_token: invite_token.to_string(),
            })
            .await?;
        decode(res.user)
    }

    async fn create_invited_user(
        &self,
        email: &str,
        role: Role,
    ) -> Result<(User, String), CrpcClientError> {
        let res: rpc::CreateInvitedUserResponse = self
            .unary(CREATE_INVITED_USER, rpc::CreateInvitedUserRequest {
                email: email.to_string(),
                role: rpc::Role::from(role).into(),
            })
            .await?;
        let user: User = decode(res.user)?;
        tracing::debug!(user=%user.id, "Invited user");
        Ok((user, res.invite_token))
    }

    async fn approve_invited_user(&self, user_id: UserId) -> Result<User, CrpcClientError> {
        let res: rpc::ApproveInvitedUserResponse = self
            .unary(APPROVE_INVITED_USER, rpc::ApproveInvitedUserRequest {
                user_id: user_id.to_string(),
            })
            .await?;
        decode(res.user)
    }

    async fn get_users(
        &self,
        filter: UserFilter,
        after: Option<String>,
    ) -> Result<CrpcStream<Listed<User>>, CrpcClientError> {
        let req = rpc::GetUsersRequest {
            state: filter.state.map(|state| rpc::UserState::from(state).into()),
            role: filter.role.map(|role| rpc::Role::from(role).into()),
            email_contains: filter.email_contains,
            after: after.unwrap_or_default(),
        };
        self.listing(GET_USERS, req, |res: rpc::GetUsersResponse| {
            (res.user, res.cursor)
        })
        .await
    }

    async fn update_user(
        &self,
        user_id: UserId,
        patch: UserPatch,
    ) -> Result<User, CrpcClientError> {
        let res: rpc::UpdateUserResponse = self
            .unary(UPDATE_USER, rpc::UpdateUserRequest {
                user_id: user_id.to_string(),
                display_name: patch.display_name,
            })
            .await?;
        decode(res.user)
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), CrpcClientError> {
        let _: rpc::DeleteUserResponse = self
            .unary(DELETE_USER, rpc::DeleteUserRequest {
                user_id: user_id.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn create_subnet(
        &self,
        cidr: &str,
        metadata: SubnetMetadata,
    ) -> Result<Subnet, CrpcClientError> {
        let res: rpc::CreateSubnetResponse = self
            .unary(CREATE_SUBNET, rpc::CreateSubnetRequest {
                cidr: cidr.to_string(),
                name: metadata.name,
                description: metadata.description,
            })
            .await?;
        decode(res.subnet)
    }

    async fn get_subnets(
        &self,
        filter: SubnetFilter,
        after: Option<String>,
    ) -> Result<CrpcStream<Listed<Subnet>>, CrpcClientError> {
        let req = rpc::GetSubnetsRequest {
            name_contains: filter.name_contains,
            contains_address: filter.contains_address.map(|address| address.to_string()),
            after: after.unwrap_or_default(),
        };
        self.listing(GET_SUBNETS, req, |res: rpc::GetSubnetsResponse| {
            (res.subnet, res.cursor)
        })
        .await
    }

    async fn update_subnet_meta(
        &self,
        subnet_id: SubnetId,
        patch: SubnetMetadataPatch,
    ) -> Result<Subnet, CrpcClientError> {
        let res: rpc::UpdateSubnetMetaResponse = self
            .unary(UPDATE_SUBNET_META, rpc::UpdateSubnetMetaRequest {
                subnet_id: subnet_id.to_string(),
                name: patch.name,
                description: patch.description,
            })
            .await?;
        decode(res.subnet)
    }

    async fn assign_subnet_address(
        &self,
        subnet_id: SubnetId,
        user_id: UserId,
        device_label: &str,
        requested: Option<Ipv4Addr>,
    ) -> Result<AddressAssignment, CrpcClientError> {
        let res: rpc::AssignSubnetAddressResponse = self
            .unary(ASSIGN_SUBNET_ADDRESS, rpc::AssignSubnetAddressRequest {
                subnet_id: subnet_id.to_string(),
                user_id: user_id.to_string(),
                device_label: device_label.to_string(),
                requested_address: requested.map(|address| address.to_string()),
            })
            .await?;
        decode(res.assignment)
    }

    async fn remove_subnet_address(
        &self,
        subnet_id: SubnetId,
        address: Ipv4Addr,
    ) -> Result<(), CrpcClientError> {
        let _: rpc::RemoveSubnetAddressResponse = self
            .unary(REMOVE_SUBNET_ADDRESS, rpc::RemoveSubnetAddressRequest {
                subnet_id: subnet_id.to_string(),
                address: address.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: SubnetId) -> Result<(), CrpcClientError> {
        let _: rpc::DeleteSubnetResponse = self
            .unary(DELETE_SUBNET, rpc::DeleteSubnetRequest {
                subnet_id: subnet_id.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn get_subnet_addresses(
        &self,
        subnet_id: SubnetId,
        after: Option<String>,
    ) -> Result<CrpcStream<Listed<AddressAssignment>>, CrpcClientError> {
        let req = rpc::GetSubnetAddressesRequest {
            subnet_id: subnet_id.to_string(),
            after: after.unwrap_or_default(),
        };
        self.listing(
            GET_SUBNET_ADDRESSES,
            req,
            |res: rpc::GetSubnetAddressesResponse| (res.assignment, res.cursor),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_malformed_fields_are_decode_errors() {
        let missing = decode::<rpc::Subnet, Subnet>(None).unwrap_err();
        assert!(matches!(missing, CrpcClientError::DecodeError { .. }));
        assert_eq!(missing.code(), None);

        let malformed = decode::<rpc::Subnet, Subnet>(Some(rpc::Subnet {
            id: "not a subnet id".into(),
            ..Default::default()
        }))
        .unwrap_err();
        assert!(matches!(malformed, CrpcClientError::DecodeError { .. }));
    }
}
