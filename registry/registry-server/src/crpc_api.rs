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
//! Connect RPC endpoint definitions and endpoint handlers.

use std::{fmt::Display, net::Ipv4Addr, str::FromStr};

use axum::{Extension, Router, extract::State, routing::post};
use futures::StreamExt;
use wgd_axum_connect_rpc::{
    error::{CrpcError, CrpcErrorCode},
    extractor::ConnectRpc,
    streaming::{ConnectStream, ConnectStreamRequest},
};
use wgd_registry_core::{
    error::{ErrorKind, RegistryError},
    model::{
        Role, SubnetFilter, SubnetId, SubnetMetadata, SubnetMetadataPatch, UserFilter, UserId,
        UserPatch, UserState,
    },
    pagination::{Listed, ListingStream},
    service::RegistryService,
};
use wgd_registry_protobuf::wgd::registry::v1 as rpc;

use crate::server::auth::Actor;

/// Path prefix of every registry RPC.
pub const SERVICE_PATH: &str = "/wgd.registry.v1.RegistryService";
/// Path of the `HealthCheck` RPC below [SERVICE_PATH].
pub const HEALTH_CHECK: &str = "/HealthCheck";
/// Path of the `AcceptInvite` RPC below [SERVICE_PATH].
pub const ACCEPT_INVITE: &str = "/AcceptInvite";
/// Path of the `CreateInvitedUser` RPC below [SERVICE_PATH].
pub const CREATE_INVITED_USER: &str = "/CreateInvitedUser";
/// Path of the `ApproveInvitedUser` RPC below [SERVICE_PATH].
pub const APPROVE_INVITED_USER: &str = "/ApproveInvitedUser";
/// Path of the `GetUsers` RPC below [SERVICE_PATH].
pub const GET_USERS: &str = "/GetUsers";
/// Path of the `UpdateUser` RPC below [SERVICE_PATH].
pub const UPDATE_USER: &str = "/UpdateUser";
/// Path of the `DeleteUser` RPC below [SERVICE_PATH].
pub const DELETE_USER: &str = "/DeleteUser";
/// Path of the `CreateSubnet` RPC below [SERVICE_PATH].
pub const CREATE_SUBNET: &str = "/CreateSubnet";
/// Path of the `GetSubnets` RPC below [SERVICE_PATH].
pub const GET_SUBNETS: &str = "/GetSubnets";
/// Path of the `UpdateSubnetMeta` RPC below [SERVICE_PATH].
pub const UPDATE_SUBNET_META: &str = "/UpdateSubnetMeta";
/// Path of the `AssignSubnetAddress` RPC below [SERVICE_PATH].
pub const ASSIGN_SUBNET_ADDRESS: &str = "/AssignSubnetAddress";
/// Path of the `RemoveSubnetAddress` RPC below [SERVICE_PATH].
pub const REMOVE_SUBNET_ADDRESS: &str = "/RemoveSubnetAddress";
/// Path of the `DeleteSubnet` RPC below [SERVICE_PATH].
pub const DELETE_SUBNET: &str = "/DeleteSubnet";
/// Path of the `GetSubnetAddresses` RPC below [SERVICE_PATH].
pub const GET_SUBNET_ADDRESSES: &str = "/GetSubnetAddresses";

/// RPCs served without a bearer token.
const PUBLIC_RPCS: [&str; 2] = [HEALTH_CHECK, ACCEPT_INVITE];

/// Full request paths of the RPCs served without a bearer token.
pub fn public_paths() -> Vec<String> {
    PUBLIC_RPCS
        .iter()
        .map(|rpc| format!("{SERVICE_PATH}{rpc}"))
        .collect()
}

/// Nests the registry API routes into the provided `router`.
pub fn nest_registry_api(router: Router, service: RegistryService) -> Router {
    router.nest(
        SERVICE_PATH,
        Router::new()
            .route(HEALTH_CHECK, post(health_check_handler))
            .route(ACCEPT_INVITE, post(accept_invite_handler))
            .route(CREATE_INVITED_USER, post(create_invited_user_handler))
            .route(APPROVE_INVITED_USER, post(approve_invited_user_handler))
            .route(GET_USERS, post(get_users_handler))
            .route(UPDATE_USER, post(update_user_handler))
            .route(DELETE_USER, post(delete_user_handler))
            .route(CREATE_SUBNET, post(create_subnet_handler))
            .route(GET_SUBNETS, post(get_subnets_handler))
            .route(UPDATE_SUBNET_META, post(update_subnet_meta_handler))
            .route(ASSIGN_SUBNET_ADDRESS, post(assign_subnet_address_handler))
            .route(REMOVE_SUBNET_ADDRESS, post(remove_subnet_address_handler))
            .route(DELETE_SUBNET, post(delete_subnet_handler))
            .route(GET_SUBNET_ADDRESSES, post(get_subnet_addresses_handler))
            .with_state(service),
    )
}

/// Translates a registry error into its Connect representation.
pub fn crpc_error(err: RegistryError) -> CrpcError {
    if err.is_retryable() {
        tracing::warn!(error=%err, "Registry operation failed");
        return CrpcError::new(CrpcErrorCode::Unavailable, err.to_string());
    }
    let code = match err.kind() {
        ErrorKind::Validation => CrpcErrorCode::InvalidArgument,
        ErrorKind::NotFound => CrpcErrorCode::NotFound,
        ErrorKind::Conflict => CrpcErrorCode::AlreadyExists,
        ErrorKind::InvalidState => CrpcErrorCode::FailedPrecondition,
        ErrorKind::Forbidden => CrpcErrorCode::PermissionDenied,
        ErrorKind::Exhausted => CrpcErrorCode::ResourceExhausted,
        ErrorKind::Internal => CrpcErrorCode::Internal,
    };
    CrpcError::new(code, err.to_string())
}

fn invalid_argument(message: String) -> CrpcError {
    crpc_error(RegistryError::InvalidArgument(message))
}

fn parse_field<T>(field: &str, value: &str) -> Result<T, CrpcError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| invalid_argument(format!("invalid {field} {value:?}: {e}")))
}

fn user_state(value: i32) -> Result<UserState, CrpcError> {
    rpc::UserState::try_from(value)
        .map_err(|e| invalid_argument(e.to_string()))?
        .try_into()
        .map_err(|e: anyhow::Error| invalid_argument(format!("{e:#}")))
}

fn role(value: i32) -> Result<Role, CrpcError> {
    rpc::Role::try_from(value)
        .map_err(|e| invalid_argument(e.to_string()))?
        .try_into()
        .map_err(|e: anyhow::Error| invalid_argument(format!("{e:#}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn listing<T, M, F>(result: Result<ListingStream<T>, RegistryError>, wrap: F) -> ConnectStream<M>
where
    T: Send + 'static,
    M: prost::Message + 'static,
    F: Fn(Listed<T>) -> M + Send + 'static,
{
    match result {
        Ok(stream) => {
            ConnectStream::new(stream.map(move |listed| listed.map(&wrap).map_err(crpc_error)))
        }
        Err(err) => ConnectStream::error(crpc_error(err)),
    }
}

async fn health_check_handler(
    State(service): State<RegistryService>,
    ConnectRpc(_request): ConnectRpc<rpc::HealthCheckRequest>,
) -> Result<ConnectRpc<rpc::HealthCheckResponse>, CrpcError> {
    service.health_check().await.map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::HealthCheckResponse {
        status: "SERVING".to_string(),
    }))
}

async fn accept_invite_handler(
    State(service): State<RegistryService>,
    ConnectRpc(request): ConnectRpc<rpc::AcceptInviteRequest>,
) -> Result<ConnectRpc<rpc::AcceptInviteResponse>, CrpcError> {
    let user = service
        .accept_invite(request.invite_token)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::AcceptInviteResponse {
        user: Some(user.into()),
    }))
}

async fn create_invited_user_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::CreateInvitedUserRequest>,
) -> Result<ConnectRpc<rpc::CreateInvitedUserResponse>, CrpcError> {
    let role = if request.role == rpc::Role::Unspecified as i32 {
        Role::Member
    } else {
        role(request.role)?
    };
    let (user, token) = service
        .create_invited_user(&actor, request.email, role)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::CreateInvitedUserResponse {
        user: Some(user.into()),
        invite_token: token.into_string(),
    }))
}

async fn approve_invited_user_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::ApproveInvitedUserRequest>,
) -> Result<ConnectRpc<rpc::ApproveInvitedUserResponse>, CrpcError> {
    let id: UserId = parse_field("user id", &request.user_id)?;
    let user = service
        .approve_invited_user(&actor, id)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::ApproveInvitedUserResponse {
        user: Some(user.into()),
    }))
}

async fn get_users_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectStreamRequest(request): ConnectStreamRequest<rpc::GetUsersRequest>,
) -> ConnectStream<rpc::GetUsersResponse> {
    let filter = match user_filter(&request) {
        Ok(filter) => filter,
        Err(err) => return ConnectStream::error(err),
    };
    listing(
        service.get_users(&actor, filter, Some(&request.after)),
        |listed| rpc::GetUsersResponse {
            user: Some(listed.item.into()),
            cursor: listed.cursor,
        },
    )
}

fn user_filter(request: &rpc::GetUsersRequest) -> Result<UserFilter, CrpcError> {
    Ok(UserFilter {
        state: request.state.map(user_state).transpose()?,
        role: request.role.map(role).transpose()?,
        email_contains: non_empty(request.email_contains.clone()),
    })
}

async fn update_user_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::UpdateUserRequest>,
) -> Result<ConnectRpc<rpc::UpdateUserResponse>, CrpcError> {
    let id: UserId = parse_field("user id", &request.user_id)?;
    let patch = UserPatch {
        display_name: request.display_name,
    };
    let user = service
        .update_user(&actor, id, patch)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::UpdateUserResponse {
        user: Some(user.into()),
    }))
}

async fn delete_user_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::DeleteUserRequest>,
) -> Result<ConnectRpc<rpc::DeleteUserResponse>, CrpcError> {
    let id: UserId = parse_field("user id", &request.user_id)?;
    service.delete_user(&actor, id).await.map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::DeleteUserResponse {}))
}

async fn create_subnet_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::CreateSubnetRequest>,
) -> Result<ConnectRpc<rpc::CreateSubnetResponse>, CrpcError> {
    let metadata = SubnetMetadata {
        name: request.name,
        description: request.description,
    };
    let subnet = service
        .create_subnet(&actor, request.cidr, metadata)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::CreateSubnetResponse {
        subnet: Some(subnet.into()),
    }))
}

async fn get_subnets_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectStreamRequest(request): ConnectStreamRequest<rpc::GetSubnetsRequest>,
) -> ConnectStream<rpc::GetSubnetsResponse> {
    let contains_address = match non_empty(request.contains_address)
        .map(|address| parse_field::<Ipv4Addr>("address", &address))
        .transpose()
    {
        Ok(address) => address,
        Err(err) => return ConnectStream::error(err),
    };
    let filter = SubnetFilter {
        name_contains: non_empty(request.name_contains),
        contains_address,
    };
    listing(
        service.get_subnets(&actor, filter, Some(&request.after)),
        |listed| rpc::GetSubnetsResponse {
            subnet: Some(listed.item.into()),
            cursor: listed.cursor,
        },
    )
}

async fn update_subnet_meta_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::UpdateSubnetMetaRequest>,
) -> Result<ConnectRpc<rpc::UpdateSubnetMetaResponse>, CrpcError> {
    let id: SubnetId = parse_field("subnet id", &request.subnet_id)?;
    let patch = SubnetMetadataPatch {
        name: request.name,
        description: request.description,
    };
    let subnet = service
        .update_subnet_meta(&actor, id, patch)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::UpdateSubnetMetaResponse {
        subnet: Some(subnet.into()),
    }))
}

async fn assign_subnet_address_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::AssignSubnetAddressRequest>,
) -> Result<ConnectRpc<rpc::AssignSubnetAddressResponse>, CrpcError> {
    let subnet_id: SubnetId = parse_field("subnet id", &request.subnet_id)?;
    let owner: UserId = parse_field("user id", &request.user_id)?;
    let requested = non_empty(request.requested_address)
        .map(|address| parse_field::<Ipv4Addr>("requested address", &address))
        .transpose()?;
    let assignment = service
        .assign_subnet_address(&actor, subnet_id, owner, request.device_label, requested)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::AssignSubnetAddressResponse {
        assignment: Some(assignment.into()),
    }))
}

async fn remove_subnet_address_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::RemoveSubnetAddressRequest>,
) -> Result<ConnectRpc<rpc::RemoveSubnetAddressResponse>, CrpcError> {
    let subnet_id: SubnetId = parse_field("subnet id", &request.subnet_id)?;
    let address: Ipv4Addr = parse_field("address", &request.address)?;
    service
        .remove_subnet_address(&actor, subnet_id, address)
        .await
        .map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::RemoveSubnetAddressResponse {}))
}

async fn delete_subnet_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectRpc(request): ConnectRpc<rpc::DeleteSubnetRequest>,
) -> Result<ConnectRpc<rpc::DeleteSubnetResponse>, CrpcError> {
    let id: SubnetId = parse_field("subnet id", &request.subnet_id)?;
    service.delete_subnet(&actor, id).await.map_err(crpc_error)?;
    Ok(ConnectRpc(rpc::DeleteSubnetResponse {}))
}

async fn get_subnet_addresses_handler(
    State(service): State<RegistryService>,
    Extension(Actor(actor)): Extension<Actor>,
    ConnectStreamRequest(request): ConnectStreamRequest<rpc::GetSubnetAddressesRequest>,
) -> ConnectStream<rpc::GetSubnetAddressesResponse> {
    let subnet_id: SubnetId = match parse_field("subnet id", &request.subnet_id) {
        Ok(id) => id,
        Err(err) => return ConnectStream::error(err),
    };
    listing(
        service.get_subnet_addresses(&actor, subnet_id, Some(&request.after)),
        |listed| rpc::GetSubnetAddressesResponse {
            assignment: Some(listed.item.into()),
            cursor: listed.cursor,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use prost::Message;
    use tower::ServiceExt;
    use wgd_axum_connect_rpc::{
        envelope::{APPLICATION_CONNECT_PROTO, Envelope, EnvelopeDecoder},
        extractor::APPLICATION_PROTO,
    };
    use wgd_registry_core::{model::User, store::memory::MemoryDocumentStore};

    use super::*;

    async fn app() -> (Router, RegistryService, User) {
        let service = RegistryService::new(Arc::new(MemoryDocumentStore::new()));
        let admin = service
            .users()
            .ensure_admin("admin@example.com")
            .await
            .unwrap();
        let router = nest_registry_api(Router::new(), service.clone());
        (router, service, admin)
    }

    fn unary<M: Message>(rpc: &str, actor: &User, message: M) -> Request<Body> {
        let mut request = Request::post(format!("{SERVICE_PATH}{rpc}"))
            .header(header::CONTENT_TYPE, APPLICATION_PROTO)
            .body(Body::from(message.encode_to_vec()))
            .unwrap();
        request.extensions_mut().insert(Actor(actor.clone()));
        request
    }

    fn streaming<M: Message>(rpc: &str, actor: &User, message: M) -> Request<Body> {
        let mut request = Request::post(format!("{SERVICE_PATH}{rpc}"))
            .header(header::CONTENT_TYPE, APPLICATION_CONNECT_PROTO)
            .body(Body::from(
                Envelope::message(message.encode_to_vec()).encode(),
            ))
            .unwrap();
        request.extensions_mut().insert(Actor(actor.clone()));
        request
    }

    async fn decode_unary<M: Message + Default>(
        response: axum::response::Response,
    ) -> Result<M, CrpcError> {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        if status != StatusCode::OK {
            return Err(serde_json::from_slice(&body).unwrap());
        }
        Ok(M::decode(body).unwrap())
    }

    async fn decode_stream<M: Message + Default>(
        response: axum::response::Response,
    ) -> (Vec<M>, Option<CrpcError>) {
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut decoder = EnvelopeDecoder::default();
        decoder.push(&body);
        let mut messages = Vec::new();
        while let Some(envelope) = decoder.next_envelope().unwrap() {
            if envelope.is_end_stream() {
                return (messages, envelope.end_stream_message().unwrap().error);
            }
            messages.push(M::decode(envelope.payload).unwrap());
        }
        panic!("stream ended without end-of-stream envelope");
    }

    #[test_log::test(tokio::test)]
    async fn subnet_lifecycle_over_rpc() {
        let (router, _service, admin) = app().await;

        let created: rpc::CreateSubnetResponse = decode_unary(
            router
                .clone()
                .oneshot(unary(CREATE_SUBNET, &admin, rpc::CreateSubnetRequest {
                    cidr: "10.0.0.0/30".into(),
                    name: "office".into(),
                    description: String::new(),
                }))
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        let subnet = created.subnet.unwrap();
        assert_eq!(subnet.cidr, "10.0.0.0/30");

        let mut addresses = Vec::new();
        for label in ["laptop", "phone"] {
            let assigned: rpc::AssignSubnetAddressResponse = decode_unary(
                router
                    .clone()
                    .oneshot(unary(
                        ASSIGN_SUBNET_ADDRESS,
                        &admin,
                        rpc::AssignSubnetAddressRequest {
                            subnet_id: subnet.id.clone(),
                            user_id: admin.id.to_string(),
                            device_label: label.into(),
                            requested_address: None,
                        },
                    ))
                    .await
                    .unwrap(),
            )
            .await
            .unwrap();
            addresses.push(assigned.assignment.unwrap().address);
        }
        assert_eq!(addresses, ["10.0.0.1", "10.0.0.2"]);

        let exhausted = decode_unary::<rpc::AssignSubnetAddressResponse>(
            router
                .clone()
                .oneshot(unary(
                    ASSIGN_SUBNET_ADDRESS,
                    &admin,
                    rpc::AssignSubnetAddressRequest {
                        subnet_id: subnet.id.clone(),
                        user_id: admin.id.to_string(),
                        device_label: "tablet".into(),
                        requested_address: None,
                    },
                ))
                .await
                .unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(exhausted.code, CrpcErrorCode::ResourceExhausted);

        let not_empty = decode_unary::<rpc::DeleteSubnetResponse>(
            router
                .clone()
                .oneshot(unary(DELETE_SUBNET, &admin, rpc::DeleteSubnetRequest {
                    subnet_id: subnet.id.clone(),
                }))
                .await
                .unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(not_empty.code, CrpcErrorCode::FailedPrecondition);

        let (listed, error) = decode_stream::<rpc::GetSubnetAddressesResponse>(
            router
                .clone()
                .oneshot(streaming(
                    GET_SUBNET_ADDRESSES,
                    &admin,
                    rpc::GetSubnetAddressesRequest {
                        subnet_id: subnet.id.clone(),
                        after: String::new(),
                    },
                ))
                .await
                .unwrap(),
        )
        .await;
        assert!(error.is_none());
        assert_eq!(listed.len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn errors_map_to_connect_codes() {
        let (router, _service, admin) = app().await;

        let create = |cidr: &str| {
            unary(CREATE_SUBNET, &admin, rpc::CreateSubnetRequest {
                cidr: cidr.into(),
                name: "net".into(),
                description: String::new(),
            })
        };

        let invalid = decode_unary::<rpc::CreateSubnetResponse>(
            router.clone().oneshot(create("10.0.0.1/24")).await.unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(invalid.code, CrpcErrorCode::InvalidArgument);

        decode_unary::<rpc::CreateSubnetResponse>(
            router.clone().oneshot(create("10.0.0.0/24")).await.unwrap(),
        )
        .await
        .unwrap();
        let overlap = decode_unary::<rpc::CreateSubnetResponse>(
            router.clone().oneshot(create("10.0.0.128/25")).await.unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(overlap.code, CrpcErrorCode::AlreadyExists);

        let bad_id = decode_unary::<rpc::ApproveInvitedUserResponse>(
            router
                .clone()
                .oneshot(unary(
                    APPROVE_INVITED_USER,
                    &admin,
                    rpc::ApproveInvitedUserRequest {
                        user_id: "not-a-uuid".into(),
                    },
                ))
                .await
                .unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(bad_id.code, CrpcErrorCode::InvalidArgument);

        let missing = decode_unary::<rpc::ApproveInvitedUserResponse>(
            router
                .clone()
                .oneshot(unary(
                    APPROVE_INVITED_USER,
                    &admin,
                    rpc::ApproveInvitedUserRequest {
                        user_id: UserId::generate().to_string(),
                    },
                ))
                .await
                .unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(missing.code, CrpcErrorCode::NotFound);

        assert_eq!(
            crpc_error(RegistryError::Internal("store down".into())).code,
            CrpcErrorCode::Unavailable
        );
    }

    #[test]
    fn retryable_errors_stay_retryable_over_rpc() {
        let errors = [
            RegistryError::Internal("store down".into()),
            RegistryError::InvalidToken,
            RegistryError::SubnetNotEmpty {
                subnet: SubnetId::generate(),
                assignments: 1,
            },
            RegistryError::InvalidArgument("bad".into()),
        ];
        for err in errors {
            let retryable = err.is_retryable();
            assert_eq!(crpc_error(err).is_retryable(), retryable);
        }
    }

    #[test_log::test(tokio::test)]
    async fn invite_flow_over_rpc() {
        let (router, service, admin) = app().await;

        let invited: rpc::CreateInvitedUserResponse = decode_unary(
            router
                .clone()
                .oneshot(unary(
                    CREATE_INVITED_USER,
                    &admin,
                    rpc::CreateInvitedUserRequest {
                        email: "Alice@Example.com".into(),
                        role: rpc::Role::Unspecified.into(),
                    },
                ))
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        let user = invited.user.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, rpc::Role::Member as i32);
        assert_eq!(user.state, rpc::UserState::Invited as i32);

        let accept = Request::post(format!("{SERVICE_PATH}{ACCEPT_INVITE}"))
            .header(header::CONTENT_TYPE, APPLICATION_PROTO)
            .body(Body::from(
                rpc::AcceptInviteRequest {
                    invite_token: invited.invite_token.clone(),
                }
                .encode_to_vec(),
            ))
            .unwrap();
        let accepted: rpc::AcceptInviteResponse =
            decode_unary(router.clone().oneshot(accept).await.unwrap())
                .await
                .unwrap();
        assert_eq!(
            accepted.user.unwrap().state,
            rpc::UserState::PendingApproval as i32
        );

        let approve = || {
            unary(
                APPROVE_INVITED_USER,
                &admin,
                rpc::ApproveInvitedUserRequest {
                    user_id: user.id.clone(),
                },
            )
        };
        let approved: rpc::ApproveInvitedUserResponse =
            decode_unary(router.clone().oneshot(approve()).await.unwrap())
                .await
                .unwrap();
        assert_eq!(
            approved.user.unwrap().state,
            rpc::UserState::Active as i32
        );
        let again = decode_unary::<rpc::ApproveInvitedUserResponse>(
            router.clone().oneshot(approve()).await.unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(again.code, CrpcErrorCode::FailedPrecondition);

        let alice = service.authenticate("alice@example.com").await.unwrap();
        let forbidden = decode_unary::<rpc::CreateSubnetResponse>(
            router
                .clone()
                .oneshot(unary(CREATE_SUBNET, &alice, rpc::CreateSubnetRequest {
                    cidr: "10.9.0.0/24".into(),
                    name: "rogue".into(),
                    description: String::new(),
                }))
                .await
                .unwrap(),
        )
        .await
        .unwrap_err();
        assert_eq!(forbidden.code, CrpcErrorCode::PermissionDenied);
    }

    #[test_log::test(tokio::test)]
    async fn user_listing_resumes_from_cursor() {
        let (router, service, admin) = app().await;
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            service
                .create_invited_user(&admin, email.into(), Role::Member)
                .await
                .unwrap();
        }

        let list = |after: String| {
            streaming(GET_USERS, &admin, rpc::GetUsersRequest {
                state: Some(rpc::UserState::Invited.into()),
                after,
                ..Default::default()
            })
        };
        let (first, error) = decode_stream::<rpc::GetUsersResponse>(
            router.clone().oneshot(list(String::new())).await.unwrap(),
        )
        .await;
        assert!(error.is_none());
        assert_eq!(first.len(), 3);

        let (rest, _) = decode_stream::<rpc::GetUsersResponse>(
            router
                .clone()
                .oneshot(list(first[0].cursor.clone()))
                .await
                .unwrap(),
        )
        .await;
        let ids = |items: &[rpc::GetUsersResponse]| {
            items
                .iter()
                .map(|item| item.user.as_ref().unwrap().id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&rest), ids(&first[1..]));

        let (_, error) = decode_stream::<rpc::GetUsersResponse>(
            router
                .clone()
                .oneshot(list("zz-not-hex".into()))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(error.unwrap().code, CrpcErrorCode::InvalidArgument);
    }
}
