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
//! Admission of users through the registry API.

use futures::TryStreamExt;
use integration_tests::{ADMIN_EMAIL, RegistryTestEnv};
use test_log::test;
use wgd_registry_client::client::RegistryClient;
use wgd_registry_core::model::{Role, SubnetMetadata, UserFilter, UserPatch, UserState};
use wgd_reqwest_connect_rpc::CrpcErrorCode;

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn invited_user_becomes_active_member() {
    let env = RegistryTestEnv::start().await;
    let admin = env.client_for(ADMIN_EMAIL);
    let bob = env.client_for("bob@example.com");

    let (invited, invite_token) = admin
        .create_invited_user("Bob@Example.com", Role::Member)
        .await
        .unwrap();
    assert_eq!(invited.email, "bob@example.com");
    assert_eq!(invited.state, UserState::Invited);

    // Not active yet, so the token is not accepted.
    let err = bob
        .get_users(UserFilter::default(), None)
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), Some(CrpcErrorCode::PermissionDenied));

    let pending = env.anonymous_client().accept_invite(&invite_token).await.unwrap();
    assert_eq!(pending.id, invited.id);
    assert_eq!(pending.state, UserState::PendingApproval);

    // Invite tokens are single use.
    let err = env
        .anonymous_client()
        .accept_invite(&invite_token)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(CrpcErrorCode::PermissionDenied));

    let active = admin.approve_invited_user(invited.id).await.unwrap();
    assert_eq!(active.state, UserState::Active);
    assert!(active.approved_at.is_some());

    // Members only see themselves.
    let visible: Vec<_> = bob
        .get_users(UserFilter::default(), None)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].item.id, invited.id);

    let renamed = bob
        .update_user(invited.id, UserPatch {
            display_name: Some("Bob".into()),
        })
        .await
        .unwrap();
    assert_eq!(renamed.display_name.as_deref(), Some("Bob"));

    let err = bob
        .create_invited_user("eve@example.com", Role::Admin)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(CrpcErrorCode::PermissionDenied));

    env.runtime.cancellation_token().cancel();
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn deleting_a_user_releases_their_addresses() {
    let env = RegistryTestEnv::start().await;
    let admin = env.client_for(ADMIN_EMAIL);

    let (carol, token) = admin
        .create_invited_user("carol@example.com", Role::Member)
        .await
        .unwrap();
    env.anonymous_client().accept_invite(&token).await.unwrap();
    admin.approve_invited_user(carol.id).await.unwrap();

    let subnet = admin
        .create_subnet("10.20.0.0/29", SubnetMetadata {
            name: "lab".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    let carol_client = env.client_for("carol@example.com");
    let laptop = carol_client
        .assign_subnet_address(subnet.id, carol.id, "laptop", None)
        .await
        .unwrap();
    assert_eq!(laptop.address.to_string(), "10.20.0.1");
    carol_client
        .assign_subnet_address(subnet.id, carol.id, "phone", None)
        .await
        .unwrap();

    // A subnet with assignments cannot be deleted.
    let err = admin.delete_subnet(subnet.id).await.unwrap_err();
    assert_eq!(err.code(), Some(CrpcErrorCode::FailedPrecondition));

    admin.delete_user(carol.id).await.unwrap();

    let left: Vec<_> = admin
        .get_subnet_addresses(subnet.id, None)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(left.is_empty());

    let removed: Vec<_> = admin
        .get_users(
            UserFilter {
                state: Some(UserState::Removed),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].item.id, carol.id);

    // Removed users are locked out.
    let err = carol_client
        .get_subnets(Default::default(), None)
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), Some(CrpcErrorCode::PermissionDenied));

    // Removal is terminal.
    let err = admin.delete_user(carol.id).await.unwrap_err();
    assert_eq!(err.code(), Some(CrpcErrorCode::FailedPrecondition));

    // The freed address is handed out again.
    let admin_user = env.runtime.service().authenticate(ADMIN_EMAIL).await.unwrap();
    let reused = admin
        .assign_subnet_address(subnet.id, admin_user.id, "router", None)
        .await
        .unwrap();
    assert_eq!(reused.address, laptop.address);

    admin.remove_subnet_address(subnet.id, reused.address).await.unwrap();
    admin.delete_subnet(subnet.id).await.unwrap();

    env.runtime.cancellation_token().cancel();
}
