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
//! Transport level authentication of the registry API.

use std::sync::Arc;

use integration_tests::{ADMIN_EMAIL, RegistryTestEnv, token_for};
use test_log::test;
use wgd_registry_client::client::RegistryClient;
use wgd_reqwest_connect_rpc::{
    CrpcErrorCode, client::CrpcClientError, token_source::StaticTokenSource,
};
use wgd_utils::test::TestPki;

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn health_check_needs_certificate_but_no_token() {
    let env = RegistryTestEnv::start().await;

    let status = env.anonymous_client().health_check().await.unwrap();
    assert_eq!(status, "SERVING");

    let err = env.client_with_identity(None).health_check().await.unwrap_err();
    assert!(
        matches!(err, CrpcClientError::ConnectionError { .. }),
        "unexpected error: {err}"
    );

    env.runtime.cancellation_token().cancel();
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn certificates_of_other_authorities_are_rejected() {
    let env = RegistryTestEnv::start().await;
    let foreign = TestPki::generate().unwrap();

    let err = env
        .client_with_identity(Some(&foreign.client))
        .health_check()
        .await
        .unwrap_err();
    assert!(
        matches!(err, CrpcClientError::ConnectionError { .. }),
        "unexpected error: {err}"
    );

    // Any certificate of the trusted authority works.
    let device = env.pki.issue_client("second device").unwrap();
    assert_eq!(
        env.client_with_identity(Some(&device))
            .health_check()
            .await
            .unwrap(),
        "SERVING"
    );

    env.runtime.cancellation_token().cancel();
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn protected_rpcs_need_a_valid_token() {
    let env = RegistryTestEnv::start().await;

    let err = env
        .anonymous_client()
        .get_subnets(Default::default(), None)
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), Some(CrpcErrorCode::Unauthenticated));

    let mut garbage = env.anonymous_client();
    garbage.use_token_source(Arc::new(StaticTokenSource::new("not-a-jwt")));
    let err = garbage
        .delete_subnet(wgd_registry_core::model::SubnetId::generate())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(CrpcErrorCode::Unauthenticated));

    // A valid token for somebody the registry does not know.
    let mut stranger = env.anonymous_client();
    stranger.use_token_source(Arc::new(StaticTokenSource::new(token_for(
        "stranger@example.com",
    ))));
    let err = stranger
        .get_subnets(Default::default(), None)
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), Some(CrpcErrorCode::PermissionDenied));

    let admin = env.client_for(ADMIN_EMAIL);
    let err = admin
        .delete_subnet(wgd_registry_core::model::SubnetId::generate())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(CrpcErrorCode::NotFound));

    env.runtime.cancellation_token().cancel();
}
