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

//! Integration tests for the wgd registry
//!
//! The tests in this crate start a complete registry runtime and talk to it
//! through [CrpcRegistryClient] over mutual TLS.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tempfile::TempDir;
use url::Url;
use wgd_registry::{
    config::{AuthConfig, MetricsConfig, RegistryConfig, RpcConfig, StoreConfig},
    runtime::{RegistryRuntime, RegistryRuntimeBuilder},
    server::auth::RegistryClaims,
};
use wgd_registry_client::client::CrpcRegistryClient;
use wgd_reqwest_connect_rpc::token_source::StaticTokenSource;
use wgd_token_validator::validator::{insecure_public_key_pem, insecure_sign};
use wgd_utils::test::{PemIdentity, TestPki, install_rustls_crypto_provider};

/// Email of the administrator every test registry is bootstrapped with.
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// A running registry together with the PKI its clients authenticate with.
pub struct RegistryTestEnv {
    /// The registry runtime.
    pub runtime: RegistryRuntime,
    /// Base URL of the registry API.
    pub url: Url,
    /// PKI the registry trusts.
    pub pki: TestPki,
    _dir: TempDir,
}

impl RegistryTestEnv {
    /// Starts a registry on an ephemeral port.
    pub async fn start() -> Self {
        install_rustls_crypto_provider();

        let dir = tempfile::tempdir().unwrap();
        let pki = TestPki::generate().unwrap();
        let files = pki.write_to(dir.path()).unwrap();
        let key_file = dir.path().join("token.pub");
        std::fs::write(&key_file, insecure_public_key_pem()).unwrap();

        let config = RegistryConfig {
            rpc: RpcConfig {
                listen_addr: "127.0.0.1:0".parse().unwrap(),
                cert_file: files.server_cert,
                key_file: files.server_key,
                client_ca_file: files.ca_cert,
            },
            auth: AuthConfig {
                token_public_key_file: key_file,
            },
            metrics: MetricsConfig::default(),
            store: StoreConfig::default(),
            bootstrap_admins: vec![ADMIN_EMAIL.into()],
        };
        let runtime = RegistryRuntimeBuilder::new(config)
            .start()
            .await
            .expect("Failed to start registry");
        let url = format!("https://127.0.0.1:{}/", runtime.rpc_addr().port())
            .parse()
            .unwrap();

        RegistryTestEnv {
            runtime,
            url,
            pki,
            _dir: dir,
        }
    }

    /// A client presenting the default client certificate and a token for
    /// `email`.
    pub fn client_for(&self, email: &str) -> CrpcRegistryClient {
        let mut client = self.anonymous_client();
        client.use_token_source(Arc::new(StaticTokenSource::new(token_for(email))));
        client
    }

    /// A client presenting the default client certificate but no token.
    pub fn anonymous_client(&self) -> CrpcRegistryClient {
        self.client_with_identity(Some(&self.pki.client))
    }

    /// A client presenting `identity`, or no certificate at all.
    pub fn client_with_identity(&self, identity: Option<&PemIdentity>) -> CrpcRegistryClient {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(5))
            .add_root_certificate(
                reqwest::Certificate::from_pem(self.pki.ca_pem().as_bytes()).unwrap(),
            );
        if let Some(identity) = identity {
            builder = builder
                .identity(reqwest::Identity::from_pem(identity.combined_pem().as_bytes()).unwrap());
        }
        CrpcRegistryClient::new_with_client(&self.url, builder.build().unwrap()).unwrap()
    }
}

/// A bearer token for `email`, valid for an hour.
pub fn token_for(email: &str) -> String {
    let exp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap() + Duration::from_secs(3600);
    insecure_sign(&RegistryClaims {
        sub: email.to_string(),
        exp: exp.as_secs(),
    })
}
