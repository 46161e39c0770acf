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
//! # wgd registry client
//!
//! [CrpcRegistryClient] talks to a registry over Connect RPC. The registry
//! only accepts clients presenting a certificate of its client CA, so the
//! [reqwest::Client] handed to [CrpcRegistryClient::new_with_client] usually
//! carries an identity:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wgd_registry_client::client::{CrpcRegistryClient, RegistryClient};
//! use wgd_reqwest_connect_rpc::token_source::StaticTokenSource;
//!
//! async fn health(identity_pem: &[u8], ca_pem: &[u8], token: &str) -> anyhow::Result<String> {
//!     let http = reqwest::Client::builder()
//!         .use_rustls_tls()
//!         .identity(reqwest::Identity::from_pem(identity_pem)?)
//!         .add_root_certificate(reqwest::Certificate::from_pem(ca_pem)?)
//!         .build()?;
//!     let mut client =
//!         CrpcRegistryClient::new_with_client(&"https://localhost:6000".parse()?, http)?;
//!     client.use_token_source(Arc::new(StaticTokenSource::new(token)));
//!     Ok(client.health_check().await?)
//! }
//! ```

pub mod client;
