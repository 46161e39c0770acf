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
//! Registry configuration file.
//!
//! Relative paths in the file are resolved against the directory containing
//! it.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wgd_registry_core::{error::RegistryError, users::normalize_email};
use wgd_utils::io::read_file;

/// Default address of the registry API.
pub const DEFAULT_RPC_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6000);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("failed to load config {}: {source}", path.display())]
    Read {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A bootstrap administrator email is malformed.
    #[error("invalid bootstrap admin {email:?}: {source}")]
    InvalidBootstrapAdmin {
        /// The configured email.
        email: String,
        /// Why it was rejected.
        source: RegistryError,
    },
    /// Two listeners share an address.
    #[error("metrics and registry API both listen on {0}")]
    AddressClash(SocketAddr),
}

/// The registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Registry API listener.
    pub rpc: RpcConfig,
    /// Bearer token verification.
    pub auth: AuthConfig,
    /// Prometheus endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Persistence.
    #[serde(default)]
    pub store: StoreConfig,
    /// Emails that are made active administrators on startup.
    #[serde(default)]
    pub bootstrap_admins: Vec<String>,
}

/// Registry API listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcConfig {
    /// Listen address.
    #[serde(default = "default_rpc_listen_addr")]
    pub listen_addr: SocketAddr,
    /// PEM server certificate chain.
    pub cert_file: PathBuf,
    /// PEM private key of the server certificate.
    pub key_file: PathBuf,
    /// PEM trust root for client certificates.
    pub client_ca_file: PathBuf,
}

fn default_rpc_listen_addr() -> SocketAddr {
    DEFAULT_RPC_LISTEN_ADDR
}

/// Bearer token configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// PEM Ed25519 public key that verifies bearer tokens.
    pub token_public_key_file: PathBuf,
}

/// Prometheus endpoint configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Serve `/metrics` on this address. Disabled if unset.
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

/// Persistence configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// JSON snapshot loaded on startup and written on shutdown. State is
    /// kept in memory only if unset.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

impl RegistryConfig {
    /// Loads and validates the configuration at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config: RegistryConfig =
            read_file(path).await.map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that deserialization cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for email in &self.bootstrap_admins {
            normalize_email(email).map_err(|source| ConfigError::InvalidBootstrapAdmin {
                email: email.clone(),
                source,
            })?;
        }
        if self.metrics.listen_addr == Some(self.rpc.listen_addr)
            && self.rpc.listen_addr.port() != 0
        {
            return Err(ConfigError::AddressClash(self.rpc.listen_addr));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        };
        resolve(&mut self.rpc.cert_file);
        resolve(&mut self.rpc.key_file);
        resolve(&mut self.rpc.client_ca_file);
        resolve(&mut self.auth.token_public_key_file);
        if let Some(state_file) = self.store.state_file.as_mut() {
            resolve(state_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn load_str(content: &str) -> (tempfile::TempDir, Result<RegistryConfig, ConfigError>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        tokio::fs::write(&path, content).await.unwrap();
        let config = RegistryConfig::load(&path).await;
        (dir, config)
    }

    #[test_log::test(tokio::test)]
    async fn minimal_config_uses_defaults() {
        let (dir, config) = load_str(
            r#"{
                "rpc": {
                    "cert_file": "server.pem",
                    "key_file": "/etc/wgd/server.key",
                    "client_ca_file": "ca.pem"
                },
                "auth": { "token_public_key_file": "token.pub" }
            }"#,
        )
        .await;
        let config = config.unwrap();

        assert_eq!(config.rpc.listen_addr, DEFAULT_RPC_LISTEN_ADDR);
        assert_eq!(config.rpc.cert_file, dir.path().join("server.pem"));
        assert_eq!(config.rpc.key_file, PathBuf::from("/etc/wgd/server.key"));
        assert_eq!(config.metrics, MetricsConfig::default());
        assert_eq!(config.store.state_file, None);
        assert!(config.bootstrap_admins.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn rejects_invalid_configs() {
        let (_dir, unknown_field) = load_str(
            r#"{
                "rpc": { "cert_file": "a", "key_file": "b", "client_ca_file": "c", "port": 1 },
                "auth": { "token_public_key_file": "d" }
            }"#,
        )
        .await;
        assert!(matches!(unknown_field, Err(ConfigError::Read { .. })));

        let (_dir, bad_admin) = load_str(
            r#"{
                "rpc": { "cert_file": "a", "key_file": "b", "client_ca_file": "c" },
                "auth": { "token_public_key_file": "d" },
                "bootstrap_admins": ["not an email"]
            }"#,
        )
        .await;
        assert!(matches!(
            bad_admin,
            Err(ConfigError::InvalidBootstrapAdmin { .. })
        ));

        let (_dir, clash) = load_str(
            r#"{
                "rpc": {
                    "listen_addr": "127.0.0.1:7000",
                    "cert_file": "a", "key_file": "b", "client_ca_file": "c"
                },
                "auth": { "token_public_key_file": "d" },
                "metrics": { "listen_addr": "127.0.0.1:7000" }
            }"#,
        )
        .await;
        assert!(matches!(clash, Err(ConfigError::AddressClash(_))));
    }

    #[test_log::test(tokio::test)]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = RegistryConfig::load(dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.json"), "{err}");
    }
}
