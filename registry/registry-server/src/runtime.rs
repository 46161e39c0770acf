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
//! Registry runtime.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wgd_observability::metrics::{endpoint, registry::MetricsRegistry};
use wgd_registry_core::{
    error::RegistryError, service::RegistryService, store::memory::MemoryDocumentStore,
};
use wgd_token_validator::validator::{TokenValidatorError, Validator};
use wgd_utils::task_handler::CancelTaskSet;

use crate::{
    config::RegistryConfig,
    server::{self, metrics::Metrics},
    tls::{TlsMaterial, TlsSetupError},
};

/// Registry runtime error.
#[derive(Error, Debug)]
pub enum RegistryRuntimeError {
    /// TLS material is unusable.
    #[error("tls setup failed: {0}")]
    Tls(#[from] TlsSetupError),
    /// The token public key is unusable.
    #[error("invalid token public key {}: {source}", path.display())]
    TokenKey {
        /// The key file.
        path: PathBuf,
        /// The underlying error.
        source: TokenValidatorError,
    },
    /// The token public key could not be read.
    #[error("failed to read token public key {}: {source}", path.display())]
    TokenKeyRead {
        /// The key file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// State could not be loaded or saved.
    #[error("state file {}: {source}", path.display())]
    StateFile {
        /// The state file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A bootstrap administrator could not be set up.
    #[error("bootstrap admin {email}: {source}")]
    Bootstrap {
        /// The configured email.
        email: String,
        /// The underlying error.
        source: RegistryError,
    },
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder for a registry runtime.
pub struct RegistryRuntimeBuilder {
    config: RegistryConfig,
    metrics_registry: MetricsRegistry,
}

impl RegistryRuntimeBuilder {
    /// Create a new registry runtime builder for `config`.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            metrics_registry: MetricsRegistry::new(),
        }
    }

    /// Register the registry's metrics with `metrics_registry`.
    pub fn with_metrics_registry(mut self, metrics_registry: MetricsRegistry) -> Self {
        self.metrics_registry = metrics_registry;
        self
    }

    /// Start the registry runtime.
    pub async fn start(self) -> Result<RegistryRuntime, RegistryRuntimeError> {
        self.start_with_task_set(CancelTaskSet::new()).await
    }

    /// Start the registry runtime on `task_set`.
    pub async fn start_with_task_set(
        self,
        mut task_set: CancelTaskSet,
    ) -> Result<RegistryRuntime, RegistryRuntimeError> {
        let config = self.config;

        let tls_config = TlsMaterial::load(
            &config.rpc.cert_file,
            &config.rpc.key_file,
            &config.rpc.client_ca_file,
        )
        .await?
        .server_config()?;

        let key_path = &config.auth.token_public_key_file;
        let key_pem = tokio::fs::read(key_path).await.map_err(|source| {
            RegistryRuntimeError::TokenKeyRead {
                path: key_path.clone(),
                source,
            }
        })?;
        let validator = Validator::from_public_key_pem(&key_pem, None).map_err(|source| {
            RegistryRuntimeError::TokenKey {
                path: key_path.clone(),
                source,
            }
        })?;

        let store = match &config.store.state_file {
            Some(path) => {
                let store = MemoryDocumentStore::load(path).await.map_err(|source| {
                    RegistryRuntimeError::StateFile {
                        path: path.clone(),
                        source,
                    }
                })?;
                tracing::info!(path=%path.display(), "Loaded registry state");
                Arc::new(store)
            }
            None => Arc::new(MemoryDocumentStore::new()),
        };
        let service = RegistryService::new(store.clone());

        for email in &config.bootstrap_admins {
            let admin = service.users().ensure_admin(email).await.map_err(|source| {
                RegistryRuntimeError::Bootstrap {
                    email: email.clone(),
                    source,
                }
            })?;
            tracing::info!(user=%admin.id, email=%admin.email, "Bootstrapped administrator");
        }

        let listener = TcpListener::bind(config.rpc.listen_addr)
            .await
            .map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to bind registry API to {}: {e}",
                        config.rpc.listen_addr
                    ),
                )
            })?;
        let rpc_addr = listener.local_addr()?;

        let router = server::router(
            service.clone(),
            validator,
            Metrics::new(&self.metrics_registry),
        );
        let token = task_set.cancellation_token();
        task_set.spawn_task("registry-api", async move {
            server::start(token, listener, tls_config, router).await
        });

        let metrics_addr = match config.metrics.listen_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                let metrics_addr = listener.local_addr()?;
                let token = task_set.cancellation_token();
                let metrics_registry = self.metrics_registry.clone();
                task_set.spawn_task("metrics", async move {
                    endpoint::start(token, listener, metrics_registry).await
                });
                Some(metrics_addr)
            }
            None => None,
        };

        Ok(RegistryRuntime {
            task_set,
            service,
            store,
            state_file: config.store.state_file,
            rpc_addr,
            metrics_addr,
        })
    }
}

/// A running registry.
pub struct RegistryRuntime {
    task_set: CancelTaskSet,
    service: RegistryService,
    store: Arc<MemoryDocumentStore>,
    state_file: Option<PathBuf>,
    rpc_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
}

impl RegistryRuntime {
    /// Address the registry API listens on.
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    /// Address of the metrics endpoint, if enabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// The registry served by this runtime.
    pub fn service(&self) -> &RegistryService {
        &self.service
    }

    /// Token that stops the runtime when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.task_set.cancellation_token()
    }

    /// Waits until every task stopped, then writes the state file if one is
    /// configured.
    pub async fn join(&mut self) -> Result<(), RegistryRuntimeError> {
        let joined = self.task_set.join_all().await;
        self.save_state().await?;
        Ok(joined?)
    }

    /// Stops and joins the runtime. This is primarily intended to be used in
    /// tests.
    pub async fn stop_and_join(&mut self) -> Result<(), RegistryRuntimeError> {
        self.task_set.cancellation_token().cancel();
        self.join().await
    }

    async fn save_state(&self) -> Result<(), RegistryRuntimeError> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        self.store
            .save(path)
            .await
            .map_err(|source| RegistryRuntimeError::StateFile {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path=%path.display(), "Saved registry state");
        Ok(())
    }
}
