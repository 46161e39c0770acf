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
//! Registry API server.

use std::{sync::Arc, time::Duration};

use axum::{BoxError, Router, error_handling::HandleErrorLayer, response::IntoResponse};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls::ServerConfig;
use tokio::{net::TcpListener, task::JoinSet};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, timeout::TimeoutLayer};
use wgd_axum_connect_rpc::error::{CrpcError, CrpcErrorCode};
use wgd_observability::info_trace_layer;
use wgd_registry_core::service::RegistryService;
use wgd_token_validator::validator::Validator;

use crate::{
    crpc_api::{nest_registry_api, public_paths},
    server::{
        auth::{AuthMiddlewareLayer, RegistryClaims},
        metrics::{Metrics, PrometheusMiddlewareLayer},
    },
};

pub mod auth;
pub mod metrics;

const REGISTRY_API_TIMEOUT: Duration = Duration::from_secs(30);
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Builds the registry API router with its middleware stack.
pub fn router(
    service: RegistryService,
    validator: Validator<RegistryClaims>,
    metrics: Metrics,
) -> Router {
    let router = nest_registry_api(Router::new(), service.clone());

    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(info_trace_layer())
            .layer(TimeoutLayer::new(REGISTRY_API_TIMEOUT))
            .layer(PrometheusMiddlewareLayer::new(metrics))
            .layer(AuthMiddlewareLayer::new(validator, service, public_paths())),
    )
}

async fn handle_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        return CrpcError::new(
            CrpcErrorCode::DeadlineExceeded,
            "request took longer than the deadline",
        );
    }
    tracing::error!(error=%err, "Registry API error");
    CrpcError::new(CrpcErrorCode::Internal, format!("unhandled error: {err}"))
}

/// Serves `router` over mutual TLS on `listener` until `cancellation_token`
/// is cancelled. Open connections are shut down gracefully.
pub async fn start(
    cancellation_token: CancellationToken,
    listener: TcpListener,
    tls_config: Arc<ServerConfig>,
    router: Router,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    let acceptor = TlsAcceptor::from(tls_config);
    let mut connections = JoinSet::new();
    let mut accept_failures = 0;

    tracing::info!(addr=%addr, "Starting registry API");

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => {
                    accept_failures = 0;
                    accepted
                }
                Err(e) => {
                    // Errors like EMFILE persist until connections close.
                    accept_failures += 1;
                    let backoff = accept_backoff(accept_failures);
                    tracing::warn!(error=%e, ?backoff, "Failed to accept connection");
                    tokio::select! {
                        _ = cancellation_token.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    while connections.try_join_next().is_some() {}
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        let token = cancellation_token.clone();
        connections.spawn(async move {
            let tls_stream =
                match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                    Ok(Ok(tls_stream)) => tls_stream,
                    Ok(Err(e)) => {
                        tracing::debug!(%peer, error=%e, "TLS handshake failed");
                        return;
                    }
                    Err(_) => {
                        tracing::debug!(%peer, "TLS handshake timed out");
                        return;
                    }
                };

            let builder = auto::Builder::new(TokioExecutor::new());
            let connection =
                builder.serve_connection(TokioIo::new(tls_stream), TowerToHyperService::new(router));
            let mut connection = std::pin::pin!(connection);
            let result = tokio::select! {
                result = connection.as_mut() => result,
                _ = token.cancelled() => {
                    connection.as_mut().graceful_shutdown();
                    connection.await
                }
            };
            if let Err(e) = result {
                tracing::debug!(%peer, error=%e, "Connection closed with error");
            }
        });

        // Reap finished connections.
        while connections.try_join_next().is_some() {}
    }

    tracing::info!("Shutting down registry API server");
    while connections.join_next().await.is_some() {}
    Ok(())
}

/// Delay before the next accept after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(1 << failures.saturating_sub(1).min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_backoff_grows_and_caps() {
        assert_eq!(accept_backoff(1), ACCEPT_BACKOFF_MIN);
        assert_eq!(accept_backoff(2), ACCEPT_BACKOFF_MIN * 2);
        assert_eq!(accept_backoff(3), ACCEPT_BACKOFF_MIN * 4);
        assert!((1..100).all(|n| accept_backoff(n) <= accept_backoff(n + 1)));
        assert_eq!(accept_backoff(u32::MAX), ACCEPT_BACKOFF_MAX);
    }
}
