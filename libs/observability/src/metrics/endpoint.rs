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
//! HTTP endpoint to expose prometheus metrics.

use std::time::Duration;

use axum::{
    Router,
    error_handling::HandleErrorLayer,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus::{Encoder, IntCounterVec, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::{
    BoxError, ServiceBuilder,
    limit::GlobalConcurrencyLimitLayer,
    load_shed::error::Overloaded,
    timeout::{TimeoutLayer, error::Elapsed},
};
use tracing::{error, info};

use crate::metrics::registry::MetricsRegistry;

const METRICS_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_CONCURRENT_REQUESTS: usize = 32;

/// Prometheus metrics for the HTTP endpoint.
#[derive(Clone)]
struct EndpointMetrics {
    scrapes_total: IntCounterVec,
}

impl EndpointMetrics {
    fn new(metrics_registry: &MetricsRegistry) -> Self {
        Self {
            scrapes_total: metrics_registry.int_counter_vec(
                "metrics_endpoint_scrapes_total",
                "Total number of scrapes of the /metrics endpoint by outcome.",
                &["outcome"],
            ),
        }
    }
}

/// The `/metrics` router, exposed separately for tests.
pub fn router(metrics_registry: MetricsRegistry) -> Router {
    let metrics = EndpointMetrics::new(&metrics_registry);
    Router::new()
        .route("/metrics", get(metrics_endpoint))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_box_error_to_response))
                .load_shed()
                .layer(TimeoutLayer::new(METRICS_TIMEOUT))
                .layer(GlobalConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS)),
        )
        .with_state((metrics_registry, metrics))
}

/// Expose prometheus metrics over HTTP. The HTTP server will respond to a GET request for the
/// /metrics path with the textual representation of the prometheus metrics.
pub async fn start(
    cancellation_token: CancellationToken,
    listener: TcpListener,
    metrics_registry: MetricsRegistry,
) -> std::io::Result<()> {
    let metrics_service = router(metrics_registry).into_make_service();

    info!(addr=?listener.local_addr(), "Starting metrics endpoint");
    if let Err(e) = axum::serve(listener, metrics_service)
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await
    {
        error!(error=%e, "Metrics endpoint server unexpectedly stopped");
        return Err(e);
    }
    info!("Metrics endpoint server stopped gracefully");
    Ok(())
}

async fn metrics_endpoint(
    State((metrics_registry, metrics)): State<(MetricsRegistry, EndpointMetrics)>,
) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = metrics_registry.gather();
    let mut buffer = Vec::with_capacity(families.len() * 64);
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        metrics.scrapes_total.with_label_values(&["error"]).inc();
        error!(error=%e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            format!("failed to encode metrics: {e}").into_bytes(),
        );
    }
    metrics.scrapes_total.with_label_values(&["ok"]).inc();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
}

async fn map_box_error_to_response(err: BoxError) -> (StatusCode, String) {
    if err.is::<Overloaded>() {
        (
            StatusCode::TOO_MANY_REQUESTS,
            "The service is overloaded.".to_string(),
        )
    } else if err.is::<Elapsed>() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            "Request took longer than the deadline.".to_string(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unexpected error: {err}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn serves_registered_metrics_as_text() {
        let registry = MetricsRegistry::new();
        let gauge = registry.int_gauge("registry_subnets", "Number of subnets.");
        gauge.set(3);

        let response = router(registry)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("registry_subnets 3"), "{text}");
    }
}
