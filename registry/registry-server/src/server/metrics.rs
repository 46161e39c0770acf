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
//! Registry API Prometheus middleware.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use axum::{body::Body, extract::MatchedPath};
use http::{Request, Response};
use prometheus::{HistogramVec, IntCounterVec};
use tower::{BoxError, Layer, Service};
use wgd_observability::metrics::registry::MetricsRegistry;

/// Label used for requests that did not match any route.
const UNMATCHED_RPC: &str = "unmatched";

/// Prometheus middleware layer for tracking registry API metrics.
#[derive(Clone)]
pub struct PrometheusMiddlewareLayer {
    metrics: Metrics,
}

impl PrometheusMiddlewareLayer {
    /// Create a new Prometheus middleware layer with the given metrics.
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for PrometheusMiddlewareLayer {
    type Service = PrometheusMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PrometheusMiddleware {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Prometheus middleware for tracking registry API metrics.
#[derive(Clone)]
pub struct PrometheusMiddleware<S> {
    inner: S,
    metrics: Metrics,
}

impl<S> Service<Request<Body>> for PrometheusMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let rpc = request
            .extensions()
            .get::<MatchedPath>()
            .map(|path| path.as_str().to_string())
            .unwrap_or_else(|| UNMATCHED_RPC.to_string());
        let metrics = self.metrics.clone();

        metrics.rpc_started_total.with_label_values(&[&rpc]).inc();

        let fut = self.inner.call(request);
        let start = Instant::now();

        Box::pin(async move {
            let result = fut.await.map_err(Into::into)?;
            let status = result.status().as_str().to_string();

            metrics
                .rpc_handled_total
                .with_label_values(&[&rpc, &status])
                .inc();
            metrics
                .rpc_latency_seconds
                .with_label_values(&[&rpc, &status])
                .observe(start.elapsed().as_secs_f64());

            Ok(result)
        })
    }
}

/// Registry API metrics.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Total number of RPCs started on the server.
    pub rpc_started_total: IntCounterVec,
    /// Total number of RPCs handled on the server.
    pub rpc_handled_total: IntCounterVec,
    /// Latency of RPCs in seconds.
    pub rpc_latency_seconds: HistogramVec,
}

impl Metrics {
    /// Create new metrics instance with the given registry.
    pub fn new(metrics_registry: &MetricsRegistry) -> Self {
        Metrics {
            rpc_started_total: metrics_registry.int_counter_vec(
                "registry_rpc_requests_started_total",
                "Total number of registry RPCs started on the server.",
                &["rpc"],
            ),
            rpc_handled_total: metrics_registry.int_counter_vec(
                "registry_rpc_requests_handled_total",
                "Total number of registry RPCs handled on the server.",
                &["rpc", "status"],
            ),
            rpc_latency_seconds: metrics_registry.histogram_vec(
                "registry_rpc_requests_latency_seconds",
                "Latency of registry RPCs in seconds.",
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
                &["rpc", "status"],
            ),
        }
    }
}
