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
//! Prometheus metric registry.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, core::Collector,
    proto::MetricFamily,
};

/// Register and collect metrics of one or more components.
///
/// Each component builds its metrics from the registry handed to it, so the
/// caller controls namespacing and which metrics end up on which endpoint.
///
/// Metric definitions are static. Registering an invalid or duplicate metric
/// is a programming error and panics.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    registry: prometheus::Registry,
}

impl MetricsRegistry {
    /// Use prometheus' default registry and register process metrics. As a
    /// result, this registry will 'point' to the global registry.
    pub fn new_global() -> Self {
        let registry = prometheus::default_registry().clone();

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            // Another instance may have registered the process collector already.
            .ok();

        Self { registry }
    }

    /// Create a new metrics registry with no collectors pre-registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a `HistogramVec`.
    pub fn histogram_vec<S: Into<String>>(
        &self,
        name: S,
        help: S,
        buckets: Vec<f64>,
        label_names: &[&str],
    ) -> HistogramVec {
        self.register_collector(HistogramVec::new(
            HistogramOpts::new(name, help).buckets(buckets),
            label_names,
        ))
    }

    /// Create and register an `IntGauge`.
    pub fn int_gauge<S: Into<String>>(&self, name: S, help: S) -> IntGauge {
        self.register_collector(IntGauge::new(name, help))
    }

    /// Create and register an `IntGaugeVec`.
    pub fn int_gauge_vec<S: Into<String>>(
        &self,
        name: S,
        help: S,
        label_names: &[&str],
    ) -> IntGaugeVec {
        self.register_collector(IntGaugeVec::new(Opts::new(name, help), label_names))
    }

    /// Create and register an `IntCounterVec`.
    pub fn int_counter_vec<S: Into<String>>(
        &self,
        name: S,
        help: S,
        label_names: &[&str],
    ) -> IntCounterVec {
        self.register_collector(IntCounterVec::new(Opts::new(name, help), label_names))
    }

    /// Snapshot of all registered metric families.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    fn register_collector<C: 'static + Collector + Clone>(
        &self,
        collector: prometheus::Result<C>,
    ) -> C {
        let collector = collector.expect("invalid metric definition");
        self.registry
            .register(Box::new(collector.clone()))
            .expect("metric registered twice");
        collector
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self {
            registry: prometheus::Registry::new(),
        }
    }
}
