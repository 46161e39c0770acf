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
//! Observability crate for logging and prometheus metrics.

use std::{
    io::IsTerminal,
    path::Path,
    sync::{Arc, Mutex},
};

use http::Request;
use rand::{RngCore, SeedableRng, rng};
use rand_chacha::ChaChaRng;
use thiserror::Error;
use tower_http::{
    LatencyUnit,
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{DefaultOnFailure, DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{EnvFilter, Registry, fmt::time::UtcTime, prelude::*};

pub mod metrics;

/// Environment variable to define the log level.
pub const LOG_LEVEL_ENV: &str = "RUST_LOG";

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum TracingSetupError {
    /// A global subscriber was installed before.
    #[error("global tracing subscriber already set: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Setup logging using the tracing library.
///
/// # Arguments
///
/// * `log_dir`: If provided, bunyan formatted JSON logs are written to a file that carries the
///   name of the current executable in this directory.
/// * `log_to_stderr`: If true, human readable logs are additionally printed to stderr.
///
/// The returned guards flush the non-blocking writers when dropped and must be
/// kept alive for the lifetime of the process.
pub fn setup_tracing<P: AsRef<Path>>(
    log_dir: Option<P>,
    log_to_stderr: bool,
) -> Result<Vec<WorkerGuard>, TracingSetupError> {
    let mut guards = vec![];
    let mut layers = vec![JsonStorageLayer.boxed()];

    if let Some(log_dir) = log_dir {
        let exec_name = exec_name();
        let log_file =
            tracing_appender::rolling::never(log_dir.as_ref(), format!("{exec_name}.log"));
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(log_file);
        let file_logger = BunyanFormattingLayer::new(exec_name, non_blocking_writer)
            .with_filter(log_level_filter());
        layers.push(file_logger.boxed());
        guards.push(file_guard);
    }

    if log_to_stderr {
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        let stderr_logger = tracing_subscriber::fmt::layer()
            // Enable colors if the stderr is a terminal.
            .with_ansi(std::io::stderr().is_terminal())
            .with_timer(UtcTime::rfc_3339())
            .with_writer(non_blocking_writer)
            .with_filter(log_level_filter());
        layers.push(stderr_logger.boxed());
        guards.push(guard);
    }

    let subscriber = Registry::default().with(layers);
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!("Logging initialized!");
    Ok(guards)
}

fn log_level_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Trace layer that logs at info level and uses random span ids.
pub fn info_trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RandomSpans> {
    let lvl = tracing::Level::INFO;
    let trace_id_seed = rng().next_u64();
    let latency_unit = LatencyUnit::Micros;

    TraceLayer::new_for_http()
        .make_span_with(RandomSpans::new(trace_id_seed))
        .on_failure(
            DefaultOnFailure::new()
                .latency_unit(latency_unit)
                .level(lvl),
        )
        .on_response(
            DefaultOnResponse::new()
                .latency_unit(latency_unit)
                .level(lvl),
        )
}

/// Random span generator.
#[derive(Clone)]
pub struct RandomSpans {
    ids: Arc<Mutex<ChaChaRng>>,
}

impl RandomSpans {
    fn new(seed: u64) -> Self {
        Self {
            ids: Arc::new(Mutex::new(ChaChaRng::seed_from_u64(seed))),
        }
    }

    fn next_id(&self) -> u64 {
        match self.ids.lock() {
            Ok(mut ids) => ids.next_u64(),
            Err(poisoned) => poisoned.into_inner().next_u64(),
        }
    }
}

impl<B> MakeSpan<B> for RandomSpans {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let span_id = format!("{:016x}", self.next_id());
        tracing::span!(
            tracing::Level::INFO,
            "request",
            span_id = span_id,
            method = %request.method(),
            rpc = %request.uri().path(),
            version = ?request.version(),
        )
    }
}

/// Name of the executable that is currently running.
fn exec_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
