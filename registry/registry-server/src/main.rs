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
//! wgd registry binary.

use anyhow::Context;
use clap::Parser;
use wgd_observability::{metrics::registry::MetricsRegistry, setup_tracing};
use wgd_registry::{
    cli::{Commands, Opts},
    config::RegistryConfig,
    runtime::RegistryRuntimeBuilder,
};
use wgd_utils::task_handler::CancelTaskSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let _guards = setup_tracing(opts.logging.log_dir.as_ref(), opts.logging.stderr)
        .context("setting up logging")?;

    match opts.command {
        Commands::Run {
            config,
            listen_addr,
            metrics_addr,
        } => {
            let mut config = RegistryConfig::load(&config).await?;
            if let Some(listen_addr) = listen_addr {
                config.rpc.listen_addr = listen_addr;
            }
            if let Some(metrics_addr) = metrics_addr {
                config.metrics.listen_addr = Some(metrics_addr);
            }
            config.validate()?;

            let mut runtime = RegistryRuntimeBuilder::new(config)
                .with_metrics_registry(MetricsRegistry::new_global())
                .start_with_task_set(CancelTaskSet::new_with_signal_handler())
                .await
                .context("starting registry")?;
            tracing::info!(addr=%runtime.rpc_addr(), "Registry running");
            runtime.join().await.context("registry stopped with error")?;
            tracing::info!("Registry stopped");
        }
        Commands::CheckConfig { config } => {
            let config = RegistryConfig::load(&config).await?;
            println!(
                "Configuration is valid, registry API on {}",
                config.rpc.listen_addr
            );
        }
    }
    Ok(())
}
