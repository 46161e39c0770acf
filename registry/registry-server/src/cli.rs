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
//! Registry CLI options.

use std::{net::SocketAddr, path::PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};

/// wgd VPN registry
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Opts {
    /// Top-level subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// Logging options
    #[command(flatten)]
    pub logging: LoggingOptions,
}

/// Logging options.
#[derive(Debug, Args)]
pub struct LoggingOptions {
    /// Log to stderr.
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    pub stderr: bool,

    /// Directory for the registry log file.
    #[arg(long, global = true, env = "WGD_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the registry.
    Run {
        /// The JSON configuration file.
        #[arg(long, env = "WGD_REGISTRY_CONFIG")]
        config: PathBuf,

        /// Overrides `rpc.listen_addr` of the configuration.
        #[arg(long)]
        listen_addr: Option<SocketAddr>,

        /// Overrides `metrics.listen_addr` of the configuration.
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },
    /// Validate a configuration file and exit.
    CheckConfig {
        /// The JSON configuration file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Opts::command().debug_assert();
    }

    #[test]
    fn parses_run_overrides() {
        let opts = Opts::try_parse_from([
            "wgd-registry",
            "--stderr",
            "false",
            "run",
            "--config",
            "registry.json",
            "--listen-addr",
            "0.0.0.0:6000",
        ])
        .unwrap();
        assert!(!opts.logging.stderr);
        let Commands::Run {
            config,
            listen_addr,
            metrics_addr,
        } = opts.command
        else {
            panic!("expected run");
        };
        assert_eq!(config, PathBuf::from("registry.json"));
        assert_eq!(listen_addr, Some("0.0.0.0:6000".parse().unwrap()));
        assert_eq!(metrics_addr, None);
    }
}
