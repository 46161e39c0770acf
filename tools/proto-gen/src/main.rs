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
// limitations under the License.'
//! Compiles the registry protobuf definitions to the checked-in Rust code.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Compiles and updates the protobuf files in the source tree.
    Update,
    /// Checks if the generated protobuf files are up-to-date.
    Check,
}

const REGISTRY_PROTO_ROOT: &str = "registry/registry-protobuf/protobuf";
const REGISTRY_SRC_DIR: &str = "registry/registry-protobuf/src/proto";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Update => run_update(),
        Commands::Check => run_check(),
    }
}

/// ## `update` subcommand logic
///
/// Compiles the protobuf definitions straight into the source tree.
fn run_update() -> anyhow::Result<()> {
    println!("Updating generated protobuf files...");

    fs::create_dir_all(REGISTRY_SRC_DIR)?;
    compile_registry_protobuf(Path::new(REGISTRY_SRC_DIR))?;

    println!("Protobuf files updated successfully.");
    Ok(())
}

/// ## `check` subcommand logic
///
/// Compiles the protobuf definitions to a temporary directory and compares
/// the result with the files in the source tree.
fn run_check() -> anyhow::Result<()> {
    println!("Checking if generated protobuf files are up-to-date...");

    let temp_dir = tempfile::Builder::new()
        .prefix("proto-gen-check-")
        .tempdir()?;
    let temp_registry_dir = temp_dir.path().join("registry");
    fs::create_dir_all(&temp_registry_dir)?;

    compile_registry_protobuf(&temp_registry_dir)?;

    let diffs = compare_dirs(&temp_registry_dir, Path::new(REGISTRY_SRC_DIR))?;
    if diffs.is_empty() {
        println!("Protobuf files are up-to-date.");
        Ok(())
    } else {
        println!("Found differences in the following generated files:");
        for file in &diffs {
            println!("  - {}", file.display());
        }
        bail!(
            "Generated protobuf files are out of date. Please run the update command:\n. cargo run -p proto-gen -- update"
        )
    }
}

/// Returns the source files that differ from their generated counterpart,
/// including files present on only one side.
fn compare_dirs(gen_dir: &Path, src_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let generated = relative_files(gen_dir)?;
    let checked_in = relative_files(src_dir)?;

    let mut differences = Vec::new();
    for relative in generated.union(&checked_in) {
        let gen_content = fs::read(gen_dir.join(relative)).ok();
        let src_content = fs::read(src_dir.join(relative)).ok();
        if gen_content.is_none() || gen_content != src_content {
            differences.push(src_dir.join(relative));
        }
    }
    differences.sort();
    Ok(differences)
}

fn relative_files(dir: &Path) -> anyhow::Result<HashSet<PathBuf>> {
    if !dir.exists() {
        return Ok(HashSet::new());
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| -> anyhow::Result<PathBuf> {
            Ok(entry.path().strip_prefix(dir)?.to_path_buf())
        })
        .collect()
}

fn compile_registry_protobuf(out_dir: &Path) -> anyhow::Result<()> {
    let proto_files = get_proto_files(REGISTRY_PROTO_ROOT)?;
    prost_build::Config::new()
        .out_dir(out_dir)
        .protoc_arg("--experimental_allow_proto3_optional")
        .compile_protos(&proto_files, &[REGISTRY_PROTO_ROOT])
        .context("failed to compile registry-protobuf")?;
    Ok(())
}

fn get_proto_files(proto_root: &str) -> anyhow::Result<Vec<String>> {
    let mut proto_files: Vec<String> = walkdir::WalkDir::new(proto_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "proto")
        })
        .map(|e| e.path().display().to_string())
        .collect();
    proto_files.sort();
    Ok(proto_files)
}
