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
//! JSON file helpers used for configuration and state snapshots.

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

/// Reads a file and deserializes its JSON content.
pub async fn read_file<P, T>(path: P) -> std::io::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let buf = tokio::fs::read(path.as_ref()).await?;
    serde_json::from_slice(&buf).map_err(std::io::Error::other)
}

/// Like [read_file], but returns `None` if the file does not exist.
pub async fn read_file_if_exists<P, T>(path: P) -> std::io::Result<Option<T>>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    match read_file(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Serializes `content` as pretty JSON and replaces the file at `path`.
///
/// The content is written to a sibling temporary file first and then renamed,
/// so readers never observe a partially written file.
pub async fn write_file_atomic(
    path: impl AsRef<Path>,
    content: &impl Serialize,
) -> std::io::Result<()> {
    let path = path.as_ref();
    let buf = serde_json::to_vec_pretty(content).map_err(std::io::Error::other)?;
    let tmp = tmp_sibling(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)
        .await?;
    file.write_all(&buf).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
