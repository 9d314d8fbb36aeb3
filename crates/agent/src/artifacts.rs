// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact upload with bounded retry and a per-file checksum manifest.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::runtime::Handle;

/// Name of the checksum manifest posted after every upload.
pub const CHECKSUM_MANIFEST: &str = "drover-checksums.properties";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact source {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upload to {url} rejected with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("giving up on {dest} after {attempts} attempts")]
    RetriesExhausted { dest: String, attempts: u32 },
}

/// Receives human-readable progress and failure lines for a build console.
pub trait ConsoleSink: Send + Sync {
    fn console_line(&self, line: &str);
}

/// Moves bytes to the artifact store. Returns the HTTP status.
#[async_trait]
pub trait ArtifactTransport: Send + Sync + 'static {
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<u16, ArtifactError>;
}

/// Uploads from the (blocking) job thread.
pub trait ArtifactUploader: Send + Sync {
    fn upload_blocking(
        &self,
        console: &dyn ConsoleSink,
        source: &Path,
        dest: &str,
        build_id: &str,
    ) -> Result<(), ArtifactError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactTransport for HttpTransport {
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<u16, ArtifactError> {
        let response = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| ArtifactError::Transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

pub struct ArtifactsRepository<T: ArtifactTransport> {
    transport: T,
    base_url: String,
    max_attempts: u32,
    runtime: Handle,
}

impl<T: ArtifactTransport> ArtifactsRepository<T> {
    pub fn new(transport: T, base_url: impl Into<String>, max_attempts: u32, runtime: Handle) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_attempts: max_attempts.max(1),
            runtime,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload `source` (a file or a directory tree) under `dest`, then post
    /// the checksum manifest keyed by destination-relative path.
    pub async fn upload(
        &self,
        console: &dyn ConsoleSink,
        source: &Path,
        dest: &str,
        build_id: &str,
    ) -> Result<(), ArtifactError> {
        let files = collect_files(source)?;
        let mut checksums = BTreeMap::new();
        for (path, relative) in files {
            let body = tokio::fs::read(&path)
                .await
                .map_err(|source| ArtifactError::Io { path: path.clone(), source })?;
            let key = join_dest(dest, &relative);
            checksums.insert(key.clone(), sha256_hex(&body));
            self.put_with_retry(console, build_id, &key, body).await?;
        }

        let manifest: String = checksums.iter().map(|(k, v)| format!("{}={}\n", k, v)).collect();
        self.put_with_retry(console, build_id, CHECKSUM_MANIFEST, manifest.into_bytes()).await
    }

    async fn put_with_retry(
        &self,
        console: &dyn ConsoleSink,
        build_id: &str,
        dest: &str,
        body: Vec<u8>,
    ) -> Result<(), ArtifactError> {
        let url = format!("{}/{}/{}", self.base_url, build_id, dest);
        for attempt in 1..=self.max_attempts {
            let attempt_url = format!("{}?attempt={}", url, attempt);
            match self.transport.put(&attempt_url, body.clone()).await {
                Ok(status) if (200..300).contains(&status) => {
                    tracing::debug!(%dest, attempt, "artifact uploaded");
                    return Ok(());
                }
                Ok(status) if status >= 500 => {
                    tracing::warn!(%dest, attempt, status, "artifact upload failed, retrying");
                }
                Ok(status) => {
                    console.console_line(&format!(
                        "[drover] Failed to upload {}: server responded {}",
                        dest, status
                    ));
                    return Err(ArtifactError::Rejected { url, status });
                }
                Err(e) => {
                    tracing::warn!(%dest, attempt, error = %e, "artifact upload failed, retrying");
                }
            }
        }

        console.console_line(&format!(
            "[drover] Failed to upload {} after {} attempts",
            dest, self.max_attempts
        ));
        Err(ArtifactError::RetriesExhausted { dest: dest.to_string(), attempts: self.max_attempts })
    }
}

impl<T: ArtifactTransport> ArtifactUploader for ArtifactsRepository<T> {
    fn upload_blocking(
        &self,
        console: &dyn ConsoleSink,
        source: &Path,
        dest: &str,
        build_id: &str,
    ) -> Result<(), ArtifactError> {
        self.runtime.block_on(self.upload(console, source, dest, build_id))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{:02x}", b)).collect()
}

/// Files under `source` with their `/`-separated paths relative to it. A
/// plain file is returned with its own file name.
fn collect_files(source: &Path) -> Result<Vec<(PathBuf, String)>, ArtifactError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArtifactError::Io { path, source }
    };
    if !source.exists() {
        return Err(ArtifactError::SourceMissing(source.to_path_buf()));
    }
    if source.is_file() {
        let name = source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        return Ok(vec![(source.to_path_buf(), name)]);
    }

    let mut files = Vec::new();
    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(io(&dir))? {
            let path = entry.map_err(io(&dir))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(source) {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path.clone(), relative));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn join_dest(dest: &str, relative: &str) -> String {
    let dest = dest.trim_matches('/');
    if dest.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", dest, relative)
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
