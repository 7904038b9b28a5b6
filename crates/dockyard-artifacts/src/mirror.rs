//! Tree mirroring between a local directory and an artifact-store prefix.
//!
//! Both directions fan out one transfer per file and join them. The
//! operation fails if any transfer fails; files already transferred are
//! left in place.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::StreamExt;
use futures::future::join_all;
use object_store::path::Path as ObjectPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ArtifactError, ArtifactResult};
use crate::store::{ArtifactStore, normalize_prefix};

impl ArtifactStore {
    /// Copy every object under `prefix` into `dest`, at its path relative
    /// to `prefix`. Returns the number of files written.
    pub async fn mirror_down(&self, prefix: &str, dest: &Path) -> ArtifactResult<usize> {
        let prefix = normalize_prefix(prefix)?;
        let keys = self.list(&prefix).await?;
        if keys.is_empty() {
            warn!(%prefix, "no objects under prefix");
            return Ok(0);
        }

        tokio::fs::create_dir_all(dest).await?;
        let strip = format!("{prefix}/");
        let transfers = keys.iter().filter_map(|key| {
            let relative = key.strip_prefix(&strip)?;
            let target = local_target(dest, relative);
            Some(self.download(key, target))
        });
        let count = collect_results(join_all(transfers).await)?;

        info!(%prefix, dest = %dest.display(), files = count, "mirrored down");
        Ok(count)
    }

    /// Upload every regular file under `local_dir` to
    /// `prefix/<relative path>`. Returns the number of files uploaded.
    pub async fn mirror_up(&self, local_dir: &Path, prefix: &str) -> ArtifactResult<usize> {
        let prefix = normalize_prefix(prefix)?;
        let files = walk_files(local_dir)?;

        let transfers = files
            .iter()
            .map(|(path, relative)| self.upload(path, format!("{prefix}/{relative}")));
        let count = collect_results(join_all(transfers).await)?;

        info!(%prefix, src = %local_dir.display(), files = count, "mirrored up");
        Ok(count)
    }

    async fn upload(&self, path: &Path, key: String) -> ArtifactResult<()> {
        let data = tokio::fs::read(path).await?;
        self.put(&key, Bytes::from(data)).await
    }

    async fn download(&self, key: &str, target: PathBuf) -> ArtifactResult<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = self
            .backend()
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| ArtifactError::storage(key, e))?;
        let mut stream = result.into_stream();
        let mut file = tokio::fs::File::create(&target).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ArtifactError::storage(key, e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(%key, path = %target.display(), "object downloaded");
        Ok(())
    }
}

fn local_target(dest: &Path, relative: &str) -> PathBuf {
    let mut target = dest.to_path_buf();
    for part in relative.split('/').filter(|p| !p.is_empty()) {
        target.push(part);
    }
    target
}

/// Regular files under `root` paired with their `/`-joined relative path.
fn walk_files(root: &Path) -> ArtifactResult<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ArtifactError::Walk {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.path().to_path_buf(), relative));
    }
    Ok(files)
}

/// Wait for every transfer, then report the first failure if any.
fn collect_results(results: Vec<ArtifactResult<()>>) -> ArtifactResult<usize> {
    let total = results.len();
    let mut failures = results.into_iter().filter_map(Result::err);
    match failures.next() {
        Some(first) => {
            let others = failures.count();
            if others > 0 {
                warn!(failed = others + 1, total, "multiple transfers failed");
            }
            Err(first)
        }
        None => Ok(total),
    }
}
