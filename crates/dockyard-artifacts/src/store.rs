//! ArtifactStore: object storage accessor for source trees and published
//! build output.
//!
//! Wraps an `object_store` backend (S3, local filesystem, or in-memory) and
//! addresses objects by plain `/`-separated keys such as
//! `dist/<id>/index.html`.

use std::sync::Arc;

use bytes::Bytes;
use dockyard_core::config::{ArtifactBackend, ArtifactsConfig};
use futures::TryStreamExt;
use futures::future::join_all;
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use tracing::{debug, info};

use crate::error::{ArtifactError, ArtifactResult};

#[derive(Clone)]
pub struct ArtifactStore {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactStore {
    /// Build the backend named in the `[artifacts]` config section.
    pub fn from_config(config: &ArtifactsConfig) -> ArtifactResult<Self> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            ArtifactBackend::Memory => Arc::new(InMemory::new()),
            ArtifactBackend::Local => {
                std::fs::create_dir_all(&config.path)?;
                let local = object_store::local::LocalFileSystem::new_with_prefix(&config.path)
                    .map_err(|e| ArtifactError::Config(format!("local store: {e}")))?;
                Arc::new(local)
            }
            ArtifactBackend::S3 => {
                use object_store::aws::AmazonS3Builder;
                // Credentials and defaults come from the AWS_* environment.
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                let s3 = builder
                    .build()
                    .map_err(|e| ArtifactError::Config(format!("S3 store: {e}")))?;
                Arc::new(s3)
            }
        };
        info!(backend = ?config.backend, "artifact store ready");
        Ok(Self { store })
    }

    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Ephemeral store for tests.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(InMemory::new()))
    }

    /// Every key under `prefix`, sorted.
    pub async fn list(&self, prefix: &str) -> ArtifactResult<Vec<String>> {
        let prefix = normalize_prefix(prefix)?;
        let location = ObjectPath::from(prefix.as_str());
        let metas: Vec<_> = self
            .store
            .list(Some(&location))
            .try_collect()
            .await
            .map_err(|e| ArtifactError::storage(prefix.as_str(), e))?;

        let mut keys: Vec<String> = metas.into_iter().map(|m| m.location.to_string()).collect();
        keys.sort();
        Ok(keys)
    }

    pub async fn get(&self, key: &str) -> ArtifactResult<Bytes> {
        let location = ObjectPath::from(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| ArtifactError::storage(key, e))?;
        result
            .bytes()
            .await
            .map_err(|e| ArtifactError::storage(key, e))
    }

    pub async fn put(&self, key: &str, data: Bytes) -> ArtifactResult<()> {
        let location = ObjectPath::from(key);
        let size = data.len();
        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| ArtifactError::storage(key, e))?;
        debug!(%key, size, "object stored");
        Ok(())
    }

    /// Recursively delete everything under `prefix`. Returns the number of
    /// objects removed; an empty prefix subtree is not an error.
    pub async fn delete_prefix(&self, prefix: &str) -> ArtifactResult<usize> {
        let keys = self.list(prefix).await?;
        let deletions = keys.iter().map(|key| async move {
            let location = ObjectPath::from(key.as_str());
            match self.store.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(ArtifactError::storage(key.as_str(), e)),
            }
        });
        join_all(deletions)
            .await
            .into_iter()
            .collect::<ArtifactResult<Vec<()>>>()?;

        info!(%prefix, deleted = keys.len(), "prefix deleted");
        Ok(keys.len())
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

/// Strip surrounding slashes; an empty result would address the whole
/// bucket and is rejected.
pub(crate) fn normalize_prefix(prefix: &str) -> ArtifactResult<String> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ArtifactError::InvalidPrefix(prefix.to_string()));
    }
    Ok(trimmed.to_string())
}
