//! Handing finished artifacts to their destination

use crate::assemble::{Artifact, ArtifactKind};
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub filename: String,
    pub kind: ArtifactKind,
    pub page_count: usize,
    pub bytes: usize,
    /// Location on disk, for file-based delivery
    pub path: Option<PathBuf>,
    /// Hex SHA-256 of the delivered bytes
    pub fingerprint: String,
}

impl DeliveryReceipt {
    fn for_artifact(artifact: &Artifact, path: Option<PathBuf>) -> Self {
        Self {
            filename: artifact.filename.clone(),
            kind: artifact.kind,
            page_count: artifact.page_count,
            bytes: artifact.bytes.len(),
            path,
            fingerprint: artifact.fingerprint(),
        }
    }
}

/// Destination for finished artifacts.
pub trait Delivery: Send + Sync {
    fn deliver<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<DeliveryReceipt>>;
}

/// Writes artifacts into a directory, creating it when missing.
#[derive(Debug, Clone)]
pub struct FileDelivery {
    dir: PathBuf,
}

impl FileDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

impl Delivery for FileDelivery {
    fn deliver<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<DeliveryReceipt>> {
        Box::pin(async move {
            if artifact.filename.contains(['/', '\\']) || artifact.filename.is_empty() {
                return Err(Error::DeliveryError(format!(
                    "refusing to write artifact named '{}'",
                    artifact.filename
                )));
            }
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.dir.join(&artifact.filename);
            let partial = self.dir.join(format!(".{}.part", artifact.filename));

            // Only complete files ever appear under the final name
            let written = match tokio::fs::write(&partial, &artifact.bytes).await {
                Ok(()) => tokio::fs::rename(&partial, &path).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    log::debug!("could not remove {}: {}", partial.display(), cleanup);
                }
                return Err(Error::DeliveryError(format!("writing {}: {}", path.display(), e)));
            }
            Ok(DeliveryReceipt::for_artifact(artifact, Some(path)))
        })
    }
}

/// Keeps delivered artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDelivery {
    delivered: Arc<Mutex<Vec<Artifact>>>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.delivered.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Delivery for MemoryDelivery {
    fn deliver<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<DeliveryReceipt>> {
        Box::pin(async move {
            self.delivered
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(artifact.clone());
            Ok(DeliveryReceipt::for_artifact(artifact, None))
        })
    }
}
