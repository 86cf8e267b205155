// bucket_ingestor/src/local/mod.rs
// Directory-backed object store, for development and local drops.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::task;
use walkdir::WalkDir;

use crate::error::{IngestorError, Result};
use crate::object_store::{ObjectDescriptor, ObjectStoreClient};

pub const LOCAL_STORAGE_TIER: &str = "LOCAL";

/// Treats every regular file below `root` as an object whose identifier is
/// its `/`-separated path relative to `root`.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf,>,) -> Self {
        Self { root: root.into(), }
    }

    fn resolve(&self, identifier: &str,) -> Result<PathBuf,> {
        let relative = Path::new(identifier,);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        },);
        if identifier.is_empty() || escapes {
            return Err(IngestorError::FetchError(format!(
                "Identifier '{}' does not name a file under {}",
                identifier,
                self.root.display()
            ),),);
        }
        Ok(self.root.join(relative,),)
    }
}

#[async_trait]
impl ObjectStoreClient for LocalDirStore {
    async fn list_all(&self,) -> Result<Vec<ObjectDescriptor,>,> {
        let root = self.root.clone();
        task::spawn_blocking(move || scan_directory(&root,),)
            .await
            .map_err(|e| IngestorError::Other(e.to_string(),),)?
    }

    async fn fetch(&self, identifier: &str,) -> Result<Bytes,> {
        let path = self.resolve(identifier,)?;
        tokio::fs::read(&path,).await.map(Bytes::from,).map_err(|e| {
            IngestorError::FetchError(format!("Failed to read {}: {}", path.display(), e),)
        },)
    }
}

fn scan_directory(root: &Path,) -> Result<Vec<ObjectDescriptor,>,> {
    if !root.is_dir() {
        return Err(IngestorError::StoreUnavailable(format!(
            "Source directory {} does not exist",
            root.display()
        ),),);
    }

    let mut descriptors = Vec::new();
    for entry in WalkDir::new(root,).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestorError::StoreUnavailable(e.to_string(),),)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root,)
            .map_err(|e| IngestorError::Other(e.to_string(),),)?;
        let identifier = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy(),)
            .collect::<Vec<_,>>()
            .join("/",);

        let metadata = entry
            .metadata()
            .map_err(|e| IngestorError::StoreUnavailable(e.to_string(),),)?;
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc,>::from,)
            .unwrap_or_default();

        descriptors.push(ObjectDescriptor {
            identifier,
            last_modified,
            content_hash: file_tag(&last_modified, metadata.len(),),
            size: metadata.len(),
            storage_tier: LOCAL_STORAGE_TIER.to_string(),
        },);
    }
    Ok(descriptors,)
}

/// Change tag derived from modification time and size.
fn file_tag(last_modified: &DateTime<Utc,>, size: u64,) -> String {
    let nanos = last_modified.timestamp_nanos_opt().unwrap_or_else(|| last_modified.timestamp(),);
    format!("{:x}-{:x}", nanos, size)
}
