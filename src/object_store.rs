// bucket_ingestor/src/object_store.rs
// Object store listing/fetch seam.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Snapshot of one remote object as seen at list time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct ObjectDescriptor {
    pub identifier:    String,
    pub last_modified: DateTime<Utc,>,
    pub content_hash:  String,
    pub size:          u64,
    pub storage_tier:  String,
}

/// Read-only access to the bucket (or directory) being watched.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Lists every object currently in the store. Any failure must surface as
    /// `IngestorError::StoreUnavailable`.
    async fn list_all(&self,) -> Result<Vec<ObjectDescriptor,>,>;

    /// Downloads the full content of one object.
    async fn fetch(&self, identifier: &str,) -> Result<Bytes,>;
}
