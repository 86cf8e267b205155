// bucket_ingestor/src/ingestor.rs
// Document store seam and its configuration.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// Connection settings for a document store adapter.
#[derive(Debug, Clone,)]
pub struct IngestorConfig {
    pub database_url:  String,
    pub database_name: Option<String,>,
}

/// One parsed document on its way to a collection.
#[derive(Debug, Clone, PartialEq,)]
pub struct IngestedRecord {
    pub collection_name: String,
    pub payload:         Map<String, Value,>,
}

/// Trait for all document store adapters.
#[async_trait]
pub trait DocumentStoreClient: Send + Sync {
    /// Inserts the payload into `record.collection_name` and returns the id the
    /// store assigned to it. Failures map to `IngestorError::StoreWriteError`.
    async fn insert(&self, record: IngestedRecord,) -> Result<String,>;
}
