// bucket_ingestor/src/inventory/mod.rs
// Durable record of which object identifiers have already been ingested.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::Result;
use crate::object_store::ObjectDescriptor;

pub mod log_file;
pub mod sqlite;

pub use log_file::LogFileBackend;
pub use sqlite::SqliteBackend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct InventoryEntry {
    pub identifier:  String,
    pub ingested_at: DateTime<Utc,>,
}

/// Durable, append-only storage behind the tracker.
#[async_trait]
pub trait InventoryBackend: Send + Sync {
    /// Reads every committed entry. A store that does not exist yet is empty.
    async fn load_all(&self,) -> Result<Vec<InventoryEntry,>,>;

    /// Durably appends one entry. Only returns once the entry survives a restart.
    async fn append(&self, entry: &InventoryEntry,) -> Result<(),>;
}

pub struct InventoryTracker {
    backend:    Arc<dyn InventoryBackend,>,
    known:      RwLock<HashMap<String, DateTime<Utc,>,>,>,
    // Serializes durable appends across concurrent workers.
    commit_lock: Mutex<(),>,
}

impl InventoryTracker {
    /// Rebuilds the known-set from the backend.
    pub async fn open(backend: Arc<dyn InventoryBackend,>,) -> Result<Self,> {
        let entries = backend.load_all().await?;
        let mut known = HashMap::with_capacity(entries.len(),);
        for entry in entries {
            // First commit wins; the set never shrinks or rewrites timestamps.
            known.entry(entry.identifier,).or_insert(entry.ingested_at,);
        }
        info!("Inventory loaded with {} known objects", known.len());

        Ok(Self {
            backend,
            known: RwLock::new(known,),
            commit_lock: Mutex::new((),),
        },)
    }

    pub async fn is_known(&self, identifier: &str,) -> bool {
        self.known.read().await.contains_key(identifier,)
    }

    /// Returns the candidates whose identifier has not been committed, in input
    /// order, with duplicate identifiers collapsed to their first occurrence.
    pub async fn diff(&self, candidates: &[ObjectDescriptor],) -> Vec<ObjectDescriptor,> {
        let known = self.known.read().await;
        let mut seen = HashSet::new();
        candidates
            .iter()
            .filter(|c| !known.contains_key(&c.identifier,),)
            .filter(|c| seen.insert(c.identifier.as_str(),),)
            .cloned()
            .collect()
    }

    /// Records `identifier` as ingested. Returns `false` when it was already known.
    pub async fn commit(&self, identifier: &str,) -> Result<bool,> {
        let _guard = self.commit_lock.lock().await;

        if self.is_known(identifier,).await {
            debug!(identifier, "Inventory commit skipped, already known");
            return Ok(false,);
        }

        let entry = InventoryEntry {
            identifier:  identifier.to_string(),
            ingested_at: Utc::now(),
        };
        self.backend.append(&entry,).await?;
        self.known.write().await.insert(entry.identifier, entry.ingested_at,);
        Ok(true,)
    }

    pub async fn len(&self,) -> usize {
        self.known.read().await.len()
    }

    pub async fn is_empty(&self,) -> bool {
        self.known.read().await.is_empty()
    }

    /// All entries sorted by identifier.
    pub async fn entries(&self,) -> Vec<InventoryEntry,> {
        let known = self.known.read().await;
        let mut entries: Vec<InventoryEntry,> = known
            .iter()
            .map(|(identifier, ingested_at,)| InventoryEntry {
                identifier:  identifier.clone(),
                ingested_at: *ingested_at,
            },)
            .collect();
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier,),);
        entries
    }
}
