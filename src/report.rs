// bucket_ingestor/src/report.rs
// Per-cycle summary, optionally persisted as JSON.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{IngestorError, Result};

#[derive(Debug, Clone, Serialize,)]
pub struct ObjectFailure {
    pub identifier: String,
    pub kind:       String,
    pub error:      String,
}

#[derive(Debug, Clone, Serialize,)]
pub struct CycleReport {
    pub cycle_id:    Uuid,
    pub started_at:  DateTime<Utc,>,
    pub finished_at: Option<DateTime<Utc,>,>,
    /// Objects returned by the store listing.
    pub listed:      usize,
    /// Objects not yet in the inventory when the cycle started.
    pub new_objects: usize,
    pub ingested:    usize,
    pub failed:      usize,
    /// New objects left untouched because shutdown was requested.
    pub deferred:    usize,
    pub errors:      Vec<ObjectFailure,>,
}

impl CycleReport {
    pub fn begin(cycle_id: Uuid,) -> Self {
        Self {
            cycle_id,
            started_at: Utc::now(),
            finished_at: None,
            listed: 0,
            new_objects: 0,
            ingested: 0,
            failed: 0,
            deferred: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_success(&mut self,) {
        self.ingested += 1;
    }

    pub fn record_error(&mut self, identifier: &str, err: &IngestorError,) {
        self.failed += 1;
        self.errors.push(ObjectFailure {
            identifier: identifier.to_string(),
            kind:       err.kind().to_string(),
            error:      err.to_string(),
        },);
    }

    pub fn finish(&mut self,) {
        self.finished_at = Some(Utc::now(),);
    }

    pub fn save(&self, path: &Path,) -> Result<(),> {
        let json = serde_json::to_string_pretty(self,).map_err(|e| {
            IngestorError::Other(format!("Failed to serialize cycle report: {}", e),)
        },)?;
        std::fs::write(path, json,).map_err(|e| {
            IngestorError::Other(format!("Failed to write {}: {}", path.display(), e),)
        },)?;
        info!("Cycle report saved to {}", path.display());
        Ok((),)
    }
}
