// bucket_ingestor/src/inventory/sqlite.rs
// SQLite-backed inventory key set.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::task;

use super::{InventoryBackend, InventoryEntry};
use crate::error::{IngestorError, Result};

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection,>,>,
}

impl SqliteBackend {
    pub async fn open(path: impl AsRef<Path,>,) -> Result<Self,> {
        let path = path.as_ref().to_path_buf();
        let conn = task::spawn_blocking(move || -> rusqlite::Result<Connection,> {
            let conn = Connection::open(path,)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS inventory (
                    identifier  TEXT PRIMARY KEY,
                    ingested_at TEXT NOT NULL
                )",
                [],
            )?;
            Ok(conn,)
        },)
        .await
        .map_err(|e| IngestorError::Other(e.to_string(),),)?
        .map_err(|e| {
            IngestorError::InventoryError(format!("Failed to open SQLite inventory: {}", e),)
        },)?;

        Ok(SqliteBackend {
            conn: Arc::new(Mutex::new(conn,),),
        },)
    }
}

#[async_trait]
impl InventoryBackend for SqliteBackend {
    async fn load_all(&self,) -> Result<Vec<InventoryEntry,>,> {
        let conn_clone = Arc::clone(&self.conn,);
        let rows = task::spawn_blocking(move || -> Result<Vec<(String, String,),>,> {
            let conn = conn_clone
                .lock()
                .map_err(|_| IngestorError::InventoryError("inventory lock poisoned".to_string(),),)?;
            let mut stmt = conn
                .prepare("SELECT identifier, ingested_at FROM inventory",)
                .map_err(|e| IngestorError::InventoryError(e.to_string(),),)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0,)?, row.get(1,)?,),),)
                .map_err(|e| IngestorError::InventoryError(e.to_string(),),)?
                .collect::<rusqlite::Result<Vec<(String, String,),>,>>()
                .map_err(|e| IngestorError::InventoryError(e.to_string(),),)?;
            Ok(rows,)
        },)
        .await
        .map_err(|e| IngestorError::Other(e.to_string(),),)??;

        rows.into_iter()
            .map(|(identifier, ingested_at,)| {
                let ingested_at = DateTime::parse_from_rfc3339(&ingested_at,)
                    .map_err(|e| {
                        IngestorError::InventoryError(format!(
                            "Invalid timestamp for '{}': {}",
                            identifier, e
                        ),)
                    },)?
                    .with_timezone(&Utc,);
                Ok(InventoryEntry {
                    identifier,
                    ingested_at,
                },)
            },)
            .collect()
    }

    async fn append(&self, entry: &InventoryEntry,) -> Result<(),> {
        let conn_clone = Arc::clone(&self.conn,);
        let identifier = entry.identifier.clone();
        let ingested_at = entry.ingested_at.to_rfc3339();

        task::spawn_blocking(move || {
            let conn = conn_clone
                .lock()
                .map_err(|_| IngestorError::InventoryError("inventory lock poisoned".to_string(),),)?;
            conn.execute(
                "INSERT OR IGNORE INTO inventory (identifier, ingested_at) VALUES (?1, ?2)",
                params![identifier, ingested_at],
            )
            .map(|_| (),)
            .map_err(|e| IngestorError::InventoryError(e.to_string(),),)
        },)
        .await
        .map_err(|e| IngestorError::Other(e.to_string(),),)?
    }
}
