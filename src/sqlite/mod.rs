// bucket_ingestor/src/sqlite/mod.rs
// SQLite document store adapter: one table per collection, documents as JSON text.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tokio::task;
use tracing::debug;

use crate::error::{IngestorError, Result};
use crate::ingestor::{DocumentStoreClient, IngestedRecord, IngestorConfig};

pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection,>,>,
}

impl SqliteDocumentStore {
    pub async fn new(config: IngestorConfig,) -> Result<Self,> {
        let conn_path = config.database_url.trim_start_matches("sqlite://",).to_string();
        let conn = task::spawn_blocking(move || Connection::open(conn_path,),)
            .await
            .map_err(|e| {
                IngestorError::Other(format!(
                    "Failed to spawn blocking task for SQLite connection: {}",
                    e
                ),)
            },)?
            .map_err(|e| {
                IngestorError::ConnectionError(format!("Failed to connect to SQLite: {}", e),)
            },)?;

        Ok(SqliteDocumentStore {
            conn: Arc::new(Mutex::new(conn,),),
        },)
    }
}

#[async_trait]
impl DocumentStoreClient for SqliteDocumentStore {
    async fn insert(&self, record: IngestedRecord,) -> Result<String,> {
        let table = quote_identifier(&record.collection_name,);
        let json_data = serde_json::to_string(&record.payload,)
            .map_err(|e| IngestorError::StoreWriteError(e.to_string(),),)?;

        let conn_clone = Arc::clone(&self.conn,);
        let row_id = task::spawn_blocking(move || -> Result<i64,> {
            let conn = conn_clone
                .lock()
                .map_err(|_| IngestorError::StoreWriteError("connection lock poisoned".to_string(),),)?;
            let create_table_query = format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    data TEXT NOT NULL
                )",
                table
            );
            conn.execute(&create_table_query, [],)
                .map_err(|e| IngestorError::StoreWriteError(e.to_string(),),)?;

            let insert_query = format!("INSERT INTO {} (data) VALUES (?1)", table);
            conn.execute(&insert_query, params![json_data],)
                .map_err(|e| IngestorError::StoreWriteError(e.to_string(),),)?;
            Ok(conn.last_insert_rowid(),)
        },)
        .await
        .map_err(|e| IngestorError::Other(e.to_string(),),)??;

        debug!(collection = %record.collection_name, row_id, "Inserted document into SQLite");
        Ok(row_id.to_string(),)
    }
}

/// Quotes a collection name for use as a SQLite table name.
pub fn quote_identifier(name: &str,) -> String {
    format!("`{}`", name.replace('`', "``",),)
}
