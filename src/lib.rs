// bucket_ingestor/src/lib.rs
// Public API for the bucket_ingestor crate.

pub mod cli;
pub mod collection;
pub mod error;
pub mod ingestor;
pub mod inventory;
pub mod local;
pub mod mongo;
pub mod object_store;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod s3;
pub mod scheduler;
pub mod sqlite;

pub const DEFAULT_COLLECTION_NAME: &str = "ingested_documents";
pub const DEFAULT_DATABASE_NAME: &str = "ingested";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_INVENTORY_PATH: &str = "inventory.log";
pub const DEFAULT_REPORT_PATH: &str = "ingestion_report.json";
