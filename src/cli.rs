// bucket_ingestor/src/cli.rs
// Command Line Interface (CLI) specific logic for bucket_ingestor.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::s3::S3Config;

/// Periodically ingests new objects from a bucket into a document store.
#[derive(Parser, Debug,)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// The document store to ingest into, or an inventory query.
    #[clap(subcommand)]
    pub command: Commands,

    /// Number of objects processed concurrently within a cycle.
    #[clap(short, long, default_value_t = crate::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Seconds between two scans of the object store.
    #[clap(long, env = "INGEST_INTERVAL_SECS", default_value_t = crate::DEFAULT_INTERVAL_SECS)]
    pub interval_secs: u64,

    /// Run a single cycle and exit instead of scheduling.
    #[clap(long)]
    pub once: bool,

    /// Write a structured summary of every cycle to ingestion_report.json.
    #[clap(long)]
    pub report: bool,

    /// Location of the inventory of already ingested objects.
    #[clap(long, env = "INVENTORY_PATH", default_value = crate::DEFAULT_INVENTORY_PATH)]
    pub inventory: PathBuf,

    /// Storage format of the inventory.
    #[clap(long, value_enum, env = "INVENTORY_BACKEND", default_value_t = InventoryKind::Log)]
    pub inventory_backend: InventoryKind,

    /// Directory for temporary copies of fetched objects (system temp dir by default).
    #[clap(long, env = "STAGING_DIR")]
    pub staging_dir: Option<PathBuf,>,

    /// Directory receiving ingestor.log.
    #[clap(long, env = "LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum,)]
pub enum InventoryKind {
    /// Append-only JSON lines file.
    Log,
    /// SQLite database file.
    Sqlite,
}

#[derive(Parser, Debug,)]
pub enum Commands {
    /// Ingest into MongoDB
    Mongo(MongoArgs,),
    /// Ingest into SQLite
    Sqlite(SqliteArgs,),
    /// Print the committed inventory as JSON lines
    Inventory,
}

#[derive(Parser, Debug,)]
pub struct SourceArgs {
    /// Bucket to watch
    #[clap(long, env = "S3_BUCKET", required_unless_present = "source_dir", conflicts_with = "source_dir")]
    pub bucket: Option<String,>,

    /// Only consider keys under this prefix
    #[clap(long, env = "S3_PREFIX")]
    pub prefix: Option<String,>,

    /// Region of the bucket
    #[clap(long, env = "AWS_REGION")]
    pub region: Option<String,>,

    /// Custom endpoint for S3-compatible stores (e.g. MinIO)
    #[clap(long, env = "S3_ENDPOINT", value_parser = parse_endpoint)]
    pub endpoint: Option<String,>,

    /// Use path-style addressing (required by most S3-compatible stores)
    #[clap(long, env = "S3_PATH_STYLE")]
    pub path_style: bool,

    /// Watch a local directory instead of a bucket
    #[clap(long, env = "SOURCE_DIR")]
    pub source_dir: Option<PathBuf,>,
}

impl SourceArgs {
    /// S3 settings when a bucket was given. Credentials come from the
    /// standard AWS environment/profile chain.
    pub fn s3_config(&self,) -> Option<S3Config,> {
        self.bucket.as_ref().map(|bucket| S3Config {
            bucket:     bucket.clone(),
            prefix:     self.prefix.clone(),
            region:     self.region.clone(),
            endpoint:   self.endpoint.clone(),
            path_style: self.path_style,
            access_key: None,
            secret_key: None,
        },)
    }
}

/// Accepts only absolute http(s) URLs.
fn parse_endpoint(s: &str,) -> Result<String, String,> {
    let url = Url::parse(s,).map_err(|e| format!("invalid endpoint `{}`: {}", s, e),)?;
    match url.scheme() {
        "http" | "https" => Ok(s.trim_end_matches('/',).to_string(),),
        other => Err(format!("unsupported endpoint scheme `{}`", other),),
    }
}

#[derive(Parser, Debug,)]
pub struct MongoArgs {
    /// Connection string for MongoDB
    #[clap(long, env = "MONGO_URI")]
    pub uri:      String,
    /// Database receiving the collections
    #[clap(long, env = "MONGO_DATABASE", default_value = crate::DEFAULT_DATABASE_NAME)]
    pub database: String,

    #[clap(flatten)]
    pub source: SourceArgs,
}

#[derive(Parser, Debug,)]
pub struct SqliteArgs {
    /// Path to the SQLite database file
    #[clap(long, env = "SQLITE_DB_PATH")]
    pub db_path: String,

    #[clap(flatten)]
    pub source: SourceArgs,
}
