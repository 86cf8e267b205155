// bucket_ingestor/src/main.rs
// Entry point: wires the clients, inventory, pipeline and scheduler together.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bucket_ingestor::cli::{Cli, Commands, InventoryKind, SourceArgs};
use bucket_ingestor::error::{IngestorError, Result};
use bucket_ingestor::ingestor::{DocumentStoreClient, IngestorConfig};
use bucket_ingestor::inventory::{InventoryBackend, InventoryTracker, LogFileBackend, SqliteBackend};
use bucket_ingestor::local::LocalDirStore;
use bucket_ingestor::mongo::MongoDocumentStore;
use bucket_ingestor::object_store::ObjectStoreClient;
use bucket_ingestor::pipeline::{IngestionPipeline, PipelineConfig};
use bucket_ingestor::s3::S3ObjectStore;
use bucket_ingestor::scheduler::Scheduler;
use bucket_ingestor::sqlite::SqliteDocumentStore;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(),> {
    let cli = Cli::parse();

    // Initialize tracing
    let file_appender = tracing_appender::rolling::never(&cli.log_dir, "ingestor.log",);
    let (non_blocking, _guard,) = tracing_appender::non_blocking(file_appender,);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info",),),)
        .with(fmt::layer().with_writer(std::io::stderr,),)
        .with(fmt::layer().with_writer(non_blocking,).with_ansi(false,),)
        .init();

    let inventory = Arc::new(open_inventory(&cli,).await?,);

    let res = match &cli.command {
        Commands::Mongo(args,) => {
            let config = IngestorConfig {
                database_url:  args.uri.clone(),
                database_name: Some(args.database.clone(),),
            };
            handle_ingestion(&cli, &args.source, MongoDocumentStore::new(config,), inventory,).await
        },
        Commands::Sqlite(args,) => {
            let config = IngestorConfig {
                database_url:  args.db_path.clone(),
                database_name: None,
            };
            handle_ingestion(&cli, &args.source, SqliteDocumentStore::new(config,), inventory,).await
        },
        Commands::Inventory => print_inventory(&inventory,).await,
    };

    if let Err(e,) = &res {
        error!("Ingestor exited with error: {}", e);
    }
    res
}

async fn open_inventory(cli: &Cli,) -> Result<InventoryTracker,> {
    let backend: Arc<dyn InventoryBackend,> = match cli.inventory_backend {
        InventoryKind::Log => Arc::new(LogFileBackend::new(&cli.inventory,),),
        InventoryKind::Sqlite => Arc::new(SqliteBackend::open(&cli.inventory,).await?,),
    };
    InventoryTracker::open(backend,).await
}

async fn open_source(source: &SourceArgs,) -> Result<Arc<dyn ObjectStoreClient,>,> {
    if let Some(config,) = source.s3_config() {
        return Ok(Arc::new(S3ObjectStore::new(config,).await?,),);
    }
    match &source.source_dir {
        Some(dir,) => Ok(Arc::new(LocalDirStore::new(dir,),),),
        None => Err(IngestorError::ConfigurationError(
            "Either --bucket or --source-dir is required".to_string(),
        ),),
    }
}

async fn handle_ingestion<T, F,>(
    cli: &Cli,
    source: &SourceArgs,
    documents: F,
    inventory: Arc<InventoryTracker,>,
) -> Result<(),>
where
    T: DocumentStoreClient + 'static,
    F: Future<Output = Result<T,>,>,
{
    let store = open_source(source,).await?;
    let documents: Arc<dyn DocumentStoreClient,> = Arc::new(documents.await?,);

    let config = PipelineConfig {
        concurrency: cli.concurrency,
        staging_dir: cli.staging_dir.clone(),
        report_path: cli.report.then(|| bucket_ingestor::DEFAULT_REPORT_PATH.into(),),
    };
    let report_path = config.report_path.clone();
    let pipeline = Arc::new(IngestionPipeline::new(store, documents, inventory, config,),);

    if cli.once {
        let report = pipeline.run_cycle().await?;
        if let Some(path,) = &report_path {
            report.save(path,)?;
        }
        return Ok((),);
    }

    let scheduler = Scheduler::start(Duration::from_secs(cli.interval_secs,), pipeline,)?;
    wait_for_shutdown().await;
    info!("Shutdown signal received");
    scheduler.stop().await;
    Ok((),)
}

async fn print_inventory(inventory: &InventoryTracker,) -> Result<(),> {
    for entry in inventory.entries().await {
        let line = serde_json::to_string(&entry,)
            .map_err(|e| IngestorError::Other(format!("Failed to encode entry: {}", e),),)?;
        println!("{}", line);
    }
    Ok((),)
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate(),) {
        Ok(mut term,) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = term.recv() => {},
            }
        },
        Err(e,) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        },
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
