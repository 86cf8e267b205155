// bucket_ingestor/src/pipeline.rs
// One list -> diff -> fetch -> parse -> insert -> commit pass over the store.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::collection::derive_collection_name;
use crate::error::{IngestorError, Result};
use crate::ingestor::{DocumentStoreClient, IngestedRecord};
use crate::inventory::InventoryTracker;
use crate::object_store::{ObjectDescriptor, ObjectStoreClient};
use crate::parser::parse_document;
use crate::report::CycleReport;
use crate::scheduler::{CycleJob, ShutdownSignal};

#[derive(Debug, Clone,)]
pub struct PipelineConfig {
    /// Maximum number of objects processed at once within a cycle.
    pub concurrency: usize,
    /// Where fetched objects are staged; the system temp dir when `None`.
    pub staging_dir: Option<PathBuf,>,
    /// Write every cycle's report here when set.
    pub report_path: Option<PathBuf,>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: crate::DEFAULT_CONCURRENCY,
            staging_dir: None,
            report_path: None,
        }
    }
}

pub struct IngestionPipeline {
    worker:         ObjectWorker,
    config:         PipelineConfig,
    parse_failures: Mutex<HashMap<String, u32,>,>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ObjectStoreClient,>,
        documents: Arc<dyn DocumentStoreClient,>,
        inventory: Arc<InventoryTracker,>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            worker: ObjectWorker {
                store,
                documents,
                inventory,
                staging_dir: config.staging_dir.clone(),
            },
            config,
            parse_failures: Mutex::new(HashMap::new(),),
        }
    }

    pub fn inventory(&self,) -> &Arc<InventoryTracker,> {
        &self.worker.inventory
    }

    /// Consecutive cycles in which `identifier` failed to parse.
    pub async fn parse_failure_streak(&self, identifier: &str,) -> u32 {
        self.parse_failures.lock().await.get(identifier,).copied().unwrap_or(0,)
    }

    pub async fn run_cycle(&self,) -> Result<CycleReport,> {
        self.run_cycle_with(ShutdownSignal::never(),).await
    }

    /// Runs one cycle. Once `shutdown` fires no further objects are started;
    /// objects already in flight complete their insert and commit.
    pub async fn run_cycle_with(&self, shutdown: ShutdownSignal,) -> Result<CycleReport,> {
        let cycle_id = Uuid::new_v4();
        self.cycle(cycle_id, shutdown,)
            .instrument(info_span!("cycle", %cycle_id),)
            .await
    }

    async fn cycle(&self, cycle_id: Uuid, shutdown: ShutdownSignal,) -> Result<CycleReport,> {
        let mut report = CycleReport::begin(cycle_id,);

        let listed = self.worker.store.list_all().await.map_err(|e| match e {
            IngestorError::StoreUnavailable(_,) => e,
            other => IngestorError::StoreUnavailable(other.to_string(),),
        },)?;
        report.listed = listed.len();

        let pending = self.worker.inventory.diff(&listed,).await;
        report.new_objects = pending.len();

        // Drop streaks for objects that are no longer pending.
        {
            let pending_ids: HashSet<&str,> = pending.iter().map(|d| d.identifier.as_str(),).collect();
            self.parse_failures
                .lock()
                .await
                .retain(|identifier, _| pending_ids.contains(identifier.as_str(),),);
        }

        if pending.is_empty() {
            info!("No new objects among {} listed", listed.len());
            report.finish();
            return Ok(report,);
        }

        info!(
            "Found {} new objects among {} listed, concurrency {}",
            pending.len(),
            listed.len(),
            self.config.concurrency
        );

        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<task::Id, String,> = HashMap::new();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1,),),);
        let mut queue = pending.into_iter();

        while let Some(descriptor,) = queue.next() {
            if shutdown.is_triggered() {
                report.deferred = 1 + queue.len();
                break;
            }
            let permit = Arc::clone(&semaphore,)
                .acquire_owned()
                .await
                .map_err(|e| IngestorError::Other(e.to_string(),),)?;
            if shutdown.is_triggered() {
                report.deferred = 1 + queue.len();
                break;
            }

            let worker = self.worker.clone();
            let identifier = descriptor.identifier.clone();
            let handle = join_set.spawn(
                async move {
                    let _permit = permit; // Hold permit until the object is done
                    worker.ingest(&descriptor,).await
                }
                .in_current_span(),
            );
            in_flight.insert(handle.id(), identifier,);
        }

        if report.deferred > 0 {
            info!("Shutdown requested, deferring {} objects to a later run", report.deferred);
        }

        while let Some(joined,) = join_set.join_next_with_id().await {
            match joined {
                Ok((id, Ok(_,),),) => {
                    let identifier = in_flight.remove(&id,).unwrap_or_default();
                    self.parse_failures.lock().await.remove(&identifier,);
                    report.record_success();
                },
                Ok((id, Err(e,),),) => {
                    let identifier = in_flight.remove(&id,).unwrap_or_default();
                    self.note_failure(&identifier, &e,).await;
                    report.record_error(&identifier, &e,);
                },
                Err(e,) => {
                    let identifier = in_flight.remove(&e.id(),).unwrap_or_default();
                    error!(identifier = %identifier, "Object task panicked: {}", e);
                    report.record_error(&identifier, &IngestorError::Other(format!("Task panicked: {}", e),),);
                },
            }
        }

        report.finish();
        info!(
            ingested = report.ingested,
            failed = report.failed,
            deferred = report.deferred,
            "Cycle complete"
        );
        Ok(report,)
    }

    async fn note_failure(&self, identifier: &str, err: &IngestorError,) {
        match err {
            IngestorError::ParseError(_,) => {
                let mut streaks = self.parse_failures.lock().await;
                let streak = streaks.entry(identifier.to_string(),).or_insert(0,);
                *streak += 1;
                error!(
                    identifier,
                    consecutive_failures = *streak,
                    error = %err,
                    "Object is not a valid document and will be retried next cycle until it is fixed or removed"
                );
            },
            IngestorError::InventoryError(_,) => {
                error!(
                    identifier,
                    error = %err,
                    "Document inserted but inventory commit failed; it will be inserted again next cycle"
                );
            },
            _ => {
                warn!(
                    identifier,
                    kind = err.kind(),
                    error = %err,
                    "Object not ingested, will retry next cycle"
                );
            },
        }
    }
}

#[async_trait]
impl CycleJob for IngestionPipeline {
    async fn run(&self, shutdown: ShutdownSignal,) {
        match self.run_cycle_with(shutdown,).await {
            Ok(report,) => {
                if let Some(path,) = &self.config.report_path {
                    if let Err(e,) = report.save(path,) {
                        warn!("Failed to save cycle report: {}", e);
                    }
                }
            },
            Err(e,) => error!("Cycle aborted: {}", e),
        }
    }
}

/// Everything a single object needs, cheap to clone into a task.
#[derive(Clone,)]
struct ObjectWorker {
    store:       Arc<dyn ObjectStoreClient,>,
    documents:   Arc<dyn DocumentStoreClient,>,
    inventory:   Arc<InventoryTracker,>,
    staging_dir: Option<PathBuf,>,
}

impl ObjectWorker {
    async fn ingest(&self, descriptor: &ObjectDescriptor,) -> Result<String,> {
        let identifier = descriptor.identifier.as_str();

        let bytes = self.store.fetch(identifier,).await.map_err(|e| match e {
            IngestorError::FetchError(_,) => e,
            other => IngestorError::FetchError(other.to_string(),),
        },)?;
        let staged = StagedObject::write(self.staging_dir.clone(), bytes,).await?;

        let collection_name = derive_collection_name(identifier,);
        let payload = parse_document(&staged.read().await?,)?;

        let document_id = self
            .documents
            .insert(IngestedRecord {
                collection_name: collection_name.clone(),
                payload,
            },)
            .await
            .map_err(|e| match e {
                IngestorError::StoreWriteError(_,) => e,
                other => IngestorError::StoreWriteError(other.to_string(),),
            },)?;

        // Commit strictly after the insert succeeded.
        self.inventory.commit(identifier,).await?;

        info!(
            identifier,
            collection = %collection_name,
            document_id = %document_id,
            size = descriptor.size,
            "Ingested object"
        );
        Ok(document_id,)
    }
}

/// Fetched bytes parked in a temporary file; the file is removed on drop.
struct StagedObject {
    file: NamedTempFile,
}

impl StagedObject {
    async fn write(dir: Option<PathBuf,>, bytes: Bytes,) -> Result<Self,> {
        let file = task::spawn_blocking(move || -> std::io::Result<NamedTempFile,> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("ingest-",);
            let mut file = match &dir {
                Some(dir,) => builder.tempfile_in(dir,)?,
                None => builder.tempfile()?,
            };
            file.write_all(&bytes,)?;
            file.flush()?;
            Ok(file,)
        },)
        .await
        .map_err(|e| IngestorError::Other(e.to_string(),),)?
        .map_err(|e| IngestorError::FetchError(format!("Failed to stage object: {}", e),),)?;

        Ok(Self { file, },)
    }

    async fn read(&self,) -> Result<Vec<u8,>,> {
        tokio::fs::read(self.file.path(),).await.map_err(|e| {
            IngestorError::FetchError(format!(
                "Failed to read staged object {}: {}",
                self.file.path().display(),
                e
            ),)
        },)
    }
}
