// bucket_ingestor/tests/scheduler_tests.rs

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bucket_ingestor::error::IngestorError;
use bucket_ingestor::pipeline::{IngestionPipeline, PipelineConfig};
use bucket_ingestor::scheduler::{CycleJob, Scheduler, ShutdownSignal};
use common::{GatedDocumentStore, MemoryInventoryBackend, MemoryObjectStore, RecordingDocumentStore, tracker};
use tempfile::TempDir;

/// Job that takes `duration` per run and records how many runs overlap.
#[derive(Default,)]
struct SlowJob {
    duration:    Duration,
    invocations: AtomicUsize,
    completed:   AtomicUsize,
    active:      AtomicUsize,
    max_active:  AtomicUsize,
}

#[async_trait]
impl CycleJob for SlowJob {
    async fn run(&self, _shutdown: ShutdownSignal,) {
        self.invocations.fetch_add(1, Ordering::SeqCst,);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst,) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst,);
        tokio::time::sleep(self.duration,).await;
        self.active.fetch_sub(1, Ordering::SeqCst,);
        self.completed.fetch_add(1, Ordering::SeqCst,);
    }
}

#[tokio::test]
async fn slow_cycle_is_never_overlapped() {
    let job = Arc::new(SlowJob {
        duration: Duration::from_millis(300,),
        ..SlowJob::default()
    },);
    let scheduler = Scheduler::start(Duration::from_millis(20,), job.clone(),).unwrap();
    let stats = scheduler.stats();

    tokio::time::sleep(Duration::from_millis(150,),).await;
    assert_eq!(job.invocations.load(Ordering::SeqCst,), 1);
    assert!(stats.ticks_skipped() > 0);

    scheduler.stop().await;
    assert_eq!(job.max_active.load(Ordering::SeqCst,), 1);
    assert_eq!(stats.cycles_started() as usize, job.invocations.load(Ordering::SeqCst,));
}

#[tokio::test]
async fn stop_waits_for_the_in_flight_cycle() {
    let job = Arc::new(SlowJob {
        duration: Duration::from_millis(200,),
        ..SlowJob::default()
    },);
    let scheduler = Scheduler::start(Duration::from_secs(3600,), job.clone(),).unwrap();

    tokio::time::sleep(Duration::from_millis(50,),).await;
    assert_eq!(job.invocations.load(Ordering::SeqCst,), 1);
    assert_eq!(job.completed.load(Ordering::SeqCst,), 0);

    scheduler.stop().await;
    assert_eq!(job.completed.load(Ordering::SeqCst,), 1);
    assert_eq!(job.active.load(Ordering::SeqCst,), 0);
}

#[tokio::test]
async fn ticks_keep_firing_for_quick_cycles() {
    let job = Arc::new(SlowJob::default(),);
    let scheduler = Scheduler::start(Duration::from_millis(10,), job.clone(),).unwrap();

    tokio::time::sleep(Duration::from_millis(200,),).await;
    scheduler.stop().await;

    assert!(job.invocations.load(Ordering::SeqCst,) >= 3);
    assert_eq!(job.max_active.load(Ordering::SeqCst,), 1);
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let job = Arc::new(SlowJob::default(),);
    let err = Scheduler::start(Duration::ZERO, job,).err().unwrap();
    assert!(matches!(err, IngestorError::ConfigurationError(_)));
}

#[tokio::test]
async fn scheduled_pipeline_ingests_late_arrivals() {
    let store = Arc::new(MemoryObjectStore::with_objects(&[("orders_1.json", "{}",)],),);
    let documents = Arc::new(RecordingDocumentStore::default(),);
    let backend = Arc::new(MemoryInventoryBackend::default(),);
    let pipeline = Arc::new(IngestionPipeline::new(
        store.clone(),
        documents.clone(),
        tracker(&backend,).await,
        PipelineConfig::default(),
    ),);

    let scheduler = Scheduler::start(Duration::from_millis(25,), pipeline.clone(),).unwrap();
    tokio::time::sleep(Duration::from_millis(100,),).await;
    store.put("orders_2.json", r#"{"late": true}"#,);
    tokio::time::sleep(Duration::from_millis(150,),).await;
    scheduler.stop().await;

    assert_eq!(documents.inserted(), 2);
    assert!(pipeline.inventory().is_known("orders_2.json",).await);
}

#[tokio::test]
async fn stop_mid_cycle_finishes_in_flight_object_and_defers_the_rest() {
    let store = Arc::new(MemoryObjectStore::with_objects(&[
        ("a_1.json", r#"{"n": 1}"#,),
        ("b_1.json", r#"{"n": 2}"#,),
        ("c_1.json", r#"{"n": 3}"#,),
    ],),);
    let documents = Arc::new(GatedDocumentStore::new(),);
    let backend = Arc::new(MemoryInventoryBackend::default(),);
    let reports = TempDir::new().unwrap();
    let report_path = reports.path().join("report.json",);
    let pipeline = Arc::new(IngestionPipeline::new(
        store.clone(),
        documents.clone(),
        tracker(&backend,).await,
        PipelineConfig {
            concurrency: 1,
            staging_dir: None,
            report_path: Some(report_path.clone(),),
        },
    ),);

    let scheduler = Scheduler::start(Duration::from_secs(3600,), pipeline.clone(),).unwrap();
    tokio::time::timeout(Duration::from_secs(5,), documents.insert_started(),)
        .await
        .expect("first insert never started",);

    // Stop while the first insert is still blocked at the gate.
    let stopping = tokio::spawn(scheduler.stop(),);
    tokio::time::sleep(Duration::from_millis(50,),).await;
    assert!(!stopping.is_finished(), "stop must wait for the in-flight object");
    documents.release(1,);
    tokio::time::timeout(Duration::from_secs(5,), stopping,)
        .await
        .expect("stop did not return",)
        .unwrap();

    assert_eq!(documents.inner.inserted(), 1);
    assert_eq!(documents.inner.collections(), vec!["a"]);
    let inventory = pipeline.inventory();
    assert_eq!(inventory.len().await, 1);
    assert!(inventory.is_known("a_1.json",).await);
    assert_eq!(backend.appends.load(Ordering::SeqCst,), documents.inner.inserted());

    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&report_path,).unwrap(),).unwrap();
    assert_eq!(report["ingested"], 1);
    assert_eq!(report["deferred"], 2);
    assert_eq!(report["failed"], 0);
}
