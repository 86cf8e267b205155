// bucket_ingestor/tests/common/mod.rs
// In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bucket_ingestor::error::{IngestorError, Result};
use bucket_ingestor::ingestor::{DocumentStoreClient, IngestedRecord};
use bucket_ingestor::inventory::{InventoryBackend, InventoryEntry, InventoryTracker};
use bucket_ingestor::object_store::{ObjectDescriptor, ObjectStoreClient};
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};

#[derive(Default,)]
pub struct MemoryObjectStore {
    objects:         Mutex<BTreeMap<String, Bytes,>,>,
    failing_fetches: Mutex<HashSet<String,>,>,
    panicking:       Mutex<HashSet<String,>,>,
    unavailable:     AtomicBool,
    pub fetches:     AtomicUsize,
}

impl MemoryObjectStore {
    pub fn with_objects(objects: &[(&str, &str,)],) -> Self {
        let store = Self::default();
        for (key, body,) in objects {
            store.put(key, body,);
        }
        store
    }

    pub fn put(&self, key: &str, body: &str,) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from(body.to_string(),),);
    }

    pub fn remove(&self, key: &str,) {
        self.objects.lock().unwrap().remove(key,);
    }

    pub fn fail_fetch(&self, key: &str,) {
        self.failing_fetches.lock().unwrap().insert(key.to_string(),);
    }

    pub fn heal_fetch(&self, key: &str,) {
        self.failing_fetches.lock().unwrap().remove(key,);
    }

    /// Makes the task fetching `key` panic.
    pub fn panic_on_fetch(&self, key: &str,) {
        self.panicking.lock().unwrap().insert(key.to_string(),);
    }

    pub fn set_unavailable(&self, unavailable: bool,) {
        self.unavailable.store(unavailable, Ordering::SeqCst,);
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    async fn list_all(&self,) -> Result<Vec<ObjectDescriptor,>,> {
        if self.unavailable.load(Ordering::SeqCst,) {
            return Err(IngestorError::StoreUnavailable("listing refused".to_string(),),);
        }
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .map(|(key, body,)| descriptor(key, body.len() as u64,),)
            .collect(),)
    }

    async fn fetch(&self, identifier: &str,) -> Result<Bytes,> {
        self.fetches.fetch_add(1, Ordering::SeqCst,);
        if self.panicking.lock().unwrap().contains(identifier,) {
            panic!("fetch of {} blew up", identifier);
        }
        if self.failing_fetches.lock().unwrap().contains(identifier,) {
            return Err(IngestorError::FetchError(format!("connection reset fetching {}", identifier),),);
        }
        self.objects
            .lock()
            .unwrap()
            .get(identifier,)
            .cloned()
            .ok_or_else(|| IngestorError::FetchError(format!("no such key {}", identifier),),)
    }
}

pub fn descriptor(identifier: &str, size: u64,) -> ObjectDescriptor {
    ObjectDescriptor {
        identifier: identifier.to_string(),
        last_modified: Utc::now(),
        content_hash: format!("etag-{}", identifier),
        size,
        storage_tier: "STANDARD".to_string(),
    }
}

#[derive(Default,)]
pub struct RecordingDocumentStore {
    pub records:         Mutex<Vec<IngestedRecord,>,>,
    failing_collections: Mutex<HashSet<String,>,>,
}

impl RecordingDocumentStore {
    pub fn fail_collection(&self, collection: &str,) {
        self.failing_collections.lock().unwrap().insert(collection.to_string(),);
    }

    pub fn heal_collection(&self, collection: &str,) {
        self.failing_collections.lock().unwrap().remove(collection,);
    }

    pub fn inserted(&self,) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn collections(&self,) -> Vec<String,> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.collection_name.clone(),)
            .collect()
    }
}

#[async_trait]
impl DocumentStoreClient for RecordingDocumentStore {
    async fn insert(&self, record: IngestedRecord,) -> Result<String,> {
        if self.failing_collections.lock().unwrap().contains(&record.collection_name,) {
            return Err(IngestorError::StoreWriteError(format!(
                "write concern failed for {}",
                record.collection_name
            ),),);
        }
        let mut records = self.records.lock().unwrap();
        records.push(record,);
        Ok(records.len().to_string(),)
    }
}

/// Document store whose inserts block until the test releases them.
pub struct GatedDocumentStore {
    pub inner: RecordingDocumentStore,
    started:   Notify,
    release:   Semaphore,
}

impl GatedDocumentStore {
    pub fn new() -> Self {
        Self {
            inner:   RecordingDocumentStore::default(),
            started: Notify::new(),
            release: Semaphore::new(0,),
        }
    }

    /// Resolves once an insert is waiting at the gate.
    pub async fn insert_started(&self,) {
        self.started.notified().await;
    }

    pub fn release(&self, inserts: usize,) {
        self.release.add_permits(inserts,);
    }
}

#[async_trait]
impl DocumentStoreClient for GatedDocumentStore {
    async fn insert(&self, record: IngestedRecord,) -> Result<String,> {
        self.started.notify_one();
        self.release
            .acquire()
            .await
            .map_err(|e| IngestorError::StoreWriteError(e.to_string(),),)?
            .forget();
        self.inner.insert(record,).await
    }
}

/// Inventory backend kept in memory, counting appends.
#[derive(Default,)]
pub struct MemoryInventoryBackend {
    pub entries: Mutex<Vec<InventoryEntry,>,>,
    pub appends: AtomicUsize,
    failing:     AtomicBool,
}

impl MemoryInventoryBackend {
    pub fn seeded(identifiers: &[&str],) -> Self {
        let backend = Self::default();
        backend.entries.lock().unwrap().extend(identifiers.iter().map(|id| InventoryEntry {
            identifier:  id.to_string(),
            ingested_at: Utc::now(),
        },),);
        backend
    }

    pub fn set_failing(&self, failing: bool,) {
        self.failing.store(failing, Ordering::SeqCst,);
    }
}

#[async_trait]
impl InventoryBackend for MemoryInventoryBackend {
    async fn load_all(&self,) -> Result<Vec<InventoryEntry,>,> {
        Ok(self.entries.lock().unwrap().clone(),)
    }

    async fn append(&self, entry: &InventoryEntry,) -> Result<(),> {
        if self.failing.load(Ordering::SeqCst,) {
            return Err(IngestorError::InventoryError("disk full".to_string(),),);
        }
        self.appends.fetch_add(1, Ordering::SeqCst,);
        self.entries.lock().unwrap().push(entry.clone(),);
        Ok((),)
    }
}

pub async fn tracker(backend: &Arc<MemoryInventoryBackend,>,) -> Arc<InventoryTracker,> {
    let backend: Arc<dyn InventoryBackend,> = backend.clone();
    Arc::new(InventoryTracker::open(backend,).await.expect("open inventory",),)
}
