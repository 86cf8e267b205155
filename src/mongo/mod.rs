// bucket_ingestor/src/mongo/mod.rs
// MongoDB document store adapter.

use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use tracing::debug;

use crate::error::{IngestorError, Result};
use crate::ingestor::{DocumentStoreClient, IngestedRecord, IngestorConfig};
use crate::retry::{execute_with_retry, wrap_error};

pub struct MongoDocumentStore {
    client:        Client,
    database_name: String,
}

impl MongoDocumentStore {
    pub async fn new(config: IngestorConfig,) -> Result<Self,> {
        let client_options = ClientOptions::parse(&config.database_url,)
            .await
            .map_err(|e| {
                IngestorError::ConfigurationError(format!("Failed to parse MongoDB URI: {}", e),)
            },)?;
        let client = Client::with_options(client_options,).map_err(|e| {
            IngestorError::ConnectionError(format!("Failed to create MongoDB client: {}", e),)
        },)?;

        execute_with_retry(|| async {
            client
                .database("admin",)
                .run_command(doc! {"ping": 1}, None,)
                .await
                .map(|_| (),)
                .map_err(|e| {
                    wrap_error(IngestorError::ConnectionError(format!(
                        "Failed to connect to MongoDB: {}",
                        e
                    ),),)
                },)
        },)
        .await?;

        let database_name = config
            .database_name
            .unwrap_or_else(|| crate::DEFAULT_DATABASE_NAME.to_string(),);

        Ok(MongoDocumentStore {
            client,
            database_name,
        },)
    }
}

#[async_trait]
impl DocumentStoreClient for MongoDocumentStore {
    async fn insert(&self, record: IngestedRecord,) -> Result<String,> {
        let collection = self
            .client
            .database(&self.database_name,)
            .collection::<Document>(&record.collection_name,);

        let bson_document = mongodb::bson::to_document(&record.payload,).map_err(|e| {
            IngestorError::StoreWriteError(format!("Failed to convert document to BSON: {}", e),)
        },)?;

        let result = execute_with_retry(|| async {
            collection
                .insert_one(bson_document.clone(), None,)
                .await
                .map_err(|e| {
                    wrap_error(IngestorError::StoreWriteError(format!(
                        "Failed to insert into '{}.{}': {}",
                        self.database_name, record.collection_name, e
                    ),),)
                },)
        },)
        .await?;

        let inserted_id = match result.inserted_id {
            Bson::ObjectId(oid,) => oid.to_hex(),
            other => other.to_string(),
        };
        debug!(
            collection = %record.collection_name,
            inserted_id = %inserted_id,
            "Inserted document into MongoDB"
        );
        Ok(inserted_id,)
    }
}
