// bucket_ingestor/src/s3/mod.rs
// S3 (and S3-compatible) object store adapter.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::{IngestorError, Result};
use crate::object_store::{ObjectDescriptor, ObjectStoreClient};

#[derive(Debug, Clone, Default,)]
pub struct S3Config {
    pub bucket:     String,
    pub prefix:     Option<String,>,
    pub region:     Option<String,>,
    pub endpoint:   Option<String,>,
    pub path_style: bool,
    pub access_key: Option<String,>,
    pub secret_key: Option<String,>,
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: Option<String,>,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config,) -> Result<Self,> {
        if config.bucket.is_empty() {
            return Err(IngestorError::ConfigurationError("S3 bucket name is empty".to_string(),),);
        }

        let shared = aws_config::defaults(BehaviorVersion::latest(),).load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared,).force_path_style(config.path_style,);

        if let Some(region,) = &config.region {
            builder = builder.region(Region::new(region.clone(),),);
        }
        if let Some(endpoint,) = &config.endpoint {
            builder = builder.endpoint_url(endpoint,);
        }
        if let (Some(access_key,), Some(secret_key,),) = (&config.access_key, &config.secret_key,) {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "bucket-ingestor",
            ),);
        }

        info!("S3 object store initialized for bucket: {}", config.bucket);

        Ok(S3ObjectStore {
            client: Client::from_conf(builder.build(),),
            bucket: config.bucket,
            prefix: config.prefix,
        },)
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStore {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_all(&self,) -> Result<Vec<ObjectDescriptor,>,> {
        let mut descriptors = Vec::new();
        let mut continuation: Option<String,> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket,)
                .set_prefix(self.prefix.clone(),)
                .set_continuation_token(continuation.take(),)
                .send()
                .await
                .map_err(|e| {
                    IngestorError::StoreUnavailable(format!(
                        "Failed to list s3://{}: {}",
                        self.bucket, e
                    ),)
                },)?;

            for object in response.contents() {
                let Some(key,) = object.key() else { continue };
                // Zero-byte "folder" markers created by consoles.
                if key.ends_with('/',) {
                    continue;
                }
                let last_modified = object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc,>::from_timestamp(t.secs(), t.subsec_nanos(),),)
                    .unwrap_or_default();
                descriptors.push(ObjectDescriptor {
                    identifier: key.to_string(),
                    last_modified,
                    content_hash: object.e_tag().unwrap_or_default().trim_matches('"',).to_string(),
                    size: object.size().unwrap_or(0,).max(0,) as u64,
                    storage_tier: object
                        .storage_class()
                        .map(|c| c.as_str().to_string(),)
                        .unwrap_or_else(|| "STANDARD".to_string(),),
                },);
            }

            match response.next_continuation_token() {
                Some(token,) if response.is_truncated().unwrap_or(false,) => {
                    continuation = Some(token.to_string(),);
                },
                _ => break,
            }
        }

        debug!("Listed {} objects from s3://{}", descriptors.len(), self.bucket);
        Ok(descriptors,)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn fetch(&self, identifier: &str,) -> Result<Bytes,> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket,)
            .key(identifier,)
            .send()
            .await
            .map_err(|e| {
                IngestorError::FetchError(format!(
                    "Failed to download s3://{}/{}: {}",
                    self.bucket, identifier, e
                ),)
            },)?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| {
                IngestorError::FetchError(format!(
                    "Failed to read body of s3://{}/{}: {}",
                    self.bucket, identifier, e
                ),)
            },)?
            .into_bytes();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, identifier);
        Ok(data,)
    }
}
