// crates/live-node-object-store/src/s3.rs
// ============================================================================
// Module: S3 Object Store
// Description: S3-backed object store for database bytes.
// Purpose: Fetch and upload database objects with size limits.
// Dependencies: aws-config, aws-sdk-s3, tokio
// ============================================================================

//! ## Overview
//! [`S3ObjectStore`] talks to Amazon S3 or any S3-compatible service. Reads
//! are streamed in fixed-size chunks and abort as soon as the configured
//! size limit is crossed, so a mislabeled object never exhausts memory.
//! Security posture: storage is untrusted; keys and sizes are validated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use live_node_config::ObjectStoreConfig;
use live_node_core::DatabaseKey;
use live_node_core::ObjectStore;
use live_node_core::ObjectStoreError;
use tokio::io::AsyncReadExt;

use crate::keys::normalize_prefix;
use crate::keys::object_key;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type recorded on uploaded database objects.
const SQLITE_CONTENT_TYPE: &str = "application/vnd.sqlite3";
/// Read buffer size for streamed downloads.
const READ_CHUNK_BYTES: usize = 8192;

// ============================================================================
// SECTION: S3 Store
// ============================================================================

/// S3-backed object store.
pub struct S3ObjectStore {
    /// Underlying S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Normalized key prefix.
    prefix: String,
    /// Maximum object size in bytes.
    max_object_bytes: usize,
}

impl S3ObjectStore {
    /// Builds an S3 client from configuration and the ambient AWS environment.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Invalid`] when the configuration is invalid.
    pub async fn connect(config: &ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        config.validate().map_err(|err| ObjectStoreError::Invalid(err.to_string()))?;
        let prefix = normalize_prefix(config.prefix.as_deref().unwrap_or(""))?;
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = config.endpoint.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        Ok(Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: config.bucket.clone(),
            prefix,
            max_object_bytes: config.max_object_bytes,
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch_object(&self, key: &DatabaseKey) -> Result<Vec<u8>, ObjectStoreError> {
        let object_key = object_key(&self.prefix, key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                    ObjectStoreError::NotFound(object_key.clone())
                } else {
                    ObjectStoreError::Backend(err.to_string())
                }
            })?;
        if let Some(length) = output.content_length() {
            let actual_bytes = usize::try_from(length).unwrap_or(usize::MAX);
            if actual_bytes > self.max_object_bytes {
                return Err(ObjectStoreError::TooLarge {
                    key: object_key,
                    max_bytes: self.max_object_bytes,
                    actual_bytes,
                });
            }
        }
        let mut reader = output.body.into_async_read();
        let mut buffer = Vec::new();
        let mut total_bytes = 0usize;
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            let read =
                reader.read(&mut chunk).await.map_err(|err| ObjectStoreError::Io(err.to_string()))?;
            if read == 0 {
                break;
            }
            total_bytes = total_bytes
                .checked_add(read)
                .ok_or_else(|| ObjectStoreError::Io("object size overflow".to_string()))?;
            if total_bytes > self.max_object_bytes {
                return Err(ObjectStoreError::TooLarge {
                    key: object_key,
                    max_bytes: self.max_object_bytes,
                    actual_bytes: total_bytes,
                });
            }
            buffer.extend_from_slice(&chunk[.. read]);
        }
        Ok(buffer)
    }

    async fn store_object(
        &self,
        key: &DatabaseKey,
        bytes: Vec<u8>,
    ) -> Result<(), ObjectStoreError> {
        let object_key = object_key(&self.prefix, key)?;
        if bytes.len() > self.max_object_bytes {
            return Err(ObjectStoreError::TooLarge {
                key: object_key,
                max_bytes: self.max_object_bytes,
                actual_bytes: bytes.len(),
            });
        }
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .content_type(SQLITE_CONTENT_TYPE)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        Ok(())
    }
}
