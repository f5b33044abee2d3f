use crate::config::S3Config;
use crate::error::CatalogError;
use anyhow::anyhow;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// A time-limited signed read URL for a stored object.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Object storage boundary: non-overwriting writes plus signed read URLs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object under `key`, tagged with its content type.
    /// The write is non-overwriting by contract: a pre-existing key is an
    /// error, never a silent replacement.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), CatalogError>;

    /// Produce a signed read-only URL for `key` with the configured validity
    /// window. Pure computation over (key, credentials, expiry, clock); no
    /// network round trip.
    async fn presign_get(&self, key: &str) -> Result<SignedUrl, CatalogError>;
}

/// S3-backed object store for product images.
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    signed_url_expiry: Duration,
}

impl S3BlobStore {
    /// Create a new S3 blob store
    pub async fn new(config: &S3Config, signed_url_expiry: Duration) -> Result<Self, CatalogError> {
        if config.bucket.trim().is_empty() {
            return Err(CatalogError::Configuration(
                "s3.bucket must not be empty".to_string(),
            ));
        }

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 blob store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            signed_url_expiry,
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3BlobStore {
    #[instrument(skip(self, bytes), fields(key = %key, size_bytes = bytes.len()))]
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), CatalogError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            // Reject the write if the key already exists
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| CatalogError::StorageUnavailable(anyhow!(e)))?;

        debug!(key = %key, "Object written");

        Ok(())
    }

    async fn presign_get(&self, key: &str) -> Result<SignedUrl, CatalogError> {
        let presigning_config = PresigningConfig::expires_in(self.signed_url_expiry)
            .map_err(|e| CatalogError::StorageUnavailable(anyhow!(e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| CatalogError::StorageUnavailable(anyhow!(e)))?;

        let expires_at =
            Utc::now() + chrono::Duration::seconds(self.signed_url_expiry.as_secs() as i64);

        Ok(SignedUrl {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }
}

/// Best-effort recovery of an object key from a full URL persisted by
/// revisions that stored signed URLs instead of keys.
///
/// Takes the trailing path segment with any query string stripped. Total
/// function: malformed input yields None, never an error.
pub fn legacy_key_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    if !path.contains('/') {
        return None;
    }

    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
