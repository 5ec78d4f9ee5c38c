use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use md5::{Digest, Md5};
use thiserror::Error;
use tracing::{debug, info};

use hiddencrawl_core::config::ObjectStoreConfig;
use hiddencrawl_core::MediaCategory;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("bucket setup failed: {0}")]
    BucketSetup(String),
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Where a stored blob ended up: enough to reconstruct a retrieval URL later.
#[derive(Debug, Clone)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

fn bucket_for(category: &str) -> &'static str {
    match category {
        "images" => "crawler-images",
        "audio" => "crawler-audio",
        "video" => "crawler-videos",
        _ => "crawler-media",
    }
}

/// Thin wrapper around an S3-compatible client (MinIO in production), with a
/// fixed four-bucket layout: one per media category plus a shared "other" bucket.
pub struct ObjectStore {
    client: Client,
}

impl ObjectStore {
    pub async fn connect(config: &ObjectStoreConfig) -> Self {
        let creds = Credentials::new(&config.access_key, &config.secret_key, None, None, "static");
        let scheme = if config.use_tls { "https" } else { "http" };
        let endpoint = format!("{scheme}://{}", config.endpoint);

        let shared_config = aws_config::from_env()
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .endpoint_url(endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    /// Idempotently creates the four category buckets. Safe to call on every startup.
    pub async fn ensure_buckets(&self) -> Result<(), ObjectStoreError> {
        for bucket in ["crawler-images", "crawler-audio", "crawler-videos", "crawler-media"] {
            match self.client.head_bucket().bucket(bucket).send().await {
                Ok(_) => debug!(bucket, "bucket already exists"),
                Err(_) => {
                    self.client
                        .create_bucket()
                        .bucket(bucket)
                        .send()
                        .await
                        .map_err(|e| ObjectStoreError::BucketSetup(format!("{bucket}: {e}")))?;
                    info!(bucket, "created bucket");
                }
            }
        }
        Ok(())
    }

    /// Uploads `bytes` under the content-addressed key
    /// `page_{page_id}/{unix_seconds}_{md5(source_url)}.{ext}` and returns where it landed.
    pub async fn put(
        &self,
        page_id: i64,
        category: MediaCategory,
        source_url: &str,
        ext: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
        unix_seconds: i64,
    ) -> Result<ObjectLocation, ObjectStoreError> {
        let bucket = bucket_for(category.bucket_category()).to_string();
        let digest = Md5::digest(source_url.as_bytes());
        let hash_hex = hex_encode(&digest);
        let key = format!("page_{page_id}/{unix_seconds}_{hash_hex}.{ext}");

        let mut req = self
            .client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(bytes));
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        req.send()
            .await
            .map_err(|e| ObjectStoreError::Upload(format!("{bucket}/{key}: {e}")))?;

        Ok(ObjectLocation { bucket, key })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_for_maps_every_category() {
        assert_eq!(bucket_for("images"), "crawler-images");
        assert_eq!(bucket_for("audio"), "crawler-audio");
        assert_eq!(bucket_for("video"), "crawler-videos");
        assert_eq!(bucket_for("other"), "crawler-media");
    }

    #[test]
    fn hex_encode_matches_known_digest() {
        let digest = Md5::digest(b"hello");
        assert_eq!(hex_encode(&digest), "5d41402abc4b2a76b9719d911017c592");
    }
}
