use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::models::batch::ObjectRef;

/// Client for the S3-compatible object store. One client serves every
/// bucket the pipeline touches (staging, serving, archive, dead-letter).
pub struct ObjectStore {
    region: Region,
    credentials: Credentials,
}

impl ObjectStore {
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            region,
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(StorageError::S3)
    }

    /// Download object bytes.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket(bucket)?
            .get_object(key)
            .await
            .map_err(StorageError::S3)?;
        Ok(response.to_vec())
    }

    /// Stream an object into `writer` without buffering it in memory.
    /// Archive downloads go through here; a batch zip can be far larger
    /// than the images it contains.
    pub async fn get_to_writer<W>(
        &self,
        bucket: &str,
        key: &str,
        writer: &mut W,
    ) -> Result<(), StorageError>
    where
        W: tokio::io::AsyncWrite + Send + Unpin,
    {
        self.bucket(bucket)?
            .get_object_to_writer(key, writer)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    /// Upload bytes under the given key.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.bucket(bucket)?
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    /// Copy an object between buckets. The store has no cross-bucket server
    /// side copy, so this is a download followed by an upload.
    pub async fn copy(
        &self,
        src: &ObjectRef,
        dest_bucket: &str,
        dest_key: &str,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let data = self.get(&src.bucket, &src.key).await?;
        self.put(dest_bucket, dest_key, &data, content_type).await
    }

    /// Delete an object. Deleting a missing key succeeds.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.bucket(bucket)?
            .delete_object(key)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    /// ETag of an object, if the store reports one.
    pub async fn head(&self, bucket: &str, key: &str) -> Result<Option<String>, StorageError> {
        let (head, _code) = self
            .bucket(bucket)?
            .head_object(key)
            .await
            .map_err(StorageError::S3)?;
        Ok(head.e_tag)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
