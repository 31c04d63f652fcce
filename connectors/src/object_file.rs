//! Manually uploaded files held in object storage.
//!
//! The backing object lives at `{source_id}/{file_name}` in a fixed bucket.
//! Parsing reuses the remote-file pipeline; the only transport difference is
//! that discovery is a ranged read instead of a directory listing.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use dataflow_config::StorageSettings;

use crate::config::ManualFileConfig;
use crate::error::ConnectorError;
use crate::file_layout::parse_auto;
use crate::infer::infer_schema;
use crate::traits::{stream_table, RowStream, SourceConnector};
use crate::types::{clean_columns, ColumnSchema, DataTable};

/// Byte length of the existence probe read.
const PROBE_LENGTH: u64 = 32;

/// Object-storage failure, with "no such key" kept distinguishable because
/// every caller special-cases it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no such key")]
    NoSuchKey,
    #[error("{0}")]
    Other(String),
}

/// Boundary interface to the object store.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

/// S3-compatible implementation (MinIO in deployments), path-style.
pub struct S3FileStorage {
    client: aws_sdk_s3::Client,
}

impl S3FileStorage {
    pub fn new(settings: &StorageSettings) -> Self {
        let endpoint = if settings.endpoint.contains("://") {
            settings.endpoint.clone()
        } else if settings.secure {
            format!("https://{}", settings.endpoint)
        } else {
            format!("http://{}", settings.endpoint)
        };

        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "static",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range.map(|(start, end)| format!("bytes={start}-{end}")))
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                Ok(data.into_bytes().to_vec())
            }
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    Err(StorageError::NoSuchKey)
                } else {
                    Err(StorageError::Other(service.to_string()))
                }
            }
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Other(e.into_service_error().to_string()))?;
        Ok(())
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Other(e.into_service_error().to_string()))?;
        Ok(())
    }
}

pub struct ObjectStorageFileConnector {
    source_id: i64,
    config: ManualFileConfig,
    storage: Arc<dyn FileStorage>,
    bucket: String,
    cache: OnceCell<String>,
}

impl ObjectStorageFileConnector {
    pub fn new(
        source_id: i64,
        config: ManualFileConfig,
        storage: Arc<dyn FileStorage>,
        bucket: String,
    ) -> Self {
        Self {
            source_id,
            config,
            storage,
            bucket,
            cache: OnceCell::new(),
        }
    }

    fn key(&self) -> String {
        format!("{}/{}", self.source_id, self.config.file_name)
    }

    fn map_storage_error(&self, err: StorageError) -> ConnectorError {
        match err {
            StorageError::NoSuchKey => ConnectorError::ResourceNotFound(format!(
                "The file named '{}' does not exist!",
                self.config.file_name
            )),
            StorageError::Other(message) => ConnectorError::SourceConnection(message),
        }
    }

    async fn fetch(&self) -> Result<&str, ConnectorError> {
        self.cache
            .get_or_try_init(|| async {
                let bytes = self
                    .storage
                    .get_object(&self.bucket, &self.key(), None)
                    .await
                    .map_err(|e| self.map_storage_error(e))?;
                String::from_utf8(bytes).map_err(|_| {
                    ConnectorError::Internal(format!(
                        "File '{}' is not valid UTF-8 text",
                        self.config.file_name
                    ))
                })
            })
            .await
            .map(String::as_str)
    }

    async fn parse(&self) -> Result<DataTable, ConnectorError> {
        let content = self.fetch().await?;
        parse_auto(content)
    }

    /// Remove the backing object. Invoked by the owning source's deletion
    /// flow, never by extraction; an already-absent object is fine.
    pub async fn delete_backing_object(&self) -> Result<(), ConnectorError> {
        match self.storage.remove_object(&self.bucket, &self.key()).await {
            Ok(()) | Err(StorageError::NoSuchKey) => {
                info!(key = %self.key(), "removed uploaded file");
                Ok(())
            }
            Err(err) => Err(self.map_storage_error(err)),
        }
    }
}

#[async_trait]
impl SourceConnector for ObjectStorageFileConnector {
    async fn check_connection(&self) -> Result<(), ConnectorError> {
        // Short partial read confirms the object exists and is readable
        self.storage
            .get_object(&self.bucket, &self.key(), Some((0, PROBE_LENGTH - 1)))
            .await
            .map_err(|e| self.map_storage_error(e))?;
        Ok(())
    }

    async fn get_columns(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.parse().await?.columns)
    }

    async fn get_columns_with_types(&self) -> Result<ColumnSchema, ConnectorError> {
        let table = self.parse().await?;
        Ok(infer_schema(
            &table,
            self.config.source_data_columns.as_deref(),
        ))
    }

    async fn get_cleaned_columns(&self) -> Result<Vec<String>, ConnectorError> {
        let columns = self.get_columns().await?;
        Ok(clean_columns(
            columns,
            self.config.source_data_columns.as_deref(),
        ))
    }

    async fn get_all_data(&self) -> Result<DataTable, ConnectorError> {
        let table = self.parse().await?;
        let cleaned = clean_columns(
            table.columns.clone(),
            self.config.source_data_columns.as_deref(),
        );
        Ok(table.select(&cleaned))
    }

    async fn stream_rows(&self, source_id: i64) -> Result<RowStream, ConnectorError> {
        let table = self.get_all_data().await?;
        Ok(stream_table(source_id, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStorage {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl FakeStorage {
        fn with_object(key: &str, body: &str) -> Self {
            let storage = Self::default();
            storage
                .objects
                .lock()
                .unwrap()
                .insert(key.to_string(), body.as_bytes().to_vec());
            storage
        }
    }

    #[async_trait]
    impl FileStorage for FakeStorage {
        async fn get_object(
            &self,
            _bucket: &str,
            key: &str,
            range: Option<(u64, u64)>,
        ) -> Result<Vec<u8>, StorageError> {
            let objects = self.objects.lock().unwrap();
            let body = objects.get(key).ok_or(StorageError::NoSuchKey)?;
            Ok(match range {
                Some((start, end)) => {
                    let start = start as usize;
                    let end = ((end + 1) as usize).min(body.len());
                    body.get(start..end).unwrap_or_default().to_vec()
                }
                None => body.clone(),
            })
        }

        async fn put_object(
            &self,
            _bucket: &str,
            key: &str,
            body: Vec<u8>,
            _content_type: &str,
        ) -> Result<(), StorageError> {
            self.objects.lock().unwrap().insert(key.to_string(), body);
            Ok(())
        }

        async fn remove_object(&self, _bucket: &str, key: &str) -> Result<(), StorageError> {
            self.objects
                .lock()
                .unwrap()
                .remove(key)
                .map(|_| ())
                .ok_or(StorageError::NoSuchKey)
        }
    }

    fn connector(storage: FakeStorage, columns: Option<Vec<String>>) -> ObjectStorageFileConnector {
        let config = ManualFileConfig {
            file_name: "upload.csv".to_string(),
            source_data_columns: columns,
        };
        ObjectStorageFileConnector::new(7, config, Arc::new(storage), "dataflow".to_string())
    }

    #[tokio::test]
    async fn test_check_connection_missing_key() {
        let connector = connector(FakeStorage::default(), None);
        assert!(matches!(
            connector.check_connection().await,
            Err(ConnectorError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_columns_and_data_from_uploaded_csv() {
        let storage = FakeStorage::with_object("7/upload.csv", "a,b,c\n1,2,3\n4,5,6\n");
        let connector = connector(storage, Some(vec!["a".to_string(), "c".to_string()]));

        connector.check_connection().await.unwrap();
        assert_eq!(connector.get_columns().await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            connector.get_cleaned_columns().await.unwrap(),
            vec!["a", "c"]
        );

        let table = connector.get_all_data().await.unwrap();
        assert_eq!(table.columns, vec!["a", "c"]);
        assert_eq!(table.rows[1], vec![Some("4".into()), Some("6".into())]);
    }

    #[tokio::test]
    async fn test_typed_schema_from_upload() {
        let storage = FakeStorage::with_object("7/upload.csv", "tmo_id,name,when\nx,bob,2024-01-01\n");
        let connector = connector(storage, None);

        let schema = connector.get_columns_with_types().await.unwrap();
        assert_eq!(schema["tmo_id"], crate::types::ColumnType::Int);
        assert_eq!(schema["name"], crate::types::ColumnType::Str);
        assert_eq!(schema["when"], crate::types::ColumnType::Datetime);
    }

    #[tokio::test]
    async fn test_delete_backing_object_tolerates_missing() {
        let storage = FakeStorage::with_object("7/upload.csv", "a\n1\n");
        let connector = connector(storage, None);

        connector.delete_backing_object().await.unwrap();
        // Second delete finds nothing and still succeeds
        connector.delete_backing_object().await.unwrap();
    }
}
