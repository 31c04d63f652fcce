//! Connector selection and construction.
//!
//! The factory owns the shared collaborators (credential cipher, object
//! storage client, inventory client) and turns a persisted source record
//! into the matching connector: decode, decrypt, parse, validate, construct.
//! No connector touches its origin during construction — connections happen
//! only inside the contract methods.

use std::sync::Arc;

use tracing::debug;

use dataflow_models::{FileImportType, Source, SourceType};

use crate::config::{DbConfig, InventoryConfig, ManualFileConfig, RemoteFileConfig, RestConfig};
use crate::crypto::CredentialCipher;
use crate::database::DatabaseConnector;
use crate::error::ConnectorError;
use crate::inventory::{InventoryApi, InventoryConnector};
use crate::object_file::{FileStorage, ObjectStorageFileConnector};
use crate::remote_file::RemoteFileConnector;
use crate::rest_api::RestApiConnector;
use crate::traits::SourceConnector;

pub struct ConnectorFactory {
    cipher: Arc<CredentialCipher>,
    storage: Arc<dyn FileStorage>,
    inventory: Arc<dyn InventoryApi>,
    bucket: String,
}

impl ConnectorFactory {
    pub fn new(
        cipher: Arc<CredentialCipher>,
        storage: Arc<dyn FileStorage>,
        inventory: Arc<dyn InventoryApi>,
        bucket: String,
    ) -> Self {
        Self {
            cipher,
            storage,
            inventory,
            bucket,
        }
    }

    /// Build the connector for a persisted source record.
    pub fn build(&self, source: &Source) -> Result<Box<dyn SourceConnector>, ConnectorError> {
        debug!(
            source_id = source.id,
            con_type = source.con_type.as_str(),
            "building connector"
        );
        let con_data = self.cipher.decrypt_json(&source.con_data)?;
        self.build_from_config(source, con_data)
    }

    fn build_from_config(
        &self,
        source: &Source,
        con_data: serde_json::Value,
    ) -> Result<Box<dyn SourceConnector>, ConnectorError> {
        match source.con_type {
            SourceType::Db => {
                let config: DbConfig = serde_json::from_value(con_data)?;
                Ok(Box::new(DatabaseConnector::new(config.validate()?)))
            }
            SourceType::RestApi => {
                let config: RestConfig = serde_json::from_value(con_data)?;
                Ok(Box::new(RestApiConnector::new(config.validate()?)?))
            }
            SourceType::File => {
                let tag = con_data
                    .get("import_type")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ConnectorError::Validation(
                            "File source configuration must carry import_type".to_string(),
                        )
                    })?
                    .to_string();
                let import_type: FileImportType =
                    serde_json::from_value(serde_json::Value::String(tag.clone())).map_err(
                        |_| {
                            ConnectorError::Validation(format!(
                                "Unsupported connection/import type pair ('File', '{tag}')"
                            ))
                        },
                    )?;

                match import_type {
                    FileImportType::Sftp | FileImportType::Ftp => {
                        let config: RemoteFileConfig = serde_json::from_value(con_data)?;
                        Ok(Box::new(RemoteFileConnector::new(config.validate()?)))
                    }
                    FileImportType::Manual => {
                        let config: ManualFileConfig = serde_json::from_value(con_data)?;
                        Ok(Box::new(ObjectStorageFileConnector::new(
                            source.id,
                            config.validate()?,
                            Arc::clone(&self.storage),
                            self.bucket.clone(),
                        )))
                    }
                }
            }
            SourceType::Inventory => {
                let config: InventoryConfig = serde_json::from_value(con_data)?;
                Ok(Box::new(InventoryConnector::new(
                    config.validate()?,
                    Arc::clone(&self.inventory),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use indexmap::IndexMap;

    use crate::object_file::StorageError;
    use crate::types::DataTable;

    struct NullStorage;

    #[async_trait]
    impl FileStorage for NullStorage {
        async fn get_object(
            &self,
            _bucket: &str,
            _key: &str,
            _range: Option<(u64, u64)>,
        ) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::NoSuchKey)
        }

        async fn put_object(
            &self,
            _bucket: &str,
            _key: &str,
            _body: Vec<u8>,
            _content_type: &str,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn remove_object(&self, _bucket: &str, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    struct NullInventory;

    #[async_trait]
    impl InventoryApi for NullInventory {
        async fn get_columns(&self, _tmo_id: i64) -> Result<Vec<String>, ConnectorError> {
            Ok(Vec::new())
        }

        async fn get_columns_with_types(
            &self,
            _tmo_id: i64,
            _columns: &[String],
        ) -> Result<IndexMap<String, String>, ConnectorError> {
            Ok(IndexMap::new())
        }

        async fn get_data(
            &self,
            _tmo_id: i64,
            _columns: &[String],
            _limit: i64,
            _offset: Option<i64>,
        ) -> Result<DataTable, ConnectorError> {
            Ok(DataTable::default())
        }
    }

    fn factory() -> (ConnectorFactory, Arc<CredentialCipher>) {
        let cipher = Arc::new(
            CredentialCipher::from_key("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").unwrap(),
        );
        let factory = ConnectorFactory::new(
            Arc::clone(&cipher),
            Arc::new(NullStorage),
            Arc::new(NullInventory),
            "dataflow".to_string(),
        );
        (factory, cipher)
    }

    fn source(con_type: SourceType, con_data: serde_json::Value, cipher: &CredentialCipher) -> Source {
        Source {
            id: 11,
            name: "s".to_string(),
            group_id: 1,
            con_type,
            con_data: cipher.encrypt(&con_data.to_string()).unwrap(),
        }
    }

    #[test]
    fn test_builds_every_supported_type() {
        let (factory, cipher) = factory();

        let db = source(
            SourceType::Db,
            serde_json::json!({
                "db_type": "postgresql", "host": "db", "port": 5432,
                "user": "u", "password": "p", "db_name": "d", "db_table": "t"
            }),
            &cipher,
        );
        factory.build(&db).unwrap();

        let rest = source(
            SourceType::RestApi,
            serde_json::json!({
                "end_point": "https://api.example.com/items",
                "auth_type": "No authentication"
            }),
            &cipher,
        );
        factory.build(&rest).unwrap();

        let sftp = source(
            SourceType::File,
            serde_json::json!({
                "import_type": "SFTP", "host": "h", "port": 22,
                "login": "l", "password": "p",
                "file": {"file_name": "export.csv"}
            }),
            &cipher,
        );
        factory.build(&sftp).unwrap();

        let manual = source(
            SourceType::File,
            serde_json::json!({"import_type": "Manual", "filename": "upload.csv"}),
            &cipher,
        );
        factory.build(&manual).unwrap();

        let inventory = source(
            SourceType::Inventory,
            serde_json::json!({"tmo_id": 5}),
            &cipher,
        );
        factory.build(&inventory).unwrap();
    }

    #[test]
    fn test_unknown_import_type_is_validation_error() {
        let (factory, cipher) = factory();
        let bad = source(
            SourceType::File,
            serde_json::json!({"import_type": "Carrier pigeon", "file": {"file_name": "x.csv"}}),
            &cipher,
        );
        assert!(matches!(
            factory.build(&bad),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_import_type_is_validation_error() {
        let (factory, cipher) = factory();
        let bad = source(SourceType::File, serde_json::json!({"x": 1}), &cipher);
        assert!(matches!(
            factory.build(&bad),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_tampered_con_data_is_internal_error() {
        let (factory, cipher) = factory();
        let mut record = source(SourceType::Inventory, serde_json::json!({"tmo_id": 5}), &cipher);
        record.con_data = "not-a-token".to_string();
        assert!(matches!(
            factory.build(&record),
            Err(ConnectorError::Internal(_))
        ));
    }
}
