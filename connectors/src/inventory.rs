//! Inventory-service connector.
//!
//! A thin translation layer over the external inventory RPC service, keyed
//! by a numeric object-type identifier. No local parsing or credential
//! handling happens here; an unavailable service propagates unchanged as a
//! connection error.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::InventoryConfig;
use crate::error::ConnectorError;
use crate::infer::{RESERVED_HIERARCHY_COLUMN, RESERVED_ID_COLUMN};
use crate::traits::{stream_table, RowStream, SourceConnector};
use crate::types::{clean_columns, ColumnSchema, ColumnType, DataTable};

/// Row cap for one inventory fetch.
pub const DEFAULT_FETCH_LIMIT: i64 = 5000;

/// Boundary interface to the inventory RPC service; the transport lives
/// outside this crate.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn get_columns(&self, tmo_id: i64) -> Result<Vec<String>, ConnectorError>;

    async fn get_columns_with_types(
        &self,
        tmo_id: i64,
        columns: &[String],
    ) -> Result<IndexMap<String, String>, ConnectorError>;

    async fn get_data(
        &self,
        tmo_id: i64,
        columns: &[String],
        limit: i64,
        offset: Option<i64>,
    ) -> Result<DataTable, ConnectorError>;
}

pub struct InventoryConnector {
    config: InventoryConfig,
    api: Arc<dyn InventoryApi>,
}

impl InventoryConnector {
    pub fn new(config: InventoryConfig, api: Arc<dyn InventoryApi>) -> Self {
        Self { config, api }
    }
}

#[async_trait]
impl SourceConnector for InventoryConnector {
    async fn check_connection(&self) -> Result<(), ConnectorError> {
        // The inventory service carries no per-source connection state
        Ok(())
    }

    async fn get_columns(&self) -> Result<Vec<String>, ConnectorError> {
        self.api.get_columns(self.config.tmo_id).await
    }

    async fn get_columns_with_types(&self) -> Result<ColumnSchema, ConnectorError> {
        let requested = self.config.source_data_columns.clone().unwrap_or_default();
        let raw = self
            .api
            .get_columns_with_types(self.config.tmo_id, &requested)
            .await?;

        let mut schema: ColumnSchema = raw
            .into_iter()
            .map(|(name, tag)| (name, ColumnType::from_tag(&tag)))
            .collect();

        // Reserved columns always present, always fixed
        schema.insert(RESERVED_ID_COLUMN.to_string(), ColumnType::Int);
        schema.insert(RESERVED_HIERARCHY_COLUMN.to_string(), ColumnType::Str);
        Ok(schema)
    }

    async fn get_cleaned_columns(&self) -> Result<Vec<String>, ConnectorError> {
        let columns = self.get_columns().await?;
        Ok(clean_columns(
            columns,
            self.config.source_data_columns.as_deref(),
        ))
    }

    async fn get_all_data(&self) -> Result<DataTable, ConnectorError> {
        let columns = self.get_cleaned_columns().await?;
        self.api
            .get_data(self.config.tmo_id, &columns, DEFAULT_FETCH_LIMIT, None)
            .await
    }

    async fn stream_rows(&self, source_id: i64) -> Result<RowStream, ConnectorError> {
        let table = self.get_all_data().await?;
        Ok(stream_table(source_id, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeInventory {
        unavailable: bool,
    }

    #[async_trait]
    impl InventoryApi for FakeInventory {
        async fn get_columns(&self, _tmo_id: i64) -> Result<Vec<String>, ConnectorError> {
            if self.unavailable {
                return Err(ConnectorError::SourceConnection(
                    "inventory RPC unavailable".to_string(),
                ));
            }
            Ok(vec![
                "tmo_id".to_string(),
                "name".to_string(),
                "parent_name".to_string(),
            ])
        }

        async fn get_columns_with_types(
            &self,
            _tmo_id: i64,
            _columns: &[String],
        ) -> Result<IndexMap<String, String>, ConnectorError> {
            let mut map = IndexMap::new();
            map.insert("tmo_id".to_string(), "str".to_string());
            map.insert("name".to_string(), "str".to_string());
            Ok(map)
        }

        async fn get_data(
            &self,
            _tmo_id: i64,
            columns: &[String],
            limit: i64,
            _offset: Option<i64>,
        ) -> Result<DataTable, ConnectorError> {
            assert_eq!(limit, DEFAULT_FETCH_LIMIT);
            let mut table = DataTable::new(columns.to_vec());
            table
                .rows
                .push(columns.iter().map(|_| Some("x".to_string())).collect());
            Ok(table)
        }
    }

    fn connector(unavailable: bool, columns: Option<Vec<String>>) -> InventoryConnector {
        InventoryConnector::new(
            InventoryConfig {
                tmo_id: 3,
                source_data_columns: columns,
            },
            Arc::new(FakeInventory { unavailable }),
        )
    }

    #[tokio::test]
    async fn test_reserved_columns_forced_in_typed_schema() {
        let schema = connector(false, None).get_columns_with_types().await.unwrap();
        // Service reported tmo_id as str; the reservation wins
        assert_eq!(schema["tmo_id"], ColumnType::Int);
        assert_eq!(schema["parent_name"], ColumnType::Str);
        assert_eq!(schema["name"], ColumnType::Str);
    }

    #[tokio::test]
    async fn test_cleaned_columns_intersect_in_origin_order() {
        let connector = connector(
            false,
            Some(vec!["parent_name".to_string(), "tmo_id".to_string()]),
        );
        assert_eq!(
            connector.get_cleaned_columns().await.unwrap(),
            vec!["tmo_id".to_string(), "parent_name".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rpc_failure_propagates_unchanged() {
        let result = connector(true, None).get_columns().await;
        assert!(matches!(result, Err(ConnectorError::SourceConnection(_))));
    }

    #[tokio::test]
    async fn test_get_all_data_uses_cleaned_columns() {
        let connector = connector(false, Some(vec!["name".to_string()]));
        let table = connector.get_all_data().await.unwrap();
        assert_eq!(table.columns, vec!["name".to_string()]);
        assert_eq!(table.row_count(), 1);
    }
}
