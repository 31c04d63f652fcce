use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use dataflow_models::RowMessage;

use crate::error::ConnectorError;
use crate::types::{ColumnSchema, DataTable};

/// Lazy, finite, non-restartable sequence of stream-sink rows.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<RowMessage, ConnectorError>> + Send>>;

/// Uniform extraction contract every origin type implements.
///
/// Connectors are stateless across calls except for instance-local caches of
/// downloaded files; nothing connects at construction time, and no method
/// retries internally.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Fails with [`ConnectorError::SourceConnection`] if the origin is
    /// unreachable or rejects the configured credentials.
    async fn check_connection(&self) -> Result<(), ConnectorError>;

    /// Ordered list of column names discovered at the origin.
    async fn get_columns(&self) -> Result<Vec<String>, ConnectorError>;

    /// Column name to type tag. Origins without cheap type discovery return
    /// [`ConnectorError::Internal`] ("not supported"); callers treat that as
    /// a fallback trigger, not a fatal error.
    async fn get_columns_with_types(&self) -> Result<ColumnSchema, ConnectorError>;

    /// Intersection of the configured column allow-list with the discovered
    /// columns, in origin order; all discovered columns when no allow-list
    /// was configured.
    async fn get_cleaned_columns(&self) -> Result<Vec<String>, ConnectorError>;

    /// Full extraction restricted to the cleaned columns.
    async fn get_all_data(&self) -> Result<DataTable, ConnectorError>;

    /// Row stream for the ingestion pipeline. Each row repeats the total row
    /// count known at stream start. One generator per call, consumed to
    /// exhaustion or abandoned by the caller; no internal concurrency.
    async fn stream_rows(&self, source_id: i64) -> Result<RowStream, ConnectorError>;
}

/// Turn a materialized table into the stream-sink row sequence.
pub fn stream_table(source_id: i64, table: DataTable) -> RowStream {
    let count = table.row_count() as i64;
    Box::pin(async_stream::stream! {
        for index in 0..table.row_count() {
            let data_row = table.row_map(index);
            yield Ok(RowMessage::new(source_id, count, data_row));
        }
    })
}
