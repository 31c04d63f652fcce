//! Relational database connector.
//!
//! Schema discovery reflects `information_schema`; extraction optionally
//! restricts rows to a sliding one-day window over a configured date column.
//! Connections are scoped per call — opened, used, closed — with no pooling.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use once_cell::sync::OnceCell;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Connection, Row};
use tracing::debug;

use crate::config::{DbConfig, DbDriver};
use crate::error::ConnectorError;
use crate::traits::{stream_table, RowStream, SourceConnector};
use crate::types::{clean_columns, ColumnSchema, ColumnType, DataTable};
use crate::infer::parse_datetime_lenient;

static DRIVERS: OnceCell<()> = OnceCell::new();

fn install_drivers() {
    DRIVERS.get_or_init(sqlx::any::install_default_drivers);
}

/// Map a native column type name onto the five-way tag by substring
/// matching against the lower-cased name.
pub fn map_data_type(native: &str) -> ColumnType {
    let native = native.to_lowercase();
    if native.contains("int") {
        ColumnType::Int
    } else if ["float", "double", "numeric", "real"]
        .iter()
        .any(|t| native.contains(t))
    {
        ColumnType::Float
    } else if native.contains("date") {
        ColumnType::Datetime
    } else if native.contains("boolean") {
        ColumnType::Bool
    } else {
        ColumnType::Str
    }
}

/// Native types that must be cast to text in the select list so the
/// driver-agnostic row decoder can read them.
fn is_temporal(native: &str) -> bool {
    let native = native.to_lowercase();
    native.contains("date") || native.contains("time")
}

/// Resolve the one-day extraction window. `max_date` is the current maximum
/// of the date column; an empty table falls back to `today - offset` as the
/// exclusive upper bound.
pub fn incremental_window(
    max_date: Option<NaiveDateTime>,
    offset: i64,
    today: NaiveDate,
) -> (NaiveDateTime, NaiveDateTime) {
    let right = max_date.unwrap_or_else(|| {
        (today - Duration::days(offset))
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
    });
    let left = right - Duration::days(1);
    (left, right)
}

pub struct DatabaseConnector {
    config: DbConfig,
}

impl DatabaseConnector {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    /// Quote an identifier for interpolation. Only `[A-Za-z0-9_]` names are
    /// accepted; anything else never reaches a query string.
    fn quote_ident(&self, name: &str) -> Result<String, ConnectorError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConnectorError::Validation(format!(
                "'{name}' is not a valid identifier"
            )));
        }
        Ok(match self.config.db_type {
            DbDriver::Postgresql => format!("\"{name}\""),
            DbDriver::Mysql => format!("`{name}`"),
        })
    }

    fn schema_filter(&self) -> &str {
        match self.config.db_type {
            DbDriver::Postgresql => "table_schema = 'public'",
            DbDriver::Mysql => "table_schema = DATABASE()",
        }
    }

    async fn connect(&self) -> Result<AnyConnection, ConnectorError> {
        install_drivers();
        AnyConnection::connect(&self.config.connection_url())
            .await
            .map_err(|e| ConnectorError::SourceConnection(e.to_string()))
    }

    fn table_name(&self) -> Result<&str, ConnectorError> {
        self.config.db_table.as_deref().ok_or_else(|| {
            ConnectorError::Internal("db_table must be set before reading the table".to_string())
        })
    }

    /// All tables visible in the configured database.
    pub async fn get_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let mut conn = self.connect().await?;
        let sql = format!(
            "SELECT table_name FROM information_schema.tables WHERE {} ORDER BY table_name",
            self.schema_filter()
        );
        let rows = sqlx::query(&sql).fetch_all(&mut conn).await?;
        conn.close().await.ok();

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| ConnectorError::SourceConnection(e.to_string()))
            })
            .collect()
    }

    /// `(column_name, native_type)` pairs in schema order; fails with
    /// `ResourceNotFound` when the configured table does not exist.
    async fn reflect_columns(
        &self,
        conn: &mut AnyConnection,
    ) -> Result<Vec<(String, String)>, ConnectorError> {
        let table = self.table_name()?;
        // Identifier check keeps the literal interpolation safe
        self.quote_ident(table)?;

        let sql = format!(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE {} AND table_name = '{table}' ORDER BY ordinal_position",
            self.schema_filter()
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

        if rows.is_empty() {
            return Err(ConnectorError::ResourceNotFound(format!(
                "Table with name '{table}' does not exist!"
            )));
        }

        rows.iter()
            .map(|row| {
                let name = row
                    .try_get::<String, _>(0)
                    .map_err(|e| ConnectorError::SourceConnection(e.to_string()))?;
                let native = row
                    .try_get::<String, _>(1)
                    .map_err(|e| ConnectorError::SourceConnection(e.to_string()))?;
                Ok((name, native))
            })
            .collect()
    }

    /// Columns usable as an incremental date column.
    pub async fn get_datetime_columns(&self) -> Result<Vec<String>, ConnectorError> {
        let mut conn = self.connect().await?;
        let columns = self.reflect_columns(&mut conn).await?;
        conn.close().await.ok();

        Ok(columns
            .into_iter()
            .filter(|(_, native)| is_temporal(native))
            .map(|(name, _)| name)
            .collect())
    }

    /// Current `MAX(date_column)`, read back as text.
    async fn max_date(
        &self,
        conn: &mut AnyConnection,
        date_column: &str,
    ) -> Result<Option<NaiveDateTime>, ConnectorError> {
        let table = self.quote_ident(self.table_name()?)?;
        let column = self.quote_ident(date_column)?;
        let sql = match self.config.db_type {
            DbDriver::Postgresql => format!("SELECT MAX({column})::text FROM {table}"),
            DbDriver::Mysql => format!("SELECT CAST(MAX({column}) AS CHAR) FROM {table}"),
        };

        let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
        let raw: Option<String> = row
            .try_get(0)
            .map_err(|e| ConnectorError::SourceConnection(e.to_string()))?;
        Ok(raw.as_deref().and_then(parse_datetime_lenient))
    }

    fn select_expr(&self, name: &str, native: &str) -> Result<String, ConnectorError> {
        let quoted = self.quote_ident(name)?;
        if is_temporal(native) {
            Ok(match self.config.db_type {
                DbDriver::Postgresql => format!("{quoted}::text AS {quoted}"),
                DbDriver::Mysql => format!("CAST({quoted} AS CHAR) AS {quoted}"),
            })
        } else {
            Ok(quoted)
        }
    }

    fn decode_cell(row: &AnyRow, index: usize, tag: ColumnType) -> Option<String> {
        match tag {
            ColumnType::Int => {
                if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
                    return value.map(|v| v.to_string());
                }
            }
            ColumnType::Float => {
                if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
                    return value.map(|v| v.to_string());
                }
            }
            ColumnType::Bool => {
                if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
                    return value.map(|v| v.to_string());
                }
            }
            _ => {}
        }
        row.try_get::<Option<String>, _>(index).ok().flatten()
    }
}

#[async_trait]
impl SourceConnector for DatabaseConnector {
    async fn check_connection(&self) -> Result<(), ConnectorError> {
        let mut conn = self.connect().await?;
        // Reflection doubles as the health probe
        let sql = format!(
            "SELECT table_name FROM information_schema.tables WHERE {} LIMIT 1",
            self.schema_filter()
        );
        sqlx::query(&sql).fetch_all(&mut conn).await?;
        conn.close().await.ok();
        Ok(())
    }

    async fn get_columns(&self) -> Result<Vec<String>, ConnectorError> {
        let mut conn = self.connect().await?;
        let columns = self.reflect_columns(&mut conn).await?;
        conn.close().await.ok();
        Ok(columns.into_iter().map(|(name, _)| name).collect())
    }

    async fn get_columns_with_types(&self) -> Result<ColumnSchema, ConnectorError> {
        let mut conn = self.connect().await?;
        let columns = self.reflect_columns(&mut conn).await?;
        conn.close().await.ok();

        let mut schema = ColumnSchema::new();
        for (name, native) in columns {
            schema.insert(name, map_data_type(&native));
        }
        if let Some(allow) = &self.config.source_data_columns {
            if !allow.is_empty() {
                schema.retain(|name, _| allow.iter().any(|a| a == name));
            }
        }
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
        let mut conn = self.connect().await?;
        let reflected = self.reflect_columns(&mut conn).await?;

        let allow = self.config.source_data_columns.as_deref();
        let cleaned: Vec<(String, String)> = {
            let names = clean_columns(
                reflected.iter().map(|(n, _)| n.clone()).collect(),
                allow,
            );
            reflected
                .into_iter()
                .filter(|(name, _)| names.iter().any(|n| n == name))
                .collect()
        };

        let select_list = cleaned
            .iter()
            .map(|(name, native)| self.select_expr(name, native))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let table = self.quote_ident(self.table_name()?)?;
        let mut sql = format!("SELECT {select_list} FROM {table}");

        if let Some(date_column) = &self.config.date_column {
            let offset = self.config.offset.unwrap_or(0);
            let max = self.max_date(&mut conn, date_column).await?;
            let (left, right) = incremental_window(max, offset, Local::now().date_naive());
            let column = self.quote_ident(date_column)?;
            sql.push_str(&format!(
                " WHERE {column} >= '{}' AND {column} < '{}'",
                left.format("%Y-%m-%d %H:%M:%S"),
                right.format("%Y-%m-%d %H:%M:%S"),
            ));
        }

        debug!(query = %sql, "extracting table window");
        let rows = sqlx::query(&sql).fetch_all(&mut conn).await?;
        conn.close().await.ok();

        let tags: Vec<ColumnType> = cleaned
            .iter()
            .map(|(_, native)| map_data_type(native))
            .collect();

        let mut table = DataTable::new(cleaned.into_iter().map(|(name, _)| name).collect());
        for row in rows {
            let cells = tags
                .iter()
                .enumerate()
                .map(|(index, tag)| Self::decode_cell(&row, index, *tag))
                .collect();
            table.rows.push(cells);
        }
        Ok(table)
    }

    async fn stream_rows(&self, source_id: i64) -> Result<RowStream, ConnectorError> {
        let table = self.get_all_data().await?;
        Ok(stream_table(source_id, table))
    }
}
