//! REST API connector.
//!
//! One configured endpoint is fetched with the configured auth strategy and
//! the response shape is inferred: a file attachment, a JSON object (single
//! row), an array of objects (multi-row) or an array of scalars (single
//! column). Anything else has no decoder and is an internal error, never a
//! silent coercion.

use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, Method, Response, StatusCode};
use tracing::debug;

use crate::auth::AuthScheme;
use crate::config::{HttpMethod, RestConfig};
use crate::error::ConnectorError;
use crate::file_layout::{parse_delimited, sniff_delimiter};
use crate::traits::{stream_table, RowStream, SourceConnector};
use crate::types::{clean_columns, ColumnSchema, DataTable};

/// Single-column name used for array-of-scalars responses.
const VALUES_COLUMN: &str = "values";

pub struct RestApiConnector {
    client: Client,
    config: RestConfig,
    auth: AuthScheme,
}

impl RestApiConnector {
    /// Build from an already validated configuration. The auth strategy is
    /// resolved here, so an unsupported scheme never reaches a request.
    pub fn new(config: RestConfig) -> Result<Self, ConnectorError> {
        let auth = config.auth_scheme()?;
        Ok(Self {
            client: Client::new(),
            config,
            auth,
        })
    }

    fn method(&self) -> Method {
        match self.config.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }

    async fn execute(&self) -> Result<Response, ConnectorError> {
        debug!(end_point = %self.config.end_point, "requesting REST source");
        self.auth
            .send(
                &self.client,
                self.method(),
                &self.config.end_point,
                self.config.query_params.as_ref(),
                self.config.body_params.as_ref(),
            )
            .await
    }

    /// Fetch the endpoint and decode the response into a table.
    async fn fetch_table(&self) -> Result<DataTable, ConnectorError> {
        let response = self.execute().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(ConnectorError::SourceConnection(
                    "Authentication failed!".to_string(),
                ))
            }
            StatusCode::NOT_FOUND => {
                return Err(ConnectorError::ResourceNotFound(format!(
                    "Endpoint '{}' does not exist!",
                    self.config.end_point
                )))
            }
            status if !status.is_success() => {
                return Err(ConnectorError::SourceConnection(format!(
                    "Service responded with error ({})!",
                    status.as_u16()
                )))
            }
            _ => {}
        }

        if let Some(file_name) = attachment_filename(&response) {
            let body = response.text().await?;
            return decode_attachment(&file_name, &body);
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            ConnectorError::Internal("Response body is not valid JSON".to_string())
        })?;

        let value = self.unwrap_object_name(value);
        value_to_table(&value)
    }

    /// Descend into the configured response object member, when present.
    fn unwrap_object_name(&self, value: serde_json::Value) -> serde_json::Value {
        let Some(name) = &self.config.obj_name_from_resp else {
            return value;
        };
        match value {
            serde_json::Value::Object(mut map) => match map.remove(name) {
                Some(inner) => inner,
                None => serde_json::Value::Object(map),
            },
            other => other,
        }
    }
}

/// Attachment filename from `content-disposition`, when the response is a
/// downloadable file.
fn attachment_filename(response: &Response) -> Option<String> {
    let header = response
        .headers()
        .get(CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    if !header.trim_start().starts_with("attachment") {
        return None;
    }
    let (_, rest) = header.split_once("filename=")?;
    let rest = rest.trim();
    let name = rest
        .strip_prefix('"')
        .and_then(|r| r.split('"').next())
        .unwrap_or_else(|| rest.split(';').next().unwrap_or(rest));
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Extension-dispatched attachment decoding.
fn decode_attachment(file_name: &str, body: &str) -> Result<DataTable, ConnectorError> {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match extension {
        "csv" | "txt" => {
            let first_line = body.lines().next().unwrap_or_default();
            parse_delimited(body, sniff_delimiter(first_line))
        }
        "json" => {
            let value: serde_json::Value = serde_json::from_str(body).map_err(|_| {
                ConnectorError::Internal("Attached file is not valid JSON".to_string())
            })?;
            value_to_table(&value)
        }
        other => Err(ConnectorError::Internal(format!(
            "File reader for extension '.{other}' is not implemented."
        ))),
    }
}

fn json_cell(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        // Nested structures are carried as compact JSON text
        other => serde_json::to_string(other).ok(),
    }
}

/// Decode a JSON document into tabular form based on its shape.
pub fn value_to_table(value: &serde_json::Value) -> Result<DataTable, ConnectorError> {
    match value {
        serde_json::Value::Object(map) => {
            let mut table = DataTable::new(map.keys().cloned().collect());
            table.rows.push(map.values().map(json_cell).collect());
            Ok(table)
        }
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Ok(DataTable::default());
            }
            if items.iter().all(|item| item.is_object()) {
                // Column order: first appearance across the documents
                let mut columns: Vec<String> = Vec::new();
                for item in items {
                    for key in item.as_object().expect("checked above").keys() {
                        if !columns.iter().any(|c| c == key) {
                            columns.push(key.clone());
                        }
                    }
                }
                let mut table = DataTable::new(columns);
                for item in items {
                    let object = item.as_object().expect("checked above");
                    let row = table
                        .columns
                        .iter()
                        .map(|column| object.get(column).and_then(json_cell))
                        .collect();
                    table.rows.push(row);
                }
                Ok(table)
            } else if items.iter().all(|item| !item.is_object() && !item.is_array()) {
                let mut table = DataTable::new(vec![VALUES_COLUMN.to_string()]);
                for item in items {
                    table.rows.push(vec![json_cell(item)]);
                }
                Ok(table)
            } else {
                Err(ConnectorError::Internal(
                    "Not implemented parser for mixed-shape response array".to_string(),
                ))
            }
        }
        other => Err(ConnectorError::Internal(format!(
            "Not implemented parser for response type = {other:?}"
        ))),
    }
}

#[async_trait]
impl SourceConnector for RestApiConnector {
    async fn check_connection(&self) -> Result<(), ConnectorError> {
        let response = self.execute().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ConnectorError::SourceConnection(
                "Authentication failed!".to_string(),
            ));
        }
        if response.status() != StatusCode::OK {
            return Err(ConnectorError::SourceConnection(format!(
                "Service responded with error ({})!",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn get_columns(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.fetch_table().await?.columns)
    }

    async fn get_columns_with_types(&self) -> Result<ColumnSchema, ConnectorError> {
        // Callers fall back to sample-based inference on this error
        Err(ConnectorError::Internal(
            "get_columns_with_types is not supported for RestAPI sources".to_string(),
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
        let table = self.fetch_table().await?;
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
