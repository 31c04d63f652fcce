//! Decrypted connection-configuration documents.
//!
//! Each shape is parsed from the decrypted `con_data` JSON in one step and
//! validated as a whole object; a field violation rejects the entire
//! document with a [`ConnectorError::Validation`]. Connectors only ever see
//! configurations that already passed validation.

use chrono::NaiveDate;
use serde::Deserialize;

use dataflow_models::FileImportType;

use crate::auth::AuthScheme;
use crate::error::ConnectorError;

/// File extensions the tabular parsing pipeline understands.
pub const SUPPORTED_FILE_EXTENSIONS: &[&str] = &["csv", "txt"];

fn validate_columns(columns: &Option<Vec<String>>) -> Result<(), ConnectorError> {
    if let Some(columns) = columns {
        if columns.iter().any(|c| c.is_empty()) {
            return Err(ConnectorError::Validation(
                "source_data_columns can't have empty column names".to_string(),
            ));
        }
    }
    Ok(())
}

/// `offset` is meaningful iff the paired date field is set: an offset
/// without the date field is cleared, a date field without an offset gets 0.
fn normalize_offset(has_date_field: bool, offset: Option<i64>) -> Result<Option<i64>, ConnectorError> {
    if let Some(offset) = offset {
        if offset < 0 {
            return Err(ConnectorError::Validation(
                "offset must be zero or positive".to_string(),
            ));
        }
    }
    Ok(match (has_date_field, offset) {
        (false, _) => None,
        (true, None) => Some(0),
        (true, some) => some,
    })
}

fn file_extension(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

fn validate_file_name(file_name: &str) -> Result<(), ConnectorError> {
    if file_name.is_empty() {
        return Err(ConnectorError::Validation(
            "file_name must not be empty".to_string(),
        ));
    }
    match file_extension(file_name) {
        Some(ext) if SUPPORTED_FILE_EXTENSIONS.contains(&ext) => Ok(()),
        Some(ext) => Err(ConnectorError::Validation(format!(
            "Wrong file extension - '.{ext}'. Supported extensions are: {SUPPORTED_FILE_EXTENSIONS:?}"
        ))),
        None => Err(ConnectorError::Validation(
            "file_name must carry a file extension".to_string(),
        )),
    }
}

/// Logical database driver tags mapped onto connection-URL schemes.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DbDriver {
    Postgresql,
    Mysql,
}

impl DbDriver {
    /// Connection-scheme string for the driver.
    pub fn scheme(&self) -> &str {
        match self {
            DbDriver::Postgresql => "postgres",
            DbDriver::Mysql => "mysql",
        }
    }
}

/// Relational source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub db_type: DbDriver,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
    #[serde(default)]
    pub db_table: Option<String>,
    #[serde(default)]
    pub date_column: Option<String>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub source_data_columns: Option<Vec<String>>,
}

impl DbConfig {
    pub fn validate(mut self) -> Result<Self, ConnectorError> {
        if self.host.is_empty() {
            return Err(ConnectorError::Validation("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectorError::Validation("port must be positive".to_string()));
        }
        if self.user.is_empty() || self.db_name.is_empty() {
            return Err(ConnectorError::Validation(
                "user and db_name must not be empty".to_string(),
            ));
        }
        validate_columns(&self.source_data_columns)?;
        self.offset = normalize_offset(self.date_column.is_some(), self.offset)?;
        Ok(self)
    }

    pub fn connection_url(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}",
            self.db_type.scheme(),
            self.user,
            self.password,
            self.host,
            self.port,
            self.db_name
        )
    }
}

/// HTTP methods accepted for REST sources.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    #[serde(rename = "get", alias = "GET")]
    Get,
    #[serde(rename = "post", alias = "POST")]
    Post,
}

/// REST source configuration. `auth_data` is matched against `auth_type`
/// during validation, so an unknown or mismatched auth scheme fails here and
/// never at call time.
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    #[serde(default)]
    pub entry_point: Option<String>,
    pub end_point: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub query_params: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub body_params: Option<serde_json::Map<String, serde_json::Value>>,
    pub auth_type: String,
    #[serde(default)]
    pub auth_data: serde_json::Value,
    #[serde(default, rename = "obj_name_from_resp")]
    pub obj_name_from_resp: Option<String>,
    #[serde(default)]
    pub source_data_columns: Option<Vec<String>>,
}

impl RestConfig {
    pub fn validate(self) -> Result<Self, ConnectorError> {
        if self.end_point.is_empty() {
            return Err(ConnectorError::Validation(
                "end_point must not be empty".to_string(),
            ));
        }
        validate_columns(&self.source_data_columns)?;
        // Reject unknown auth types and mismatched auth_data up front
        AuthScheme::from_parts(&self.auth_type, &self.auth_data)?;
        Ok(self)
    }

    pub fn auth_scheme(&self) -> Result<AuthScheme, ConnectorError> {
        AuthScheme::from_parts(&self.auth_type, &self.auth_data)
    }
}

/// Supported orderings for date-patterned rolling filenames.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum DatePattern {
    #[serde(rename = "DDMMYYYY")]
    DayMonthYear,
    #[serde(rename = "MMDDYYYY")]
    MonthDayYear,
    #[serde(rename = "YYYYMMDD")]
    YearMonthDay,
}

impl DatePattern {
    /// The literal token that appears inside `file_name`.
    pub fn token(&self) -> &str {
        match self {
            DatePattern::DayMonthYear => "DDMMYYYY",
            DatePattern::MonthDayYear => "MMDDYYYY",
            DatePattern::YearMonthDay => "YYYYMMDD",
        }
    }

    pub fn format_date(&self, date: NaiveDate) -> String {
        let format = match self {
            DatePattern::DayMonthYear => "%d%m%Y",
            DatePattern::MonthDayYear => "%m%d%Y",
            DatePattern::YearMonthDay => "%Y%m%d",
        };
        date.format(format).to_string()
    }
}

fn default_file_path() -> String {
    "/".to_string()
}

/// Target file descriptor for remote (SFTP/FTP) sources.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFileSpec {
    #[serde(default = "default_file_path")]
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub date_pattern: Option<DatePattern>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// SFTP/FTP source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFileConfig {
    pub import_type: FileImportType,
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub file: RemoteFileSpec,
    #[serde(default)]
    pub source_data_columns: Option<Vec<String>>,
}

impl RemoteFileConfig {
    pub fn validate(mut self) -> Result<Self, ConnectorError> {
        if self.host.is_empty() {
            return Err(ConnectorError::Validation("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectorError::Validation("port must be positive".to_string()));
        }
        if self.login.is_empty() || self.password.is_empty() {
            return Err(ConnectorError::Validation(
                "login and password must not be empty".to_string(),
            ));
        }
        validate_file_name(&self.file.file_name)?;
        if let Some(pattern) = self.file.date_pattern {
            if !self.file.file_name.contains(pattern.token()) {
                return Err(ConnectorError::Validation(
                    "Date pattern must be provided in file name!".to_string(),
                ));
            }
        }
        validate_columns(&self.source_data_columns)?;
        self.file.offset = normalize_offset(self.file.date_pattern.is_some(), self.file.offset)?;
        Ok(self)
    }
}

/// Manually uploaded (object-storage) source configuration.
///
/// Historic records carry the filename under either `file_name` or
/// `filename`; both are accepted here and neither is authoritative.
/// TODO: migrate persisted records to one key and drop the alias.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualFileConfig {
    #[serde(alias = "filename")]
    pub file_name: String,
    #[serde(default)]
    pub source_data_columns: Option<Vec<String>>,
}

impl ManualFileConfig {
    pub fn validate(self) -> Result<Self, ConnectorError> {
        validate_file_name(&self.file_name)?;
        validate_columns(&self.source_data_columns)?;
        Ok(self)
    }
}

/// Inventory-service source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    pub tmo_id: i64,
    #[serde(default)]
    pub source_data_columns: Option<Vec<String>>,
}

impl InventoryConfig {
    pub fn validate(self) -> Result<Self, ConnectorError> {
        if self.tmo_id <= 0 {
            return Err(ConnectorError::Validation(
                "tmo_id must be positive".to_string(),
            ));
        }
        validate_columns(&self.source_data_columns)?;
        Ok(self)
    }
}

/// SFTP destination (egress) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SftpDestinationConfig {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    #[serde(default = "default_file_path")]
    pub path: String,
}

impl SftpDestinationConfig {
    pub fn validate(self) -> Result<Self, ConnectorError> {
        if self.host.is_empty() {
            return Err(ConnectorError::Validation("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConnectorError::Validation("port must be positive".to_string()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_config(json: serde_json::Value) -> Result<DbConfig, ConnectorError> {
        let config: DbConfig = serde_json::from_value(json)?;
        config.validate()
    }

    #[test]
    fn test_db_config_offset_coupling() {
        // offset without date_column is cleared
        let config = db_config(serde_json::json!({
            "db_type": "postgresql", "host": "db", "port": 5432,
            "user": "u", "password": "p", "db_name": "d", "offset": 3
        }))
        .unwrap();
        assert_eq!(config.offset, None);

        // date_column without offset defaults offset to 0
        let config = db_config(serde_json::json!({
            "db_type": "mysql", "host": "db", "port": 3306,
            "user": "u", "password": "p", "db_name": "d", "date_column": "ts"
        }))
        .unwrap();
        assert_eq!(config.offset, Some(0));
    }

    #[test]
    fn test_db_config_unknown_driver_rejected() {
        let result: Result<DbConfig, _> = serde_json::from_value(serde_json::json!({
            "db_type": "oracle", "host": "db", "port": 1521,
            "user": "u", "password": "p", "db_name": "d"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_db_connection_url() {
        let config = db_config(serde_json::json!({
            "db_type": "postgresql", "host": "db.internal", "port": 5432,
            "user": "etl", "password": "pw", "db_name": "warehouse"
        }))
        .unwrap();
        assert_eq!(
            config.connection_url(),
            "postgres://etl:pw@db.internal:5432/warehouse"
        );
    }

    #[test]
    fn test_rest_config_unknown_auth_type() {
        let config: RestConfig = serde_json::from_value(serde_json::json!({
            "end_point": "https://api.example.com/items",
            "auth_type": "Kerberos",
            "auth_data": {}
        }))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_remote_file_pattern_must_be_in_name() {
        let config: RemoteFileConfig = serde_json::from_value(serde_json::json!({
            "import_type": "SFTP", "host": "h", "port": 22,
            "login": "l", "password": "p",
            "file": {"file_name": "export.csv", "date_pattern": "YYYYMMDD"}
        }))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_remote_file_offset_defaults_with_pattern() {
        let config: RemoteFileConfig = serde_json::from_value(serde_json::json!({
            "import_type": "FTP", "host": "h", "port": 21,
            "login": "l", "password": "p",
            "file": {"file_name": "export_YYYYMMDD.csv", "date_pattern": "YYYYMMDD"}
        }))
        .unwrap();
        let config = config.validate().unwrap();
        assert_eq!(config.file.offset, Some(0));
        assert_eq!(config.file.file_path, "/");
    }

    #[test]
    fn test_file_extension_rejected() {
        let config: ManualFileConfig = serde_json::from_value(serde_json::json!({
            "file_name": "upload.xlsx"
        }))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_manual_config_accepts_both_filename_keys() {
        let a: ManualFileConfig =
            serde_json::from_value(serde_json::json!({"file_name": "a.csv"})).unwrap();
        let b: ManualFileConfig =
            serde_json::from_value(serde_json::json!({"filename": "b.csv"})).unwrap();
        assert_eq!(a.file_name, "a.csv");
        assert_eq!(b.file_name, "b.csv");
    }

    #[test]
    fn test_inventory_config_requires_positive_id() {
        let config: InventoryConfig =
            serde_json::from_value(serde_json::json!({"tmo_id": 0})).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_column_names_rejected() {
        let config: InventoryConfig = serde_json::from_value(serde_json::json!({
            "tmo_id": 5, "source_data_columns": ["a", ""]
        }))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_date_pattern_formats() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(DatePattern::DayMonthYear.format_date(date), "02012024");
        assert_eq!(DatePattern::MonthDayYear.format_date(date), "01022024");
        assert_eq!(DatePattern::YearMonthDay.format_date(date), "20240102");
    }
}
