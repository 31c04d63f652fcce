use serde::{Deserialize, Serialize};

/// Registered origin kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceType {
    #[serde(rename = "RestAPI")]
    RestApi,
    #[serde(rename = "DB")]
    Db,
    File,
    Inventory,
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::RestApi => "RestAPI",
            SourceType::Db => "DB",
            SourceType::File => "File",
            SourceType::Inventory => "Inventory",
        }
    }
}

/// How a File source reaches its file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FileImportType {
    #[serde(rename = "SFTP")]
    Sftp,
    #[serde(rename = "FTP")]
    Ftp,
    Manual,
}

impl FileImportType {
    pub fn as_str(&self) -> &str {
        match self {
            FileImportType::Sftp => "SFTP",
            FileImportType::Ftp => "FTP",
            FileImportType::Manual => "Manual",
        }
    }
}

/// Egress-capable endpoint kinds. Currently remote-file only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DestinationType {
    #[serde(rename = "SFTP")]
    Sftp,
}

/// A registered data origin.
///
/// `con_data` is the encrypted connection-configuration token; it is never
/// persisted or transmitted in clear text. `(group_id, name)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub group_id: i64,
    pub con_type: SourceType,
    pub con_data: String,
}

/// A registered egress endpoint; same record shape as [`Source`] but
/// restricted to egress-capable connector types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: i64,
    pub name: String,
    pub group_id: i64,
    pub con_type: DestinationType,
    pub con_data: String,
}
