//! Source connector subsystem.
//!
//! Every registered origin (relational database, REST API, SFTP/FTP file
//! drop, manually uploaded object-storage file, external inventory service)
//! is driven through the same [`SourceConnector`] contract: connectivity
//! check, schema discovery, column cleaning, full extraction and row
//! streaming. The [`ConnectorFactory`] decrypts a persisted source record
//! and builds the matching implementation.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod destination;
pub mod error;
pub mod factory;
pub mod file_layout;
pub mod infer;
pub mod inventory;
pub mod object_file;
pub mod remote_file;
pub mod rest_api;
pub mod traits;
pub mod types;

pub use crypto::CredentialCipher;
pub use error::ConnectorError;
pub use factory::ConnectorFactory;
pub use traits::{RowStream, SourceConnector};
pub use types::{ColumnSchema, ColumnType, DataTable};
