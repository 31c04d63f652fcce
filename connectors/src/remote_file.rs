//! SFTP and FTP file-drop connectors.
//!
//! The target filename may carry a date-pattern token that rolls daily;
//! resolution substitutes `today - offset` into the name and, when listing
//! the remote directory, additionally treats the token as an 8-digit
//! wildcard and picks the entry with the most recent modification time.
//! Upstream publishers are routinely a day late, so the literal computed
//! date cannot be trusted to match exactly.
//!
//! Both protocols speak blocking clients; every operation runs inside
//! `spawn_blocking` and opens its own scoped connection. The downloaded file
//! is cached for the lifetime of one connector instance.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use tokio::sync::OnceCell;
use tracing::debug;

use dataflow_models::FileImportType;

use crate::config::{RemoteFileConfig, RemoteFileSpec};
use crate::error::ConnectorError;
use crate::file_layout::parse_auto;
use crate::infer::infer_schema;
use crate::traits::{stream_table, RowStream, SourceConnector};
use crate::types::{clean_columns, ColumnSchema, DataTable};

/// Concrete filename for today: the pattern token inside `file_name` is
/// replaced with `today - offset` formatted per the pattern.
pub fn resolve_file_name(spec: &RemoteFileSpec, today: NaiveDate) -> String {
    match spec.date_pattern {
        Some(pattern) => {
            let date = today - Duration::days(spec.offset.unwrap_or(0));
            spec.file_name
                .replace(pattern.token(), &pattern.format_date(date))
        }
        None => spec.file_name.clone(),
    }
}

/// Match a remote entry against the patterned name with the token read as an
/// 8-digit wildcard.
pub fn matches_dated_name(entry: &str, file_name: &str, token: &str) -> bool {
    let Some((prefix, suffix)) = file_name.split_once(token) else {
        return entry == file_name;
    };
    if entry.len() != prefix.len() + 8 + suffix.len()
        || !entry.starts_with(prefix)
        || !entry.ends_with(suffix)
    {
        return false;
    }
    let middle = &entry[prefix.len()..entry.len() - suffix.len()];
    middle.bytes().all(|b| b.is_ascii_digit())
}

/// Entry with the most recent modification time wins.
pub fn pick_latest(mut candidates: Vec<(String, i64)>) -> Option<String> {
    candidates.sort_by_key(|(_, mtime)| *mtime);
    candidates.pop().map(|(name, _)| name)
}

fn join_remote(path: &str, name: &str) -> String {
    if path.ends_with('/') {
        format!("{path}{name}")
    } else {
        format!("{path}/{name}")
    }
}

/// Scoped SFTP session: TCP connect, handshake, password auth.
pub(crate) fn sftp_connect(
    host: &str,
    port: u16,
    login: &str,
    password: &str,
) -> Result<ssh2::Session, ConnectorError> {
    let tcp = TcpStream::connect((host, port))
        .map_err(|e| ConnectorError::SourceConnection(format!("SFTP connect failed: {e}")))?;
    let mut session = ssh2::Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;
    session.userauth_password(login, password)?;
    Ok(session)
}

fn sftp_session(config: &RemoteFileConfig) -> Result<ssh2::Session, ConnectorError> {
    sftp_connect(&config.host, config.port, &config.login, &config.password)
}

/// `(name, mtime seconds)` for every entry in the remote directory.
fn sftp_list(config: &RemoteFileConfig) -> Result<Vec<(String, i64)>, ConnectorError> {
    let session = sftp_session(config)?;
    let sftp = session.sftp()?;
    let entries = sftp.readdir(Path::new(&config.file.file_path))?;

    Ok(entries
        .into_iter()
        .filter_map(|(path, stat)| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((name, stat.mtime.unwrap_or(0) as i64))
        })
        .collect())
}

fn sftp_download(config: &RemoteFileConfig, name: &str) -> Result<String, ConnectorError> {
    let session = sftp_session(config)?;
    let sftp = session.sftp()?;
    let remote_path = join_remote(&config.file.file_path, name);
    let mut file = sftp.open(Path::new(&remote_path)).map_err(|_| {
        ConnectorError::ResourceNotFound(format!("The file named '{name}' does not exist!"))
    })?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|_| ConnectorError::Internal(format!("File '{name}' is not valid UTF-8 text")))?;
    Ok(content)
}

fn ftp_login(config: &RemoteFileConfig) -> Result<suppaftp::FtpStream, ConnectorError> {
    let mut ftp = suppaftp::FtpStream::connect((config.host.as_str(), config.port))?;
    ftp.login(&config.login, &config.password)?;
    Ok(ftp)
}

fn ftp_list(config: &RemoteFileConfig) -> Result<Vec<(String, i64)>, ConnectorError> {
    let mut ftp = ftp_login(config)?;
    ftp.cwd(&config.file.file_path)?;
    let names = ftp.nlst(None)?;

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let mtime = ftp
            .mdtm(&name)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        entries.push((name, mtime));
    }
    ftp.quit().ok();
    Ok(entries)
}

fn ftp_download(config: &RemoteFileConfig, name: &str) -> Result<String, ConnectorError> {
    let mut ftp = ftp_login(config)?;
    ftp.cwd(&config.file.file_path)?;
    let buffer = ftp.retr_as_buffer(name).map_err(|_| {
        ConnectorError::ResourceNotFound(format!("The file named '{name}' does not exist!"))
    })?;
    ftp.quit().ok();

    String::from_utf8(buffer.into_inner())
        .map_err(|_| ConnectorError::Internal(format!("File '{name}' is not valid UTF-8 text")))
}

fn check_blocking(config: &RemoteFileConfig) -> Result<(), ConnectorError> {
    match config.import_type {
        FileImportType::Sftp => sftp_session(config).map(|_| ()),
        FileImportType::Ftp => ftp_login(config).map(|mut ftp| {
            ftp.quit().ok();
        }),
        FileImportType::Manual => Err(ConnectorError::Internal(
            "manual sources are not remote-file sources".to_string(),
        )),
    }
}

fn list_blocking(config: &RemoteFileConfig) -> Result<Vec<(String, i64)>, ConnectorError> {
    match config.import_type {
        FileImportType::Sftp => sftp_list(config),
        FileImportType::Ftp => ftp_list(config),
        FileImportType::Manual => Err(ConnectorError::Internal(
            "manual sources are not remote-file sources".to_string(),
        )),
    }
}

fn fetch_blocking(config: &RemoteFileConfig) -> Result<String, ConnectorError> {
    let resolved = resolve_file_name(&config.file, Local::now().date_naive());

    let name = match config.file.date_pattern {
        Some(pattern) => {
            let entries = list_blocking(config)?;
            let candidates: Vec<(String, i64)> = entries
                .into_iter()
                .filter(|(name, _)| {
                    matches_dated_name(name, &config.file.file_name, pattern.token())
                })
                .collect();
            pick_latest(candidates).ok_or_else(|| {
                ConnectorError::ResourceNotFound(format!(
                    "No remote file matching '{resolved}' found!"
                ))
            })?
        }
        None => resolved,
    };

    debug!(file = %name, "downloading remote file");
    match config.import_type {
        FileImportType::Sftp => sftp_download(config, &name),
        FileImportType::Ftp => ftp_download(config, &name),
        FileImportType::Manual => Err(ConnectorError::Internal(
            "manual sources are not remote-file sources".to_string(),
        )),
    }
}

pub struct RemoteFileConnector {
    config: RemoteFileConfig,
    /// Downloaded file text, kept for the lifetime of this instance.
    cache: OnceCell<String>,
}

impl RemoteFileConnector {
    pub fn new(config: RemoteFileConfig) -> Self {
        Self {
            config,
            cache: OnceCell::new(),
        }
    }

    async fn fetch(&self) -> Result<&str, ConnectorError> {
        self.cache
            .get_or_try_init(|| async {
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || fetch_blocking(&config))
                    .await
                    .map_err(|e| ConnectorError::Internal(format!("download task failed: {e}")))?
            })
            .await
            .map(String::as_str)
    }

    async fn parse(&self) -> Result<DataTable, ConnectorError> {
        let content = self.fetch().await?;
        parse_auto(content)
    }

    /// Remote directory listing, used by the source-browse surface.
    pub async fn list_remote_files(&self) -> Result<Vec<String>, ConnectorError> {
        let config = self.config.clone();
        let entries = tokio::task::spawn_blocking(move || list_blocking(&config))
            .await
            .map_err(|e| ConnectorError::Internal(format!("listing task failed: {e}")))??;
        Ok(entries.into_iter().map(|(name, _)| name).collect())
    }
}

#[async_trait]
impl SourceConnector for RemoteFileConnector {
    async fn check_connection(&self) -> Result<(), ConnectorError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || check_blocking(&config))
            .await
            .map_err(|e| ConnectorError::Internal(format!("connection task failed: {e}")))?
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
