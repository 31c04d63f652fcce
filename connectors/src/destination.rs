//! Egress destinations and their mutation guard.
//!
//! Destinations share the record shape of sources but are restricted to
//! egress-capable connector types — currently remote SFTP directories. A
//! destination that a downstream pipeline actively writes to must not change
//! its connector type or be deleted; the check goes through the
//! [`PipelineUsage`] boundary trait.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::config::SftpDestinationConfig;
use crate::error::ConnectorError;
use crate::remote_file::sftp_connect;

/// Boundary interface to the downstream pipeline registry.
#[async_trait]
pub trait PipelineUsage: Send + Sync {
    async fn is_destination_used(&self, destination_id: i64) -> Result<bool, ConnectorError>;
}

/// Reject a destination mutation or deletion while the destination is in
/// active downstream use.
pub async fn guard_destination_mutation(
    usage: &dyn PipelineUsage,
    destination_id: i64,
) -> Result<(), ConnectorError> {
    if usage.is_destination_used(destination_id).await? {
        return Err(ConnectorError::Conflict(format!(
            "Destination {destination_id} is used by an active pipeline and can't be changed or deleted!"
        )));
    }
    Ok(())
}

/// Remote SFTP directory used as an egress target.
pub struct SftpDestination {
    config: SftpDestinationConfig,
}

impl SftpDestination {
    pub fn new(config: SftpDestinationConfig) -> Self {
        Self { config }
    }

    pub async fn check_connection(&self) -> Result<(), ConnectorError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            sftp_connect(&config.host, config.port, &config.login, &config.password).map(|_| ())
        })
        .await
        .map_err(|e| ConnectorError::Internal(format!("connection task failed: {e}")))?
    }

    /// Entries of the configured remote directory.
    pub async fn list_dir(&self) -> Result<Vec<String>, ConnectorError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let session =
                sftp_connect(&config.host, config.port, &config.login, &config.password)?;
            let sftp = session.sftp()?;
            let entries = sftp.readdir(Path::new(&config.path))?;
            debug!(path = %config.path, count = entries.len(), "listed destination directory");
            Ok(entries
                .into_iter()
                .filter_map(|(path, _)| path.file_name()?.to_str().map(str::to_string))
                .collect())
        })
        .await
        .map_err(|e| ConnectorError::Internal(format!("listing task failed: {e}")))?
    }
}
