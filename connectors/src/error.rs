use thiserror::Error;

/// Connector-facing error taxonomy.
///
/// Every external failure is categorized into one of these five kinds before
/// it crosses the contract boundary; raw transport or parse errors never
/// escape a connector. The boundary layer maps each kind to a transport
/// status and owns any retry policy — connectors themselves never retry.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Malformed or unsupported configuration (unknown auth type, unknown
    /// connection type, bad field value).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The named table, file or key does not exist at the origin.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Origin unreachable, credentials rejected or transport failure.
    #[error("Source connection error: {0}")]
    SourceConnection(String),

    /// Connector misuse (required field unset) or an origin response shape
    /// with no implemented decoder.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Mutation blocked because the target is in active use downstream.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        ConnectorError::SourceConnection(err.to_string())
    }
}

impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        ConnectorError::SourceConnection(err.to_string())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::SourceConnection(err.to_string())
    }
}

impl From<ssh2::Error> for ConnectorError {
    fn from(err: ssh2::Error) -> Self {
        ConnectorError::SourceConnection(err.to_string())
    }
}

impl From<suppaftp::FtpError> for ConnectorError {
    fn from(err: suppaftp::FtpError) -> Self {
        ConnectorError::SourceConnection(err.to_string())
    }
}

impl From<csv::Error> for ConnectorError {
    fn from(err: csv::Error) -> Self {
        ConnectorError::Internal(err.to_string())
    }
}
