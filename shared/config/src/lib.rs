//! Environment-driven settings for the source-manager services.
//!
//! Every service loads one [`AppSettings`] at startup; connector code only
//! ever sees the narrow slices it needs (crypto key, storage settings,
//! inventory address).

use std::env;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Object-storage (MinIO / S3-compatible) settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub secure: bool,
}

impl StorageSettings {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("STORAGE_URL").unwrap_or_else(|_| "http://minio:9000".to_string()),
            access_key: env::var("STORAGE_USER").unwrap_or_else(|_| "dataflow".to_string()),
            secret_key: env::var("STORAGE_PASSWORD").unwrap_or_default(),
            bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "dataflow".to_string()),
            region: env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            secure: env::var("STORAGE_SECURE")
                .map(|v| matches!(v.to_uppercase().as_str(), "TRUE" | "Y" | "YES" | "1"))
                .unwrap_or(false),
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Base64 key for the credential cipher; an absent key surfaces as an
    /// internal error on first cipher use, not at startup.
    pub crypto_key: Option<String>,
    pub storage: StorageSettings,
    pub inventory_grpc_url: String,
}

impl AppSettings {
    pub fn from_env() -> Self {
        // Best effort; deployments without a .env file rely on real env vars.
        dotenv::dotenv().ok();

        Self {
            crypto_key: env::var("CRYPTO_KEY").ok(),
            storage: StorageSettings::from_env(),
            inventory_grpc_url: env::var("INVENTORY_GRPC_URL")
                .unwrap_or_else(|_| "inventory:50051".to_string()),
        }
    }
}

/// Initialize the tracing subscriber for a service.
///
/// `RUST_LOG` wins; otherwise falls back to `info`. `LOG_FORMAT=json`
/// switches to the production JSON layout.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        let layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::NONE)
            .with_current_span(true)
            .with_target(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init();
    } else {
        let layer = fmt::layer().with_target(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init();
    }

    tracing::info!(service = service_name, "tracing initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_settings_defaults() {
        let settings = StorageSettings::from_env();
        assert!(!settings.bucket.is_empty());
        assert!(!settings.endpoint.is_empty());
    }
}
