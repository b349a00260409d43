//! Test configuration helpers for loading .env credentials and building pipelines

use distdfe::{Config, Environment, SyncPipeline, TransportClient};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Taxpayer id used by mock-server tests
pub const TEST_TAXPAYER_ID: &str = "12.345.678/0001-95";

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Config whose every path lives inside `temp_dir`
pub fn temp_config(temp_dir: &TempDir, endpoint: &str) -> Config {
    let mut config = Config::default();
    config.identity.taxpayer_id = TEST_TAXPAYER_ID.to_string();
    config.transport.endpoint = endpoint.to_string();
    config.storage.request_path = temp_dir.path().join("entrada.xml");
    config.storage.response_dir = temp_dir.path().join("xml_respostas");
    config.storage.cursor_path = temp_dir.path().join("nsu.json");
    config.storage.extracted_dir = temp_dir.path().join("xml_extraidos");
    config
}

/// Sync pipeline talking plain HTTP to a mock server, with file storage
pub fn mock_pipeline(config: &Config) -> SyncPipeline {
    let transport = TransportClient::with_client(
        reqwest::Client::new(),
        config.transport.endpoint.clone(),
    );
    let responses = distdfe::FsResponseStore::new(config.storage.response_dir.clone());
    SyncPipeline::new(config, Arc::new(transport), Arc::new(responses))
}

/// Load a live configuration from environment variables
///
/// Required environment variables:
/// - `DISTDFE_TAXPAYER_ID` - 14-digit taxpayer id (punctuation allowed)
/// - `DISTDFE_CERT_PATH` - client certificate (PEM)
/// - `DISTDFE_KEY_PATH` - client private key (PEM)
///
/// Optional environment variables:
/// - `DISTDFE_JURISDICTION` - two-digit state code (default: 35)
/// - `DISTDFE_ENVIRONMENT` - `1`/`production` or `2`/`homolog` (default: 1)
/// - `DISTDFE_ENDPOINT` - service URL (default: national production endpoint)
pub fn load_live_config(temp_dir: &TempDir) -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let var = |name: &str| {
        std::env::var(name).map_err(|_| ConfigError(format!("{} not set in environment", name)))
    };

    let mut config = temp_config(temp_dir, "");
    config.transport.endpoint = std::env::var("DISTDFE_ENDPOINT")
        .unwrap_or_else(|_| Config::default().transport.endpoint);
    config.identity.taxpayer_id = var("DISTDFE_TAXPAYER_ID")?;
    config.transport.cert_path = PathBuf::from(var("DISTDFE_CERT_PATH")?);
    config.transport.key_path = PathBuf::from(var("DISTDFE_KEY_PATH")?);

    if let Ok(jurisdiction) = std::env::var("DISTDFE_JURISDICTION") {
        config.identity.jurisdiction = jurisdiction;
    }
    config.identity.environment = match std::env::var("DISTDFE_ENVIRONMENT") {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError(format!("invalid DISTDFE_ENVIRONMENT: {}", value)))?,
        Err(_) => Environment::default(),
    };

    Ok(config)
}

/// Check whether live credentials are available
pub fn has_live_credentials() -> bool {
    dotenvy::dotenv().ok();
    ["DISTDFE_TAXPAYER_ID", "DISTDFE_CERT_PATH", "DISTDFE_KEY_PATH"]
        .iter()
        .all(|name| std::env::var(name).is_ok())
}

/// Return early from a test when live credentials are missing
#[macro_export]
macro_rules! skip_if_no_credentials {
    () => {
        if !$crate::common::has_live_credentials() {
            eprintln!("Skipping test: DISTDFE credentials not found in .env");
            return;
        }
    };
}
