//! Configuration types for distdfe
//!
//! A [`Config`] is assembled once by the caller (CLI flags, environment, a
//! config file) and passed explicitly to each component. Nothing in this
//! crate reads process-wide state.

use crate::error::{Error, Result};
use crate::types::{Environment, Identity};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Requester identity settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Interested party's taxpayer id (CNPJ); formatting characters are allowed
    #[serde(default)]
    pub taxpayer_id: String,

    /// Authoring jurisdiction code, `cUFAutor` (default: "35" = SP)
    #[serde(default = "default_jurisdiction")]
    pub jurisdiction: String,

    /// Target environment (default: production)
    #[serde(default)]
    pub environment: Environment,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            taxpayer_id: String::new(),
            jurisdiction: default_jurisdiction(),
            environment: Environment::default(),
        }
    }
}

/// Endpoint and mutual-TLS settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Distribution service URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Client certificate, PEM (default: "tmp/cert.pem")
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,

    /// Client private key, PEM (default: "tmp/key.pem")
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,

    /// Verify the server certificate chain (default: false)
    ///
    /// The authority's chain is issued by the national ICP-Brasil root, which
    /// is absent from most trust stores.
    #[serde(default)]
    pub verify_tls: bool,

    /// Request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
            verify_tls: false,
            timeout: default_timeout(),
        }
    }
}

/// File locations used by the sync and extraction pipelines
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Audit copy of the last request document (default: "entrada.xml")
    #[serde(default = "default_request_path")]
    pub request_path: PathBuf,

    /// Directory receiving raw responses (default: "xml_respostas")
    #[serde(default = "default_response_dir")]
    pub response_dir: PathBuf,

    /// Persisted cursor record (default: "nsu.json")
    #[serde(default = "default_cursor_path")]
    pub cursor_path: PathBuf,

    /// Directory receiving decoded documents (default: "xml_extraidos")
    #[serde(default = "default_extracted_dir")]
    pub extracted_dir: PathBuf,

    /// Response file or directory to extract from (default: `response_dir`)
    #[serde(default)]
    pub extract_input: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            request_path: default_request_path(),
            response_dir: default_response_dir(),
            cursor_path: default_cursor_path(),
            extracted_dir: default_extracted_dir(),
            extract_input: None,
        }
    }
}

/// Main configuration for the distribution client
///
/// Fields are organized into sub-configs:
/// - [`identity`](IdentityConfig) - who is asking
/// - [`transport`](TransportConfig) - where and how to connect
/// - [`storage`](StorageConfig) - where requests, responses, cursor and documents live
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Requester identity
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Endpoint and credentials
    #[serde(default)]
    pub transport: TransportConfig,

    /// File locations
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Check settings that can be verified without touching the network
    ///
    /// The taxpayer id is deliberately not checked here: it is validated when
    /// the [`Identity`] is built at the start of each sync cycle.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.transport.endpoint).map_err(|e| {
            Error::config(
                "transport.endpoint",
                format!("invalid endpoint URL {:?}: {}", self.transport.endpoint, e),
            )
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(Error::config(
                "transport.endpoint",
                format!("unsupported URL scheme {:?}", url.scheme()),
            ));
        }

        if self.transport.timeout.is_zero() {
            return Err(Error::config(
                "transport.timeout",
                "timeout must be greater than zero",
            ));
        }

        let jurisdiction = self.identity.jurisdiction.trim();
        if jurisdiction.len() != 2 || !jurisdiction.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::config(
                "identity.jurisdiction",
                format!("jurisdiction must be 2 digits, got {:?}", jurisdiction),
            ));
        }

        Ok(())
    }

    /// Build the validated [`Identity`] for a request
    pub fn identity(&self) -> Result<Identity> {
        Ok(Identity::new(
            &self.identity.taxpayer_id,
            &self.identity.jurisdiction,
            self.identity.environment,
        )?)
    }
}

fn default_jurisdiction() -> String {
    "35".to_string()
}

fn default_endpoint() -> String {
    "https://www1.nfe.fazenda.gov.br/NFeDistribuicaoDFe/NFeDistribuicaoDFe.asmx".to_string()
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("tmp/cert.pem")
}

fn default_key_path() -> PathBuf {
    PathBuf::from("tmp/key.pem")
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_path() -> PathBuf {
    PathBuf::from("entrada.xml")
}

fn default_response_dir() -> PathBuf {
    PathBuf::from("xml_respostas")
}

fn default_cursor_path() -> PathBuf {
    PathBuf::from("nsu.json")
}

fn default_extracted_dir() -> PathBuf {
    PathBuf::from("xml_extraidos")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
