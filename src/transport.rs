//! Mutually-authenticated HTTPS exchange with the distribution endpoint
//!
//! The [`Transport`] trait is the seam between the sync pipeline and the
//! network. [`TransportClient`] is the production implementation; tests can
//! point it at a mock server with [`TransportClient::with_client`] or replace
//! it entirely.

use crate::config::TransportConfig;
use crate::error::{ERROR_BODY_LIMIT, TransportError};
use crate::request::{RequestEnvelope, SOAP_ACTION};
use crate::utils::truncate_chars;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tracing::{debug, info, warn};

/// Content type of a SOAP 1.1 request
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Sends a built request and returns the raw response body
#[async_trait]
pub trait Transport: Send + Sync {
    /// Exchange one request for its raw response
    ///
    /// Returns the body only for 2xx answers. No retry is attempted.
    async fn send(&self, request: &RequestEnvelope) -> Result<String, TransportError>;
}

/// HTTP client holding the client certificate identity and endpoint
#[derive(Clone, Debug)]
pub struct TransportClient {
    client: reqwest::Client,
    endpoint: String,
}

impl TransportClient {
    /// Build a client presenting the configured certificate/key pair
    ///
    /// The certificate and key are read from their PEM files here, so a
    /// missing or unreadable credential fails before any request is sent.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut pem = read_pem(&config.key_path)?;
        pem.push(b'\n');
        pem.extend(read_pem(&config.cert_path)?);

        let identity =
            reqwest::Identity::from_pem(&pem).map_err(|e| TransportError::Credentials {
                path: config.cert_path.clone(),
                reason: e.to_string(),
            })?;

        if !config.verify_tls {
            warn!(
                endpoint = %config.endpoint,
                "server certificate verification is disabled"
            );
        }

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Tls {
                reason: format!("failed to build TLS client: {}", e),
            })?;

        Ok(Self::with_client(client, config.endpoint.clone()))
    }

    /// Wrap an already configured HTTP client
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for TransportClient {
    async fn send(&self, request: &RequestEnvelope) -> Result<String, TransportError> {
        let body = request.to_soap();
        info!(
            endpoint = %self.endpoint,
            cursor = request.cursor().as_str(),
            bytes = body.len(),
            "sending distribution request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", SOAP_ACTION)
            .body(body)
            .send()
            .await
            .map_err(|e| classify(&e, &self.endpoint))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify(&e, &self.endpoint))?;

        if !status.is_success() {
            warn!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                "distribution endpoint returned an error status"
            );
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body: truncate_chars(&text, ERROR_BODY_LIMIT).to_string(),
            });
        }

        debug!(status = status.as_u16(), bytes = text.len(), "response received");
        Ok(text)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|e| TransportError::Credentials {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Map a reqwest failure onto the transport taxonomy
///
/// reqwest does not expose TLS failures as a distinct kind, so the causes
/// below the top-level error are inspected for certificate/handshake wording.
/// The top-level message embeds the request URL and is never matched.
fn classify(error: &reqwest::Error, endpoint: &str) -> TransportError {
    let reason = cause_chain(error);

    if error.is_timeout() {
        return TransportError::Network {
            endpoint: endpoint.to_string(),
            reason: format!("timed out: {}", reason),
        };
    }

    if looks_like_tls(&reason) {
        return TransportError::Tls { reason };
    }

    TransportError::Network {
        endpoint: endpoint.to_string(),
        reason,
    }
}

/// Messages of every cause below `error`, outermost first
///
/// A cause already quoted by the message above it is dropped, so each
/// failure appears once.
fn cause_chain(error: &reqwest::Error) -> String {
    let mut messages: Vec<String> = Vec::new();
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        let message = err.to_string();
        let quoted = messages.last().is_some_and(|last| last.contains(&message));
        if !quoted && !message.is_empty() {
            messages.push(message);
        }
        source = err.source();
    }

    if messages.is_empty() {
        // No cause to report; fall back to the kind of failure
        let kind = if error.is_connect() {
            "connection failed"
        } else if error.is_request() {
            "request failed"
        } else {
            "unexpected transport failure"
        };
        return kind.to_string();
    }
    messages.join(": ")
}

fn looks_like_tls(reason: &str) -> bool {
    let lower = reason.to_lowercase();
    [
        "certificate",
        "handshake",
        "tls",
        "ssl",
        "unknownissuer",
        "corrupt message",
        "alert",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}
