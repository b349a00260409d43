//! Error types for distdfe
//!
//! This module provides the error taxonomy used by every stage of a sync or
//! extraction run:
//! - Category-specific error types (Validation, Transport, Parse, Decode, Persistence)
//! - A stable, machine-readable code per category for callers that print or route failures
//! - Context information (endpoint, sequence number, file path, HTTP status, etc.)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for distdfe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of characters of an HTTP error body kept for diagnostics
pub const ERROR_BODY_LIMIT: usize = 400;

/// Main error type for distdfe
///
/// Each variant wraps the category-specific error so callers can match on the
/// category first and on the detail second.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "transport.endpoint")
        key: Option<String>,
    },

    /// Identity or cursor input rejected before any request was built
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The exchange with the distribution endpoint failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The raw response could not be interpreted
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A single document package could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The cursor record could not be written
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse error category, used for reporting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid configuration
    Config,
    /// Invalid identity or cursor input
    Validation,
    /// Network, TLS, or HTTP status failure
    Transport,
    /// Malformed response
    Parse,
    /// Corrupt document package
    Decode,
    /// Cursor write failure
    Persistence,
    /// Other filesystem failure
    Io,
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// The category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Config,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Persistence(_) => ErrorKind::Persistence,
            Error::Io(_) | Error::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Machine-readable error code
    ///
    /// Codes are stable and can be used by callers for programmatic handling
    /// or for prefixing console messages.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(e) => match e {
                ValidationError::InvalidTaxpayerId { .. } => "invalid_taxpayer_id",
                ValidationError::InvalidJurisdiction { .. } => "invalid_jurisdiction",
                ValidationError::InvalidCursor { .. } => "invalid_cursor",
            },
            Error::Transport(e) => match e {
                TransportError::Network { .. } => "network_error",
                TransportError::Tls { .. } | TransportError::Credentials { .. } => "tls_error",
                TransportError::HttpStatus { .. } => "http_status_error",
            },
            Error::Parse(_) => "parse_error",
            Error::Decode(_) => "decode_error",
            Error::Persistence(_) => "persistence_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Whether repeating the whole sync cycle may succeed
    ///
    /// Only transport failures qualify: the cursor is never advanced before a
    /// successful parse, so a retried cycle re-requests the same range.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Identity and cursor validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Taxpayer id does not contain exactly 14 digits
    #[error("taxpayer id must contain 14 digits, got {digits} in {input:?}")]
    InvalidTaxpayerId {
        /// The value as supplied by the caller
        input: String,
        /// Number of digits found after stripping formatting characters
        digits: usize,
    },

    /// Jurisdiction code is not a 2-digit numeric code
    #[error("jurisdiction code must be 2 digits, got {value:?}")]
    InvalidJurisdiction {
        /// The rejected value
        value: String,
    },

    /// Cursor is not a numeric string of at most 15 digits
    #[error("cursor must be up to 15 digits, got {value:?}")]
    InvalidCursor {
        /// The rejected value
        value: String,
    },
}

/// Errors raised while exchanging a request with the distribution endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, or timeout failure
    #[error("request to {endpoint} failed: {reason}")]
    Network {
        /// The endpoint that was being contacted
        endpoint: String,
        /// Underlying failure description
        reason: String,
    },

    /// Certificate or handshake failure
    #[error("TLS failure: {reason}")]
    Tls {
        /// Underlying failure description
        reason: String,
    },

    /// Client certificate or key could not be loaded
    #[error("failed to load client credentials from {path}: {reason}")]
    Credentials {
        /// The PEM file that could not be used
        path: PathBuf,
        /// The reason loading failed
        reason: String,
    },

    /// Endpoint answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body, truncated to [`ERROR_BODY_LIMIT`] characters
        body: String,
    },
}

/// Errors raised while interpreting a raw response as a whole
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Response is not well-formed XML
    #[error("malformed response: {reason}")]
    Malformed {
        /// Parser error description
        reason: String,
    },

    /// Response contains no XML elements at all
    #[error("response is empty")]
    Empty,

    /// Endpoint returned a SOAP fault instead of a result
    #[error("SOAP fault {code}: {reason}")]
    SoapFault {
        /// Content of `faultcode` (or `Code/Value` in SOAP 1.2)
        code: String,
        /// Content of `faultstring` (or `Reason/Text` in SOAP 1.2)
        reason: String,
    },

    /// Response carries a cursor value that is not a valid NSU
    #[error("response carries an invalid cursor {value:?}")]
    InvalidCursor {
        /// The rejected value
        value: String,
    },
}

/// Errors scoped to a single document package
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Package body has no content
    #[error("document {nsu} has an empty body")]
    EmptyBody {
        /// Sequence id of the package
        nsu: String,
    },

    /// Package body is not valid Base64
    #[error("document {nsu} is not valid base64: {reason}")]
    Base64 {
        /// Sequence id of the package
        nsu: String,
        /// Decoder error description
        reason: String,
    },

    /// Decoded bytes are not a valid GZIP stream
    #[error("document {nsu} could not be decompressed: {reason}")]
    Decompress {
        /// Sequence id of the package
        nsu: String,
        /// Decompressor error description
        reason: String,
    },
}

impl DecodeError {
    /// Sequence id of the package that failed
    pub fn nsu(&self) -> &str {
        match self {
            DecodeError::EmptyBody { nsu }
            | DecodeError::Base64 { nsu, .. }
            | DecodeError::Decompress { nsu, .. } => nsu,
        }
    }
}

/// Cursor persistence errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Cursor record could not be written or replaced
    #[error("failed to write cursor to {path}: {reason}")]
    Write {
        /// The cursor file path
        path: PathBuf,
        /// The reason the write failed
        reason: String,
    },

    /// Advisory lock on the cursor record could not be taken
    #[error("failed to lock cursor file {path}: {reason}")]
    Lock {
        /// The lock file path
        path: PathBuf,
        /// The reason locking failed
        reason: String,
    },

    /// The blocking cursor task was cancelled or panicked
    #[error("cursor task for {path} did not complete: {reason}")]
    Task {
        /// The cursor file path
        path: PathBuf,
        /// Join failure description
        reason: String,
    },
}
