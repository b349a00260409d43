//! # distdfe
//!
//! Cursor-based client for the NF-e document distribution service
//! (`NFeDistribuicaoDFe`).
//!
//! Each sync cycle sends the last persisted sequence number (NSU) to the
//! authority over mutual TLS, stores the raw response, and advances the
//! persisted cursor to the `ultNSU` the authority returned. Extraction runs
//! separately over stored responses, decoding every `docZip` package
//! (Base64 + GZIP) into its own file.
//!
//! ## Design
//!
//! - **Library-first** - no CLI and no logging subscriber; events are emitted
//!   with `tracing` and the embedding application decides where they go
//! - **Crash-safe cursor** - the cursor is written only after a response was
//!   parsed, atomically, and never moves backwards
//! - **Isolated failures** - one corrupt package or response file never stops
//!   its siblings
//!
//! ## Quick Start
//!
//! ```no_run
//! use distdfe::{Config, ExtractPipeline, SyncPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.identity.taxpayer_id = "12.345.678/0001-95".to_string();
//!
//!     let sync = SyncPipeline::from_config(&config)?;
//!     loop {
//!         let outcome = sync.run().await?;
//!         println!(
//!             "cursor {} -> {}",
//!             outcome.sent_cursor,
//!             outcome.persisted_cursor()
//!         );
//!         if !outcome.has_more() || !outcome.advanced() {
//!             break;
//!         }
//!     }
//!
//!     let report = ExtractPipeline::from_config(&config).run_all()?;
//!     println!("{} documents written", report.documents_written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Persisted cursor record
pub mod cursor;
/// docZip payload decoding
pub mod decoder;
/// Error types
pub mod error;
/// Extraction of documents from stored responses
pub mod extract;
/// Request document construction
pub mod request;
/// Response parsing
pub mod response;
/// Response and document storage
pub mod storage;
/// Sync cycle state machine
pub mod sync;
/// Mutual-TLS transport
pub mod transport;
/// Core domain types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, IdentityConfig, StorageConfig, TransportConfig};
pub use cursor::{CursorSave, CursorStore};
pub use decoder::{DecodeBatch, DocumentDecoder};
pub use error::{
    DecodeError, Error, ErrorKind, ParseError, PersistenceError, Result, TransportError,
    ValidationError,
};
pub use extract::{ExtractPipeline, ExtractReport, input_handles};
pub use request::{RequestBuilder, RequestEnvelope};
pub use response::ResponseParser;
pub use storage::{
    DocumentSink, FsDocumentSink, FsResponseStore, MemoryDocumentSink, MemoryResponseStore,
    ResponseHandle, ResponseStore,
};
pub use sync::{SyncFailure, SyncOutcome, SyncPipeline, SyncState};
pub use transport::{Transport, TransportClient};
pub use types::{
    Cursor, DecodedDocument, DocumentPackage, Environment, Identity, ResponseEnvelope, TaxpayerId,
};
