//! Extraction of decoded documents from stored responses
//!
//! Works on raw responses already written by the sync pipeline (or kept from
//! earlier runs). Each response file is handled independently: a file that
//! cannot be read or parsed is recorded and the batch moves on, and inside a
//! file each package is decoded independently.

use crate::config::Config;
use crate::decoder::DocumentDecoder;
use crate::error::{DecodeError, Error, Result};
use crate::response::ResponseParser;
use crate::storage::{
    DocumentSink, FsDocumentSink, FsResponseStore, ResponseHandle, ResponseStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of one extraction batch
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Responses that were read and parsed
    pub files_processed: usize,
    /// Responses that could not be read or parsed
    pub files_failed: Vec<(ResponseHandle, Error)>,
    /// Documents written to the sink
    pub documents_written: usize,
    /// Packages that could not be decoded
    pub decode_errors: Vec<DecodeError>,
    /// Documents that decoded but could not be written, by file name
    pub write_failures: Vec<(String, Error)>,
    /// Packages skipped by the parser because their body was empty
    pub skipped_empty: usize,
}

impl ExtractReport {
    /// Whether every file, package and write succeeded
    pub fn is_clean(&self) -> bool {
        self.files_failed.is_empty()
            && self.decode_errors.is_empty()
            && self.write_failures.is_empty()
    }
}

/// Reads stored responses, decodes their packages and writes the documents
pub struct ExtractPipeline {
    responses: Arc<dyn ResponseStore>,
    sink: Arc<dyn DocumentSink>,
    input: Option<PathBuf>,
}

impl ExtractPipeline {
    /// Create a pipeline over explicit storage
    pub fn new(responses: Arc<dyn ResponseStore>, sink: Arc<dyn DocumentSink>) -> Self {
        Self {
            responses,
            sink,
            input: None,
        }
    }

    /// Create a pipeline over the configured directories
    ///
    /// Responses come from `storage.extract_input` when set, otherwise from
    /// `storage.response_dir`.
    pub fn from_config(config: &Config) -> Self {
        let pipeline = Self::new(
            Arc::new(FsResponseStore::new(config.storage.response_dir.clone())),
            Arc::new(FsDocumentSink::new(config.storage.extracted_dir.clone())),
        );
        match &config.storage.extract_input {
            Some(input) => pipeline.with_input(input.clone()),
            None => pipeline,
        }
    }

    /// Read responses from a file or directory instead of listing the store
    ///
    /// Handles are resolved with [`input_handles`] and read through the
    /// store, so this only makes sense over a filesystem store.
    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Extract every response of the input, or of the store when no input
    /// was given
    ///
    /// # Errors
    ///
    /// Fails only when the input or the store cannot be listed; per-file
    /// problems are reported in the [`ExtractReport`].
    pub fn run_all(&self) -> Result<ExtractReport> {
        let handles = match &self.input {
            Some(input) => input_handles(input)?,
            None => self.responses.list()?,
        };
        Ok(self.run(&handles))
    }

    /// Extract the given responses, in order
    pub fn run(&self, handles: &[ResponseHandle]) -> ExtractReport {
        let mut report = ExtractReport::default();
        for handle in handles {
            if let Err(e) = self.extract_file(handle, &mut report) {
                warn!(file = %handle, error = %e, "failed to process response file");
                report.files_failed.push((handle.clone(), e));
            }
        }

        info!(
            files = report.files_processed,
            failed_files = report.files_failed.len(),
            documents = report.documents_written,
            decode_errors = report.decode_errors.len(),
            "extraction finished"
        );
        report
    }

    fn extract_file(&self, handle: &ResponseHandle, report: &mut ExtractReport) -> Result<()> {
        info!(file = %handle, "processing response file");
        let raw = self.responses.read(handle)?;
        let envelope = ResponseParser::parse(&raw)?;
        report.files_processed += 1;
        report.skipped_empty += envelope.skipped.len();

        if envelope.packages.is_empty() {
            info!(file = %handle, "no docZip found");
            return Ok(());
        }
        info!(file = %handle, packages = envelope.packages.len(), "docZip packages found");

        let batch = DocumentDecoder::decode_all(&envelope.packages);
        report.decode_errors.extend(batch.errors);
        for document in batch.documents {
            match self.sink.write(&document) {
                Ok(path) => {
                    info!(path = %path.display(), nsu = %document.nsu, "document saved");
                    report.documents_written += 1;
                }
                Err(e) => {
                    warn!(file_name = %document.file_name, error = %e, "failed to save document");
                    report.write_failures.push((document.file_name, e));
                }
            }
        }
        Ok(())
    }
}

/// Responses named by a command-line style input: one file, or every
/// `*.xml` file of a directory in name order
pub fn input_handles(input: &Path) -> Result<Vec<ResponseHandle>> {
    if input.is_dir() {
        return FsResponseStore::new(input).list();
    }
    if !input.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("response input {} not found", input.display()),
        )));
    }
    Ok(vec![ResponseHandle::from(PathBuf::from(input))])
}
