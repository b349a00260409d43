//! docZip payload decoding (Base64 + GZIP)

use crate::error::DecodeError;
use crate::types::{DecodedDocument, DocumentPackage};
use crate::utils::sanitize_file_component;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};
use tracing::{debug, warn};

/// Outcome of decoding every package of one response
#[derive(Debug, Default)]
pub struct DecodeBatch {
    /// Successfully decoded documents, in package order
    pub documents: Vec<DecodedDocument>,
    /// One entry per package that could not be decoded
    pub errors: Vec<DecodeError>,
}

impl DecodeBatch {
    /// Number of successfully decoded documents
    pub fn count(&self) -> usize {
        self.documents.len()
    }
}

/// Decodes document packages into raw documents
pub struct DocumentDecoder;

impl DocumentDecoder {
    /// Output file name for a package, `<nsu>_<schema>.xml`
    ///
    /// Path separators in either component are replaced so the result is
    /// always a bare file name.
    pub fn output_name(nsu: &str, schema: &str) -> String {
        format!(
            "{}_{}.xml",
            sanitize_file_component(nsu),
            sanitize_file_component(schema)
        )
    }

    /// Decode a single package
    ///
    /// Whitespace inside the Base64 text (line breaks, indentation) is ignored.
    pub fn decode(package: &DocumentPackage) -> Result<DecodedDocument, DecodeError> {
        let compact: String = package
            .payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if compact.is_empty() {
            return Err(DecodeError::EmptyBody {
                nsu: package.nsu.clone(),
            });
        }

        let compressed = BASE64.decode(compact.as_bytes()).map_err(|e| DecodeError::Base64 {
            nsu: package.nsu.clone(),
            reason: e.to_string(),
        })?;

        let mut content = Vec::new();
        MultiGzDecoder::new(compressed.as_slice())
            .read_to_end(&mut content)
            .map_err(|e| DecodeError::Decompress {
                nsu: package.nsu.clone(),
                reason: e.to_string(),
            })?;

        Ok(DecodedDocument {
            file_name: Self::output_name(&package.nsu, &package.schema),
            nsu: package.nsu.clone(),
            schema: package.schema.clone(),
            content,
        })
    }

    /// Decode every package, isolating failures
    ///
    /// A package that fails is logged and recorded in
    /// [`DecodeBatch::errors`]; the remaining packages are still decoded.
    pub fn decode_all(packages: &[DocumentPackage]) -> DecodeBatch {
        let mut batch = DecodeBatch::default();
        for package in packages {
            match Self::decode(package) {
                Ok(document) => {
                    debug!(
                        nsu = %document.nsu,
                        schema = %document.schema,
                        bytes = document.content.len(),
                        "document decoded"
                    );
                    batch.documents.push(document);
                }
                Err(e) => {
                    warn!(nsu = %package.nsu, error = %e, "failed to decode docZip");
                    batch.errors.push(e);
                }
            }
        }
        batch
    }

    /// Compress and encode raw document bytes the way the authority does
    ///
    /// Produces the text carried inside a `docZip` element.
    pub fn encode(content: &[u8]) -> std::io::Result<String> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content)?;
        let compressed = encoder.finish()?;
        Ok(BASE64.encode(compressed))
    }
}
