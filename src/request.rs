//! Distribution request construction (`distDFeInt`) and SOAP wrapping

use crate::error::{Error, Result};
use crate::types::{Cursor, Identity};
use quick_xml::escape::escape;
use std::path::Path;
use tracing::info;

/// Namespace of the fiscal document schemas
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Namespace of the distribution web service
pub const DIST_SERVICE_NAMESPACE: &str =
    "http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe";

/// SOAP 1.1 envelope namespace
pub const SOAP_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Value of the `SOAPAction` header for a distribution request
pub const SOAP_ACTION: &str =
    "http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe/nfeDistDFeInteresse";

/// Schema version of the request layout
pub const LAYOUT_VERSION: &str = "1.01";

/// A built `distDFeInt` request document
///
/// Immutable once built; [`RequestEnvelope::document`] is the exact payload
/// carried in the SOAP message field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestEnvelope {
    cursor: Cursor,
    document: String,
}

impl RequestEnvelope {
    /// Cursor the request asks to resume from
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// The `distDFeInt` document, without XML declaration
    pub fn document(&self) -> &str {
        &self.document
    }

    /// The document wrapped in the SOAP envelope sent over the wire
    pub fn to_soap(&self) -> String {
        format!(
            concat!(
                r#"<soap:Envelope xmlns:soap="{soap}">"#,
                "<soap:Body>",
                r#"<nfeDistDFeInteresse xmlns="{service}">"#,
                "<nfeDadosMsg>{document}</nfeDadosMsg>",
                "</nfeDistDFeInteresse>",
                "</soap:Body>",
                "</soap:Envelope>"
            ),
            soap = SOAP_NAMESPACE,
            service = DIST_SERVICE_NAMESPACE,
            document = self.document,
        )
    }

    /// Write an audit copy of the request document, with XML declaration
    ///
    /// The copy is never read back.
    pub fn write_audit_copy(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = format!(
            "<?xml version='1.0' encoding='utf-8'?>\n{}\n",
            self.document
        );
        std::fs::write(path, content).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to write request to {}: {}", path.display(), e),
            ))
        })?;
        info!(path = %path.display(), "request document saved");
        Ok(())
    }
}

/// Builds distribution requests from a validated identity and cursor
pub struct RequestBuilder;

impl RequestBuilder {
    /// Build the `distDFeInt` request asking for everything after `cursor`
    ///
    /// Taking an [`Identity`] means the taxpayer id has already passed
    /// validation; an invalid id never reaches this point.
    pub fn build(identity: &Identity, cursor: &Cursor) -> RequestEnvelope {
        let document = format!(
            concat!(
                r#"<distDFeInt xmlns="{ns}" versao="{version}">"#,
                "<tpAmb>{tp_amb}</tpAmb>",
                "<cUFAutor>{uf}</cUFAutor>",
                "<CNPJ>{cnpj}</CNPJ>",
                "<distNSU><ultNSU>{cursor}</ultNSU></distNSU>",
                "</distDFeInt>"
            ),
            ns = NFE_NAMESPACE,
            version = LAYOUT_VERSION,
            tp_amb = identity.environment.code(),
            uf = escape(identity.jurisdiction.as_str()),
            cnpj = identity.taxpayer_id.as_str(),
            cursor = cursor.as_str(),
        );

        info!(
            cnpj = identity.taxpayer_id.as_str(),
            uf = %identity.jurisdiction,
            environment = %identity.environment,
            cursor = cursor.as_str(),
            "distribution request built"
        );

        RequestEnvelope {
            cursor: cursor.clone(),
            document,
        }
    }
}
