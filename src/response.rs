//! Distribution response parsing
//!
//! A response is namespaced XML (usually a SOAP envelope around a
//! `retDistDFeInt` element). Only elements bound to the fiscal namespace are
//! considered, wherever they appear in the tree.

use crate::error::ParseError;
use crate::request::{NFE_NAMESPACE, SOAP_NAMESPACE};
use crate::types::{Cursor, DocumentPackage, ResponseEnvelope, UNKNOWN_SCHEMA};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tracing::{debug, warn};

/// SOAP 1.2 envelope namespace
pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Nfe,
    Soap,
    Other,
}

impl Scope {
    fn of(ns: &ResolveResult<'_>) -> Self {
        match ns {
            ResolveResult::Bound(Namespace(uri)) if *uri == NFE_NAMESPACE.as_bytes() => Scope::Nfe,
            ResolveResult::Bound(Namespace(uri))
                if *uri == SOAP_NAMESPACE.as_bytes() || *uri == SOAP12_NAMESPACE.as_bytes() =>
            {
                Scope::Soap
            }
            _ => Scope::Other,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Cursor,
    MaxCursor,
    StatusCode,
    StatusReason,
    RespondedAt,
    FaultCode,
    FaultReason,
}

struct PendingPackage {
    position: usize,
    nsu: Option<String>,
    schema: Option<String>,
    payload: String,
}

impl PendingPackage {
    fn from_start(start: &BytesStart<'_>, position: usize) -> Self {
        let mut nsu = None;
        let mut schema = None;
        for attr in start.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    warn!(position, error = %e, "malformed docZip attribute ignored");
                    continue;
                }
            };
            let value = match attr.unescape_value() {
                Ok(value) => value.trim().to_string(),
                Err(e) => {
                    warn!(position, error = %e, "undecodable docZip attribute ignored");
                    continue;
                }
            };
            match attr.key.local_name().as_ref() {
                b"NSU" if !value.is_empty() => nsu = Some(value),
                b"schema" if !value.is_empty() => schema = Some(value),
                _ => {}
            }
        }
        Self {
            position,
            nsu,
            schema,
            payload: String::new(),
        }
    }

    fn nsu(&self) -> String {
        self.nsu
            .clone()
            .unwrap_or_else(|| format!("nsu_{}", self.position))
    }

    /// Finish the package, or hand back its sequence id when the body is empty
    fn finish(self) -> Result<DocumentPackage, String> {
        let nsu = self.nsu();
        let payload = self.payload.trim();
        if payload.is_empty() {
            return Err(nsu);
        }
        Ok(DocumentPackage {
            nsu,
            schema: self.schema.unwrap_or_else(|| UNKNOWN_SCHEMA.to_string()),
            payload: payload.to_string(),
        })
    }
}

#[derive(Default)]
struct Collector {
    envelope: ResponseEnvelope,
    raw_cursor: Option<String>,
    raw_max_cursor: Option<String>,
    fault_code: Option<String>,
    fault_reason: Option<String>,
    in_fault: bool,
    saw_fault: bool,
    field: Option<(Field, String)>,
    package: Option<PendingPackage>,
    positions: usize,
}

impl Collector {
    fn start(&mut self, scope: Scope, start: &BytesStart<'_>) {
        let local = start.local_name();
        match (scope, local.as_ref()) {
            (Scope::Nfe, b"docZip") => {
                self.positions += 1;
                self.package = Some(PendingPackage::from_start(start, self.positions));
            }
            (Scope::Nfe, b"ultNSU") => self.field = Some((Field::Cursor, String::new())),
            (Scope::Nfe, b"maxNSU") => self.field = Some((Field::MaxCursor, String::new())),
            (Scope::Nfe, b"cStat") => self.field = Some((Field::StatusCode, String::new())),
            (Scope::Nfe, b"xMotivo") => self.field = Some((Field::StatusReason, String::new())),
            (Scope::Nfe, b"dhResp") => self.field = Some((Field::RespondedAt, String::new())),
            (Scope::Soap, b"Fault") => {
                self.in_fault = true;
                self.saw_fault = true;
            }
            (_, b"faultcode" | b"Value") if self.in_fault => {
                self.field = Some((Field::FaultCode, String::new()))
            }
            (_, b"faultstring" | b"Text") if self.in_fault => {
                self.field = Some((Field::FaultReason, String::new()))
            }
            _ => {}
        }
    }

    fn empty(&mut self, scope: Scope, start: &BytesStart<'_>) {
        match (scope, start.local_name().as_ref()) {
            (Scope::Nfe, b"docZip") => {
                self.positions += 1;
                self.finish_package(PendingPackage::from_start(start, self.positions));
            }
            (Scope::Soap, b"Fault") => self.saw_fault = true,
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(package) = self.package.as_mut() {
            package.payload.push_str(text);
        } else if let Some((_, buffer)) = self.field.as_mut() {
            buffer.push_str(text);
        }
    }

    fn end(&mut self, scope: Scope, local: &[u8]) {
        match (scope, local) {
            (Scope::Nfe, b"docZip") => {
                if let Some(package) = self.package.take() {
                    self.finish_package(package);
                }
            }
            (Scope::Soap, b"Fault") => self.in_fault = false,
            _ => {
                if let Some((field, value)) = self.field.take() {
                    self.store(field, value.trim().to_string());
                }
            }
        }
    }

    fn finish_package(&mut self, package: PendingPackage) {
        match package.finish() {
            Ok(package) => self.envelope.packages.push(package),
            Err(nsu) => {
                warn!(nsu = %nsu, "docZip without content skipped");
                self.envelope.skipped.push(nsu);
            }
        }
    }

    fn store(&mut self, field: Field, value: String) {
        // First occurrence wins, mirroring a document-order search
        let slot = match field {
            Field::Cursor => &mut self.raw_cursor,
            Field::MaxCursor => &mut self.raw_max_cursor,
            Field::StatusCode => &mut self.envelope.status_code,
            Field::StatusReason => &mut self.envelope.status_reason,
            Field::RespondedAt => &mut self.envelope.responded_at,
            Field::FaultCode => &mut self.fault_code,
            Field::FaultReason => &mut self.fault_reason,
        };
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value);
        }
    }

    fn finish(mut self) -> Result<ResponseEnvelope, ParseError> {
        if self.saw_fault {
            return Err(ParseError::SoapFault {
                code: self.fault_code.unwrap_or_default(),
                reason: self.fault_reason.unwrap_or_default(),
            });
        }

        if let Some(raw) = self.raw_cursor {
            let cursor =
                Cursor::parse(&raw).map_err(|_| ParseError::InvalidCursor { value: raw })?;
            self.envelope.cursor = Some(cursor);
        }

        if let Some(raw) = self.raw_max_cursor {
            match Cursor::parse(&raw) {
                Ok(max) => self.envelope.max_cursor = Some(max),
                Err(_) => warn!(value = %raw, "ignoring malformed maxNSU"),
            }
        }

        Ok(self.envelope)
    }
}

/// Extracts the cursor, status and document packages from a raw response
pub struct ResponseParser;

impl ResponseParser {
    /// Parse a raw response
    ///
    /// A well-formed response without packages is valid, and so is one
    /// without an `ultNSU`: the cursor is then `None`. Packages without
    /// `NSU` or `schema` attributes get `nsu_<position>` and
    /// [`UNKNOWN_SCHEMA`]; packages with an empty body are skipped and listed
    /// in [`ResponseEnvelope::skipped`].
    ///
    /// # Errors
    ///
    /// - [`ParseError::Empty`] for blank input
    /// - [`ParseError::Malformed`] when the input is not well-formed XML
    /// - [`ParseError::SoapFault`] when the response is a SOAP fault
    /// - [`ParseError::InvalidCursor`] when `ultNSU` is not a valid cursor
    pub fn parse(raw: &[u8]) -> Result<ResponseEnvelope, ParseError> {
        let mut reader = NsReader::from_reader(raw);
        let mut buf = Vec::new();
        let mut collector = Collector::default();
        let mut depth = 0usize;
        let mut saw_element = false;

        loop {
            let (scope, event) = match reader.read_resolved_event_into(&mut buf) {
                Ok((ns, event)) => (Scope::of(&ns), event),
                Err(e) => {
                    return Err(ParseError::Malformed {
                        reason: e.to_string(),
                    });
                }
            };

            match event {
                Event::Start(start) => {
                    saw_element = true;
                    depth += 1;
                    collector.start(scope, &start);
                }
                Event::Empty(start) => {
                    saw_element = true;
                    collector.empty(scope, &start);
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| ParseError::Malformed {
                        reason: e.to_string(),
                    })?;
                    collector.text(&text);
                }
                Event::CData(data) => {
                    collector.text(&String::from_utf8_lossy(&data.into_inner()));
                }
                Event::End(end) => {
                    depth = depth.saturating_sub(1);
                    collector.end(scope, end.local_name().as_ref());
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_element {
            if raw.iter().all(|b| b.is_ascii_whitespace()) {
                return Err(ParseError::Empty);
            }
            return Err(ParseError::Malformed {
                reason: "no XML element found".to_string(),
            });
        }
        if depth > 0 {
            return Err(ParseError::Malformed {
                reason: format!("unexpected end of document with {} open element(s)", depth),
            });
        }

        let envelope = collector.finish()?;
        debug!(
            cursor = envelope.cursor.as_ref().map(|c| c.as_str()),
            packages = envelope.packages.len(),
            skipped = envelope.skipped.len(),
            status = envelope.status_code.as_deref(),
            "response parsed"
        );
        Ok(envelope)
    }
}
