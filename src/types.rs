//! Core types for distdfe

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Number of digits in a taxpayer id (CNPJ)
pub const TAXPAYER_ID_DIGITS: usize = 14;

/// Number of digits in a cursor (NSU)
pub const CURSOR_DIGITS: usize = 15;

/// Placeholder used when a document package carries no `schema` attribute
pub const UNKNOWN_SCHEMA: &str = "desconhecido";

/// Authority environment a request is addressed to (`tpAmb`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Production environment (`tpAmb = 1`)
    #[default]
    Production,
    /// Homologation (testing) environment (`tpAmb = 2`)
    Homolog,
}

impl Environment {
    /// The `tpAmb` code sent on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Environment::Production => "1",
            Environment::Homolog => "2",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Homolog => write!(f, "homolog"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "production" | "producao" => Ok(Environment::Production),
            "2" | "homolog" | "homologacao" => Ok(Environment::Homolog),
            other => Err(format!("unknown environment {:?} (expected 1 or 2)", other)),
        }
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A validated 14-digit taxpayer id (CNPJ), stored without formatting characters
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaxpayerId(String);

impl TaxpayerId {
    /// Normalize and validate a taxpayer id
    ///
    /// Every non-digit character is stripped first, so formatted input such as
    /// `12.345.678/0001-95` is accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use distdfe::types::TaxpayerId;
    ///
    /// let id = TaxpayerId::parse("12.345.678/0001-95").unwrap();
    /// assert_eq!(id.as_str(), "12345678000195");
    /// assert!(TaxpayerId::parse("123").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != TAXPAYER_ID_DIGITS {
            return Err(ValidationError::InvalidTaxpayerId {
                input: input.to_string(),
                digits: digits.len(),
            });
        }
        Ok(Self(digits))
    }

    /// The 14 digits
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxpayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requester credentials scoping a distribution request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Interested party's taxpayer id
    pub taxpayer_id: TaxpayerId,
    /// Authoring jurisdiction code (`cUFAutor`, IBGE state code)
    pub jurisdiction: String,
    /// Target environment
    pub environment: Environment,
}

impl Identity {
    /// Build an identity from raw input, validating every field
    pub fn new(
        taxpayer_id: &str,
        jurisdiction: &str,
        environment: Environment,
    ) -> Result<Self, ValidationError> {
        let taxpayer_id = TaxpayerId::parse(taxpayer_id)?;
        let jurisdiction = jurisdiction.trim();
        if jurisdiction.len() != 2 || !jurisdiction.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidJurisdiction {
                value: jurisdiction.to_string(),
            });
        }
        Ok(Self {
            taxpayer_id,
            jurisdiction: jurisdiction.to_string(),
            environment,
        })
    }
}

/// Sequential update number (NSU) marking how far the document stream was consumed
///
/// Always 15 zero-padded digits, so string ordering equals numeric ordering.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(String);

impl Cursor {
    /// The starting cursor, `000000000000000`
    pub fn zero() -> Self {
        Self("0".repeat(CURSOR_DIGITS))
    }

    /// Parse a cursor, left-padding shorter digit strings with zeros
    ///
    /// Surrounding whitespace is ignored. Empty input, non-digit characters and
    /// values longer than 15 digits are rejected.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty()
            || trimmed.len() > CURSOR_DIGITS
            || !trimmed.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ValidationError::InvalidCursor {
                value: input.to_string(),
            });
        }
        Ok(Self(format!("{:0>width$}", trimmed, width = CURSOR_DIGITS)))
    }

    /// The 15-digit representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the cursor
    pub fn value(&self) -> u64 {
        // 15 digits always fit in a u64
        self.0.parse().unwrap_or_default()
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cursor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Cursor::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One compressed document bundled in a response (`docZip`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentPackage {
    /// Sequence id (`NSU` attribute, or `nsu_<position>` when absent)
    pub nsu: String,
    /// Schema name (`schema` attribute, or [`UNKNOWN_SCHEMA`] when absent)
    pub schema: String,
    /// Base64 text of the GZIP-compressed document
    pub payload: String,
}

/// A decompressed document ready to be written out
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedDocument {
    /// Bare output file name, `<nsu>_<schema>.xml`
    pub file_name: String,
    /// Sequence id of the source package
    pub nsu: String,
    /// Schema name of the source package
    pub schema: String,
    /// Raw document bytes
    pub content: Vec<u8>,
}

/// Result of parsing a raw distribution response
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// New cursor (`ultNSU`), if the response carried one
    pub cursor: Option<Cursor>,
    /// Highest cursor available at the authority (`maxNSU`)
    pub max_cursor: Option<Cursor>,
    /// Status code (`cStat`), e.g. 137 = no documents, 138 = documents found
    pub status_code: Option<String>,
    /// Status description (`xMotivo`)
    pub status_reason: Option<String>,
    /// Authority response timestamp (`dhResp`)
    pub responded_at: Option<String>,
    /// Document packages, in the order received
    pub packages: Vec<DocumentPackage>,
    /// Sequence ids of packages skipped because their body was empty
    pub skipped: Vec<String>,
}

impl ResponseEnvelope {
    /// Whether the authority holds documents beyond the returned cursor
    pub fn has_more(&self) -> bool {
        match (&self.cursor, &self.max_cursor) {
            (Some(cursor), Some(max)) => cursor < max,
            _ => false,
        }
    }
}
