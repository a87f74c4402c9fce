//! HL7 V3 wire/boundary support.
//!
//! This crate is responsible for the XML side of prescription messages:
//! - a labelled tree ([`Element`] / [`XmlNode`]) that the signature code projects over,
//! - parsing XML text into that tree,
//! - serialisation of that tree, and exclusive canonicalization (`xml-exc-c14n`) of a
//!   stand-alone element through `bergshamra_c14n`,
//! - HL7 V3 timestamp (`TS`) conversion.
//!
//! Clinical meaning and signature rules live in `eps-core`. This crate handles the wire
//! format only, and knows nothing about which parts of a prescription are signed.

pub mod canonical;
pub mod parse;
pub mod timestamp;
pub mod tree;

pub use canonical::{canonicalize, serialize, EXCLUSIVE_C14N_URI};
pub use parse::parse;
pub use timestamp::{format_hl7_timestamp, parse_hl7_timestamp};
pub use tree::{Element, NamespaceScope, XmlNode};

/// Default namespace of HL7 V3 messages.
pub const HL7_NAMESPACE: &str = "urn:hl7-org:v3";

/// Namespace of XML digital signature elements.
pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Errors returned by the `hl7v3` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum Hl7v3Error {
    #[error("invalid XML: {0}")]
    InvalidXml(String),

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("invalid HL7 timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Type alias for Results that can fail with a [`Hl7v3Error`].
pub type Hl7v3Result<T> = Result<T, Hl7v3Error>;
