//! Serialisation of the labelled tree, and exclusive XML canonicalization of a stand-alone
//! element.
//!
//! The element passed to [`canonicalize`] is treated as the apex of the output: no ancestor
//! declarations are assumed, so a subtree lifted out of a document must be rehydrated first.

use bergshamra_c14n::C14nMode;

use crate::tree::{Element, XmlNode};
use crate::{Hl7v3Error, Hl7v3Result};

/// Algorithm URI for exclusive canonicalization without comments.
pub const EXCLUSIVE_C14N_URI: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML text of `element` and its subtree.
///
/// Namespace declarations are written where the tree records them. Empty elements are written
/// as start/end pairs.
pub fn serialize(element: &Element) -> String {
    let mut out = String::new();
    write_element(element, &mut out);
    out
}

/// Exclusive canonical text of `element` and its subtree.
///
/// Equal trees always produce byte-equal text.
///
/// # Errors
///
/// Returns [`Hl7v3Error::InvalidXml`] if the element uses a prefix it does not declare, and
/// [`Hl7v3Error::Canonicalization`] if the canonicalizer rejects the document.
pub fn canonicalize(element: &Element) -> Hl7v3Result<String> {
    let xml = serialize(element);
    let document =
        roxmltree::Document::parse(&xml).map_err(|e| Hl7v3Error::InvalidXml(e.to_string()))?;
    let mode = C14nMode::from_uri(EXCLUSIVE_C14N_URI).ok_or_else(|| {
        Hl7v3Error::Canonicalization(format!("unsupported mode {EXCLUSIVE_C14N_URI}"))
    })?;
    let inclusive_prefixes: Vec<String> = Vec::new();

    let canonical = bergshamra_c14n::canonicalize_doc(&document, mode, None, &inclusive_prefixes)
        .map_err(|e| Hl7v3Error::Canonicalization(e.to_string()))?;
    String::from_utf8(canonical).map_err(|e| Hl7v3Error::Canonicalization(e.to_string()))
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(element.name());
    for (name, value) in element.attributes() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attribute(value, out);
        out.push('"');
    }
    out.push('>');

    for child in element.children() {
        match child {
            XmlNode::Element(child) => write_element(child, out),
            XmlNode::Text(text) => escape_text(text, out),
        }
    }

    out.push_str("</");
    out.push_str(element.name());
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

// Whitespace is written as character references so the parser does not normalise it.
fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
