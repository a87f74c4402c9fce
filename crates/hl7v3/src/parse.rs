//! XML text to labelled tree.
//!
//! `roxmltree` resolves namespaces but does not keep the prefixes or tell us which element made
//! a declaration, so both are reconstructed here from the in-scope namespace lists.

use crate::tree::{namespace_declaration_name, Element};
use crate::{Hl7v3Error, Hl7v3Result};

const XML_PREFIX: &str = "xml";
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Parse an XML document and return its root element.
///
/// Comments, processing instructions and whitespace-only text nodes are dropped. Each element
/// keeps the prefix it was written with and the namespace declarations it made itself.
///
/// # Errors
///
/// Returns [`Hl7v3Error::InvalidXml`] if the text is not well-formed XML.
pub fn parse(xml: &str) -> Hl7v3Result<Element> {
    let document =
        roxmltree::Document::parse(xml).map_err(|e| Hl7v3Error::InvalidXml(e.to_string()))?;
    Ok(convert(document.root_element()))
}

fn convert(node: roxmltree::Node<'_, '_>) -> Element {
    let tag = node.tag_name();
    let prefix = tag
        .namespace()
        .and_then(|uri| element_prefix(node, uri));
    let mut element = Element::new(qualified_name(prefix, tag.name()));

    for (declared_prefix, uri) in declared_here(node) {
        element.set_attribute(namespace_declaration_name(declared_prefix), uri);
    }

    for attribute in node.attributes() {
        let prefix = attribute
            .namespace()
            .and_then(|uri| attribute_prefix(node, uri));
        element.set_attribute(qualified_name(prefix, attribute.name()), attribute.value());
    }

    for child in node.children() {
        if child.is_element() {
            element.push_child(convert(child));
        } else if child.is_text() {
            if let Some(text) = child.text() {
                if !text.trim().is_empty() {
                    element.push_text(text);
                }
            }
        }
    }

    element
}

fn qualified_name(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_owned(),
    }
}

/// Prefix an element name was written with. The default namespace wins when it binds the same
/// URI as a prefix.
fn element_prefix<'input>(node: roxmltree::Node<'_, 'input>, uri: &str) -> Option<&'input str> {
    let default_matches = node
        .namespaces()
        .any(|ns| ns.name().is_none() && ns.uri() == uri);
    if default_matches {
        return None;
    }
    attribute_prefix(node, uri)
}

/// Attributes are never in the default namespace, so only prefixed bindings count.
fn attribute_prefix<'input>(node: roxmltree::Node<'_, 'input>, uri: &str) -> Option<&'input str> {
    if uri == XML_NAMESPACE {
        return Some(XML_PREFIX);
    }
    node.namespaces()
        .find(|ns| ns.name().is_some() && ns.uri() == uri)
        .and_then(|ns| ns.name())
}

/// Namespace bindings in scope at `node` that its parent element did not already have.
fn declared_here<'input>(node: roxmltree::Node<'_, 'input>) -> Vec<(&'input str, String)> {
    let parent = node.parent_element();
    node.namespaces()
        .filter(|ns| ns.name() != Some(XML_PREFIX))
        .filter(|ns| {
            parent.map_or(true, |parent| {
                !parent
                    .namespaces()
                    .any(|inherited| inherited.name() == ns.name() && inherited.uri() == ns.uri())
            })
        })
        .map(|ns| (ns.name().unwrap_or(""), ns.uri().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_prefixes_and_local_declarations() {
        let root = parse(
            r#"<hl7:ParentPrescription xmlns:hl7="urn:hl7-org:v3" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
                 <hl7:id root="0F2D0F70"/>
                 <hl7:value xsi:type="II"/>
               </hl7:ParentPrescription>"#,
        )
        .unwrap();

        assert_eq!(root.name(), "hl7:ParentPrescription");
        assert_eq!(root.attribute("xmlns:hl7"), Some("urn:hl7-org:v3"));

        let id = root.child("id").unwrap();
        assert_eq!(id.name(), "hl7:id");
        assert_eq!(id.attribute("root"), Some("0F2D0F70"));
        assert!(id.namespace_declarations().next().is_none());

        let value = root.child("value").unwrap();
        assert_eq!(value.attribute("xsi:type"), Some("II"));
    }

    #[test]
    fn default_namespace_elements_have_no_prefix() {
        let root = parse(r#"<ParentPrescription xmlns="urn:hl7-org:v3"><id/></ParentPrescription>"#)
            .unwrap();
        assert_eq!(root.name(), "ParentPrescription");
        assert_eq!(root.attribute("xmlns"), Some("urn:hl7-org:v3"));
        assert_eq!(root.child("id").unwrap().name(), "id");
    }

    #[test]
    fn redeclaration_is_recorded_on_the_inner_element() {
        let root = parse(
            r#"<a xmlns="urn:hl7-org:v3"><b xmlns="urn:other"><c/></b></a>"#,
        )
        .unwrap();
        let b = root.child("b").unwrap();
        assert_eq!(b.attribute("xmlns"), Some("urn:other"));
        assert!(b.child("c").unwrap().attribute("xmlns").is_none());
    }

    #[test]
    fn drops_comments_and_whitespace_text() {
        let root = parse("<a>\n  <!-- note -->\n  <b>  text  </b>\n</a>").unwrap();
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.child("b").unwrap().text(), "  text  ");
    }

    #[test]
    fn rejects_malformed_xml() {
        let err = parse("<a><b></a>").unwrap_err();
        assert!(matches!(err, Hl7v3Error::InvalidXml(_)));
    }
}
