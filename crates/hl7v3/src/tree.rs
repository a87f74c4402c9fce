//! Labelled XML tree.
//!
//! The tree is a plain sum type: a node is either an element or a run of text. Namespace
//! declarations are kept as ordinary `xmlns` / `xmlns:prefix` attributes on the element that
//! declares them, which keeps copies of a subtree honest about what they do and do not declare.
//!
//! Lookups by child name (`child`, `children_named`, `descendant`) compare *local* names, so
//! `hl7:id` and `id` both match `"id"`.

use std::collections::BTreeMap;

const XMLNS: &str = "xmlns";
const XMLNS_PREFIXED: &str = "xmlns:";

/// A node of the labelled tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

/// An XML element with its qualified name, attributes and ordered children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: BTreeMap<String, String>,
    children: Vec<XmlNode>,
}

impl Element {
    /// Create an element with no attributes and no children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Qualified name as written (`prefix:local` or `local`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qualified_name(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qualified_name(&self.name).1
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.push_child(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes, namespace declarations included, ordered by qualified name.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    pub fn clear_children(&mut self) {
        self.children.clear();
    }

    /// Child elements in document order, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.child_elements()
            .find(|element| element.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(element) if element.local_name() == local_name => Some(element),
            _ => None,
        })
    }

    /// Every child element with the given local name, in document order.
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements()
            .filter(move |element| element.local_name() == local_name)
    }

    /// Follow a path of local names through first-matching children.
    pub fn descendant(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, local_name| element.child(local_name))
    }

    pub fn descendant_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let mut current = self;
        for local_name in path {
            current = current.child_mut(local_name)?;
        }
        Some(current)
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Namespace declarations made on this element, as `(prefix, uri)` with `""` for the
    /// default namespace.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes().filter_map(|(name, value)| {
            namespace_declaration_prefix(name).map(|prefix| (prefix, value))
        })
    }

    /// Deep copy of this element whose root also declares every namespace in `scope` that it
    /// does not declare itself.
    ///
    /// A subtree lifted out of a larger document loses the declarations its ancestors made.
    /// Re-declaring them on the copy's root makes the copy canonicalize the same way on its own
    /// as it did in place.
    pub fn with_inherited_namespaces(&self, scope: &NamespaceScope) -> Element {
        let mut copy = self.clone();
        for (prefix, uri) in scope.iter() {
            let attribute = namespace_declaration_name(prefix);
            if copy.attribute(&attribute).is_none() {
                copy.set_attribute(attribute, uri);
            }
        }
        copy
    }
}

/// Namespace declarations in scope at some position of a tree, keyed by prefix (`""` is the
/// default namespace).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceScope(BTreeMap<String, String>);

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.0.get(prefix).map(String::as_str)
    }

    pub fn declare(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.0.insert(prefix.into(), uri.into());
    }

    /// The scope inside `element`: this scope plus the element's own declarations.
    pub fn enter(&self, element: &Element) -> Self {
        let mut scope = self.clone();
        for (prefix, uri) in element.namespace_declarations() {
            scope.declare(prefix, uri);
        }
        scope
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Split `prefix:local` into its parts.
pub(crate) fn split_qualified_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// `Some(prefix)` if `name` is a namespace declaration attribute.
pub(crate) fn namespace_declaration_prefix(name: &str) -> Option<&str> {
    if name == XMLNS {
        Some("")
    } else {
        name.strip_prefix(XMLNS_PREFIXED)
    }
}

pub(crate) fn namespace_declaration_name(prefix: &str) -> String {
    if prefix.is_empty() {
        XMLNS.to_owned()
    } else {
        format!("{XMLNS_PREFIXED}{prefix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_item() -> Element {
        Element::new("pertinentLineItem")
            .with_attribute("classCode", "SBADM")
            .with_child(Element::new("id").with_attribute("root", "A54219B8"))
            .with_child(
                Element::new("repeatNumber")
                    .with_child(Element::new("low").with_attribute("value", "1"))
                    .with_child(Element::new("high").with_attribute("value", "6")),
            )
    }

    #[test]
    fn local_name_ignores_prefix() {
        let element = Element::new("hl7:id");
        assert_eq!(element.prefix(), Some("hl7"));
        assert_eq!(element.local_name(), "id");
        assert_eq!(Element::new("id").prefix(), None);
    }

    #[test]
    fn descendant_follows_first_matching_children() {
        let item = line_item();
        let high = item.descendant(&["repeatNumber", "high"]).unwrap();
        assert_eq!(high.attribute("value"), Some("6"));
        assert!(item.descendant(&["repeatNumber", "width"]).is_none());
    }

    #[test]
    fn child_mut_edits_first_matching_child() {
        let mut item = line_item();
        item.child_mut("repeatNumber")
            .unwrap()
            .set_attribute("nullFlavor", "NA");
        assert_eq!(item.children_named("repeatNumber").count(), 1);
        assert_eq!(
            item.child("repeatNumber").unwrap().attribute("nullFlavor"),
            Some("NA")
        );
        assert!(item.child_mut("signatureText").is_none());
    }

    #[test]
    fn inherited_namespaces_do_not_override_own_declarations() {
        let mut scope = NamespaceScope::new();
        scope.declare("", "urn:hl7-org:v3");
        scope.declare("xsi", "http://www.w3.org/2001/XMLSchema-instance");

        let element = Element::new("AgentPerson").with_attribute("xmlns", "urn:example");
        let copy = element.with_inherited_namespaces(&scope);

        assert_eq!(copy.attribute("xmlns"), Some("urn:example"));
        assert_eq!(
            copy.attribute("xmlns:xsi"),
            Some("http://www.w3.org/2001/XMLSchema-instance")
        );
    }

    #[test]
    fn scope_enter_adds_element_declarations() {
        let element = Element::new("ParentPrescription")
            .with_attribute("xmlns", "urn:hl7-org:v3")
            .with_attribute("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .with_attribute("classCode", "INFO");

        let scope = NamespaceScope::new().enter(&element);
        assert_eq!(scope.get(""), Some("urn:hl7-org:v3"));
        assert_eq!(
            scope.get("xsi"),
            Some("http://www.w3.org/2001/XMLSchema-instance")
        );
        assert_eq!(scope.iter().count(), 2);
    }

    #[test]
    fn text_concatenates_direct_text_only() {
        let element = Element::new("text")
            .with_text("Take one ")
            .with_child(Element::new("b").with_text("ignored"))
            .with_text("daily");
        assert_eq!(element.text(), "Take one daily");
    }
}
