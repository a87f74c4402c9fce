//! Read-only projections over an HL7 V3 `ParentPrescription`.
//!
//! Signing only cares about a handful of elements in a prescription message. Rather than model
//! the whole message, [`PrescriptionDocument`] keeps the parsed tree and exposes one projection
//! per element of interest. Every projection carries the namespace declarations in scope at the
//! element's position so that a copy can be rehydrated before it is canonicalized on its own.

use chrono::{DateTime, Utc};
use hl7v3::{Element, NamespaceScope};

use crate::error::{CoreError, CoreResult};

const ROOT: &str = "ParentPrescription";
const PERTINENT_PRESCRIPTION: [&str; 2] = ["pertinentInformation1", "pertinentPrescription"];

/// An element of the document together with the namespace declarations its ancestors made.
#[derive(Clone, Debug)]
pub struct ScopedElement<'a> {
    element: &'a Element,
    scope: NamespaceScope,
}

impl<'a> ScopedElement<'a> {
    pub fn element(&self) -> &'a Element {
        self.element
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    /// Deep copy of the element that also declares every namespace it inherited.
    pub fn rehydrated(&self) -> Element {
        self.element.with_inherited_namespaces(&self.scope)
    }

    pub(crate) fn child(&self, local_name: &str) -> Option<ScopedElement<'a>> {
        let scope = self.scope.enter(self.element);
        self.element
            .child(local_name)
            .map(|element| ScopedElement { element, scope })
    }

    pub(crate) fn path(&self, path: &[&str]) -> Option<ScopedElement<'a>> {
        path.iter()
            .try_fold(self.clone(), |current, local_name| current.child(local_name))
    }

    pub(crate) fn children_named(&self, local_name: &'a str) -> Vec<ScopedElement<'a>> {
        let scope = self.scope.enter(self.element);
        self.element
            .children_named(local_name)
            .map(|element| ScopedElement {
                element,
                scope: scope.clone(),
            })
            .collect()
    }
}

/// A parsed prescription message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrescriptionDocument {
    root: Element,
}

impl PrescriptionDocument {
    /// Parse a `ParentPrescription` from XML text.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Xml` if the text is not well-formed XML, or
    /// `CoreError::InvalidInput` if the root element is not a `ParentPrescription`.
    pub fn parse(xml: &str) -> CoreResult<Self> {
        Self::from_element(hl7v3::parse(xml)?)
    }

    /// Wrap an already parsed `ParentPrescription` element.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if the element is not a `ParentPrescription`.
    pub fn from_element(root: Element) -> CoreResult<Self> {
        if root.local_name() != ROOT {
            return Err(CoreError::InvalidInput(format!(
                "expected {ROOT} root element, found {}",
                root.name()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    #[cfg(test)]
    pub(crate) fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn into_element(self) -> Element {
        self.root
    }

    /// Serialise the document.
    pub fn to_xml(&self) -> String {
        hl7v3::serialize(&self.root)
    }

    fn scoped_root(&self) -> ScopedElement<'_> {
        ScopedElement {
            element: &self.root,
            scope: NamespaceScope::new(),
        }
    }

    fn pertinent_prescription(&self) -> Option<ScopedElement<'_>> {
        self.scoped_root().path(&PERTINENT_PRESCRIPTION)
    }

    fn author(&self) -> Option<ScopedElement<'_>> {
        self.pertinent_prescription()?.child("author")
    }

    /// First `id` of the prescription.
    pub fn id(&self) -> Option<ScopedElement<'_>> {
        self.pertinent_prescription()?.child("id")
    }

    /// `author/time`, the moment the prescriber signed.
    pub fn author_time(&self) -> Option<ScopedElement<'_>> {
        self.author()?.child("time")
    }

    /// `author/AgentPerson`, the prescriber and their organisation.
    pub fn author_party(&self) -> Option<ScopedElement<'_>> {
        self.author()?.child("AgentPerson")
    }

    /// `recordTarget`, the patient.
    pub fn record_target(&self) -> Option<ScopedElement<'_>> {
        self.scoped_root().child("recordTarget")
    }

    /// Every `pertinentInformation2/pertinentLineItem`, in document order.
    pub fn line_items(&self) -> Vec<ScopedElement<'_>> {
        let Some(prescription) = self.pertinent_prescription() else {
            return Vec::new();
        };
        prescription
            .children_named("pertinentInformation2")
            .iter()
            .filter_map(|information| information.child("pertinentLineItem"))
            .collect()
    }

    /// `author/signatureText`, where the signature block lives.
    pub fn signature_root(&self) -> Option<ScopedElement<'_>> {
        self.author()?.child("signatureText")
    }

    /// `author/signatureText`, created if the author has none.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MissingField` if the prescription has no author.
    pub(crate) fn signature_root_mut(&mut self) -> CoreResult<&mut Element> {
        let author = self
            .root
            .descendant_mut(&[PERTINENT_PRESCRIPTION[0], PERTINENT_PRESCRIPTION[1], "author"])
            .ok_or_else(|| missing("author"))?;
        if author.child("signatureText").is_none() {
            author.push_child(Element::new("signatureText"));
        }
        author
            .child_mut("signatureText")
            .ok_or_else(|| missing("author/signatureText"))
    }

    /// The `root` of the prescription id, for log context.
    pub fn prescription_id(&self) -> Option<String> {
        self.id()
            .and_then(|id| id.element().attribute("root").map(str::to_owned))
    }

    /// The author time as a UTC instant.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MissingField` if `author/time/@value` is absent, or
    /// `CoreError::InvalidTimestamp` if it is not an HL7 timestamp.
    pub fn signed_at(&self) -> CoreResult<DateTime<Utc>> {
        let time = self.author_time().ok_or_else(|| missing("author/time"))?;
        let value = time
            .element()
            .attribute("value")
            .ok_or_else(|| missing("author/time/@value"))?;
        hl7v3::parse_hl7_timestamp(value)
            .map_err(|_| CoreError::InvalidTimestamp(value.to_owned()))
    }
}

pub(crate) fn missing(path: &str) -> CoreError {
    CoreError::MissingField(format!("{ROOT}/{}", field_path(path)))
}

fn field_path(path: &str) -> String {
    if path == "recordTarget" {
        path.to_owned()
    } else {
        format!("pertinentInformation1/pertinentPrescription/{path}")
    }
}
