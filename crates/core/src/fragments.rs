//! Signable fragments of a prescription and the payload built from them.
//!
//! A prescriber signs a fixed subset of the prescription, not the whole message: the
//! prescription id, the author time and party, the patient, and every line item. Each part is
//! deep-copied out of the document and rehydrated with the namespaces it inherited so that
//! it canonicalizes identically on its own.
//!
//! Line items are signed with their repeat-dispensing interval reduced to the upper bound: the
//! `low` value of `repeatNumber` changes on every issue of a repeat prescription, and the
//! signature must stay valid across issues.

use hl7v3::Element;

use crate::constants::{FRAGMENT, FRAGMENTS_TO_BE_HASHED};
use crate::error::CoreResult;
use crate::prescription::{missing, PrescriptionDocument};

/// Deep, rehydrated copies of the signed parts of a prescription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignableFragments {
    pub id: Element,
    pub time: Element,
    pub author_party: Element,
    pub record_target: Element,
    pub line_items: Vec<Element>,
}

/// Extract the signable fragments of a prescription.
///
/// The result depends only on the signed elements: anything else in the document may change
/// without changing the fragments.
///
/// # Errors
///
/// Returns `CoreError::MissingField` naming the first absent element when the prescription has
/// no id, author time, author party, record target, or no line items at all.
pub fn extract_fragments(document: &PrescriptionDocument) -> CoreResult<SignableFragments> {
    let id = document.id().ok_or_else(|| missing("id"))?;
    let time = document.author_time().ok_or_else(|| missing("author/time"))?;
    let author_party = document
        .author_party()
        .ok_or_else(|| missing("author/AgentPerson"))?;
    let record_target = document
        .record_target()
        .ok_or_else(|| missing("recordTarget"))?;

    let line_items: Vec<Element> = document
        .line_items()
        .iter()
        .map(|item| without_repeat_low(item.rehydrated()))
        .collect();
    if line_items.is_empty() {
        return Err(missing("pertinentInformation2/pertinentLineItem"));
    }

    Ok(SignableFragments {
        id: id.rehydrated(),
        time: time.rehydrated(),
        author_party: author_party.rehydrated(),
        record_target: record_target.rehydrated(),
        line_items,
    })
}

/// Replace `repeatNumber` with a fresh one that carries only its `high` bound.
fn without_repeat_low(mut line_item: Element) -> Element {
    if let Some(repeat_number) = line_item.child_mut("repeatNumber") {
        let mut rebuilt = Element::new(repeat_number.name());
        if let Some(high) = repeat_number.child("high") {
            rebuilt.push_child(high.clone());
        }
        *repeat_number = rebuilt;
    }
    line_item
}

/// The ordered fragment records that are digested and signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignablePayload {
    fragments: Vec<Vec<Element>>,
}

/// Arrange fragments into the payload.
///
/// The order is fixed: `{time, id}`, `{AgentPerson}`, `{recordTarget}`, then one record per line
/// item in document order.
pub fn assemble(fragments: &SignableFragments) -> SignablePayload {
    let mut records = vec![
        vec![fragments.time.clone(), fragments.id.clone()],
        vec![fragments.author_party.clone()],
        vec![fragments.record_target.clone()],
    ];
    records.extend(fragments.line_items.iter().map(|item| vec![item.clone()]));
    SignablePayload { fragments: records }
}

impl SignablePayload {
    /// The payload as a `FragmentsToBeHashed` element.
    pub fn to_element(&self) -> Element {
        self.fragments
            .iter()
            .fold(Element::new(FRAGMENTS_TO_BE_HASHED), |payload, record| {
                let fragment = record
                    .iter()
                    .fold(Element::new(FRAGMENT), |fragment, element| {
                        fragment.with_child(element.clone())
                    });
                payload.with_child(fragment)
            })
    }

    /// Canonical text of the payload; this is what gets digested.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Xml` if the payload cannot be canonicalized.
    pub fn canonicalize(&self) -> CoreResult<String> {
        Ok(hl7v3::canonicalize(&self.to_element())?)
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }
}
