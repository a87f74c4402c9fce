//! # EPS Core
//!
//! Digital signatures for HL7 V3 `ParentPrescription` messages.
//!
//! This crate contains the signing and verification logic:
//! - Projection of the signed elements out of a prescription and their namespace rehydration
//! - Assembly and digest of the signable payload, and the XML-DSig `SignedInfo` built over it
//! - Embedding an externally produced signature into the prescription
//! - Verification of an embedded signature: integrity, RSA signature, certificate validity
//!   window, chain of trust and revocation as of the signing time
//!
//! **No API concerns**: HTTP handlers and command line parsing belong in the `eps-run` and
//! `eps-cli` binaries. Configuration is resolved by those binaries and passed in as a
//! [`TrustConfig`].

pub mod certificate;
pub mod config;
pub mod constants;
pub mod digest;
pub mod error;
pub mod fragments;
pub mod prescription;
pub mod revocation;
pub mod signed_info;
pub mod signing;
pub mod verification;

#[cfg(test)]
pub(crate) mod test_support;

pub use certificate::{check_issued_by, check_validity_window, CertificateRecord};
pub use config::{load_trust_config, RevocationPolicy, TrustConfig};
pub use digest::{compute_digest, Digest, DigestAlgorithm};
pub use error::{CoreError, CoreResult};
pub use fragments::{assemble, extract_fragments, SignableFragments, SignablePayload};
pub use prescription::{PrescriptionDocument, ScopedElement};
pub use revocation::{
    check_revocation, check_revocation_with_issuer, CrlFetcher, CrlReasonCode, HttpCrlFetcher,
    RevocationEntry, RevocationError, RevocationList, RevocationStatus, StaticCrlFetcher,
};
pub use signed_info::{
    build_signed_info_payload, canonical_signed_info, SignedInfoDescriptor, SigningAlgorithm,
};
pub use signing::{
    embed_signature, prepare_signing_payload, sign_document, ExternalSignature, LocalRsaSigner,
    PayloadSigner, SigningPayload,
};
pub use verification::{SignatureVerifier, VerificationReport};
