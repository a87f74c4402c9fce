//! Constants used throughout the EPS core crate.
//!
//! This module holds the XML-DSig algorithm identifiers and the verification report messages
//! so that signing, verification and their callers agree on the exact text.

/// Exclusive XML canonicalization, used both as the canonicalization method and as the
/// reference transform.
pub const EXCLUSIVE_C14N_URI: &str = hl7v3::EXCLUSIVE_C14N_URI;

pub const RSA_SHA1_SIGNATURE_URI: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const RSA_SHA256_SIGNATURE_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

pub const SHA1_DIGEST_URI: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const SHA256_DIGEST_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Root element name of the signable payload.
pub const FRAGMENTS_TO_BE_HASHED: &str = "FragmentsToBeHashed";
/// Element wrapping each group of fragments in the signable payload.
pub const FRAGMENT: &str = "Fragment";

// Verification report entries.

pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
pub const MULTIPLE_CERTIFICATES: &str = "Multiple certificates detected";
pub const DIGEST_MISMATCH: &str = "Signature doesn't match prescription";
pub const INVALID_CERTIFICATE: &str = "Invalid certificate";
pub const SIGNATURE_INVALID: &str = "Signature is invalid";
pub const CERTIFICATE_EXPIRED: &str = "Certificate expired when signed";
pub const CERTIFICATE_NOT_TRUSTED: &str = "Certificate not trusted";
pub const CERTIFICATE_REVOKED: &str = "Certificate has been revoked";
pub const REVOCATION_STATUS_UNKNOWN: &str = "Certificate revocation status unknown";
pub const CA_CERTIFICATE_REVOKED: &str = "CA certificate is revoked";

/// Default bound on a single CRL download.
pub const DEFAULT_CRL_FETCH_TIMEOUT_SECS: u64 = 10;
