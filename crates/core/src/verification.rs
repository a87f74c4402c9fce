//! Verification of an embedded prescription signature.
//!
//! Verification runs in two stages. The first reads the signature block and the signed parts of
//! the document; if anything is missing there is nothing meaningful to check and the report
//! holds a single format failure. The second stage runs every check that applies and collects
//! all failures, so that a dispenser sees the full picture in one report.
//!
//! Expected bad input never surfaces as an `Err`: a tampered document, a foreign certificate or
//! an unreachable CRL distribution point are all report entries.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use eps_types::NonEmptyText;
use hl7v3::Element;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use serde::Serialize;
use sha1::Sha1;
use sha2::Sha256;
use std::sync::Arc;

use crate::certificate::{check_issued_by, check_validity_window, CertificateRecord};
use crate::config::TrustConfig;
use crate::constants::{
    CA_CERTIFICATE_REVOKED, CERTIFICATE_EXPIRED, CERTIFICATE_NOT_TRUSTED, CERTIFICATE_REVOKED,
    DIGEST_MISMATCH, INVALID_CERTIFICATE, INVALID_SIGNATURE_FORMAT, MULTIPLE_CERTIFICATES,
    REVOCATION_STATUS_UNKNOWN, SIGNATURE_INVALID,
};
use crate::digest::compute_digest;
use crate::fragments::{assemble, extract_fragments, SignablePayload};
use crate::prescription::PrescriptionDocument;
use crate::revocation::{check_revocation_with_issuer, CrlFetcher, RevocationStatus};
use crate::signed_info::{canonical_signed_info, SigningAlgorithm};

const PEM_ARMOUR: &str = "-----BEGIN";

/// Ordered verification failures. An empty report means the signature is accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    failures: Vec<String>,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<String> {
        self.failures
    }

    fn contains(&self, failure: &str) -> bool {
        self.failures.iter().any(|f| f == failure)
    }

    fn push(&mut self, failure: &str) {
        self.failures.push(failure.to_owned());
    }
}

// ============================================================================
// STAGE ONE: STRUCTURE
// ============================================================================

/// Everything the checks need, read out of a structurally complete document.
struct VerifiableSignature {
    /// The embedded `SignedInfo` with its inherited namespaces declared.
    signed_info: Element,
    signature_value: NonEmptyText,
    certificate: NonEmptyText,
    payload: SignablePayload,
    signed_at: DateTime<Utc>,
}

/// The raw parts of `author/signatureText/Signature`.
struct SignatureBlock {
    signed_info: Element,
    signature_value: NonEmptyText,
    certificates: Vec<String>,
}

fn signature_block(document: &PrescriptionDocument) -> Option<SignatureBlock> {
    let signature = document.signature_root()?.child("Signature")?;
    let signed_info = signature.child("SignedInfo")?.rehydrated();
    let signature_value = NonEmptyText::new(signature.child("SignatureValue")?.element().text()).ok()?;
    let certificates: Vec<String> = signature
        .path(&["KeyInfo", "X509Data"])?
        .children_named("X509Certificate")
        .iter()
        .map(|certificate| certificate.element().text())
        .collect();

    Some(SignatureBlock {
        signed_info,
        signature_value,
        certificates,
    })
}

fn read_signature(document: &PrescriptionDocument) -> Result<VerifiableSignature, &'static str> {
    let block = signature_block(document).ok_or(INVALID_SIGNATURE_FORMAT)?;

    if block.certificates.len() > 1 || block.certificates.iter().any(|text| text.contains(PEM_ARMOUR)) {
        return Err(MULTIPLE_CERTIFICATES);
    }
    let certificate = block
        .certificates
        .first()
        .and_then(|text| NonEmptyText::new(text).ok())
        .ok_or(INVALID_SIGNATURE_FORMAT)?;

    let payload = extract_fragments(document)
        .map(|fragments| assemble(&fragments))
        .map_err(|_| INVALID_SIGNATURE_FORMAT)?;
    let signed_at = document.signed_at().map_err(|_| INVALID_SIGNATURE_FORMAT)?;

    Ok(VerifiableSignature {
        signed_info: block.signed_info,
        signature_value: block.signature_value,
        certificate,
        payload,
        signed_at,
    })
}

// ============================================================================
// STAGE TWO: CHECKS
// ============================================================================

/// Checks embedded prescription signatures against a trust configuration.
#[derive(Clone)]
pub struct SignatureVerifier {
    config: TrustConfig,
    fetcher: Arc<dyn CrlFetcher>,
}

impl SignatureVerifier {
    pub fn new(config: &TrustConfig, fetcher: Arc<dyn CrlFetcher>) -> Self {
        Self {
            config: config.clone(),
            fetcher,
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Verify the signature embedded in `document`.
    ///
    /// # Returns
    ///
    /// A report listing every failed check, in check order. The report is empty when the
    /// signature is accepted.
    pub async fn verify(&self, document: &PrescriptionDocument) -> VerificationReport {
        let prescription_id = document
            .prescription_id()
            .unwrap_or_else(|| "unknown".to_owned());

        let report = match read_signature(document) {
            Ok(signature) => self.check(&signature).await,
            Err(failure) => {
                let mut report = VerificationReport::default();
                report.push(failure);
                report
            }
        };

        for failure in report.failures() {
            tracing::warn!(%prescription_id, %failure, "prescription signature check failed");
        }
        if report.is_valid() {
            tracing::debug!(%prescription_id, "prescription signature verified");
        }
        report
    }

    async fn check(&self, signature: &VerifiableSignature) -> VerificationReport {
        let mut report = VerificationReport::default();
        let embedded_canonical = hl7v3::canonicalize(&signature.signed_info).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "embedded SignedInfo could not be canonicalized");
            String::new()
        });
        let algorithm = signature
            .signed_info
            .child("SignatureMethod")
            .and_then(|method| method.attribute("Algorithm"))
            .and_then(SigningAlgorithm::from_signature_method_uri);

        if !digest_matches(signature, algorithm, &embedded_canonical) {
            report.push(DIGEST_MISMATCH);
        }

        let Ok(certificate) = CertificateRecord::from_base64(signature.certificate.as_str()) else {
            report.push(INVALID_CERTIFICATE);
            return report;
        };

        if !signature_verifies(
            &certificate,
            algorithm,
            embedded_canonical.as_bytes(),
            signature.signature_value.as_str(),
        ) {
            report.push(SIGNATURE_INVALID);
        }

        if !check_validity_window(&certificate, signature.signed_at) {
            report.push(CERTIFICATE_EXPIRED);
        }

        let issuer = self
            .config
            .trusted_issuers()
            .iter()
            .find(|issuer| check_issued_by(&certificate, issuer));
        if issuer.is_none() {
            report.push(CERTIFICATE_NOT_TRUSTED);
        }

        let status = check_revocation_with_issuer(
            &certificate,
            issuer,
            signature.signed_at,
            self.fetcher.as_ref(),
        )
        .await;
        self.record_revocation(&mut report, &status, CERTIFICATE_REVOKED);

        // Self-signed roots publish no status about themselves.
        if let Some(ca) = issuer.filter(|ca| ca.issuer != ca.subject) {
            let ca_issuer = self
                .config
                .trusted_issuers()
                .iter()
                .find(|candidate| *candidate != ca && check_issued_by(ca, candidate));
            let status = check_revocation_with_issuer(
                ca,
                ca_issuer,
                signature.signed_at,
                self.fetcher.as_ref(),
            )
            .await;
            self.record_revocation(&mut report, &status, CA_CERTIFICATE_REVOKED);
        }

        report
    }

    fn record_revocation(
        &self,
        report: &mut VerificationReport,
        status: &RevocationStatus,
        revoked_failure: &str,
    ) {
        match status {
            RevocationStatus::Revoked { .. } => report.push(revoked_failure),
            RevocationStatus::Unknown(_)
                if self.config.revocation_policy().unknown_is_failure
                    && !report.contains(REVOCATION_STATUS_UNKNOWN) =>
            {
                report.push(REVOCATION_STATUS_UNKNOWN)
            }
            RevocationStatus::Unknown(reason) => {
                tracing::info!(%reason, "revocation status unknown; accepted by policy");
            }
            RevocationStatus::Good => {}
        }
    }
}

/// Whether the embedded `SignedInfo` is the one the current document would produce.
fn digest_matches(
    signature: &VerifiableSignature,
    algorithm: Option<SigningAlgorithm>,
    embedded_canonical: &str,
) -> bool {
    let Some(algorithm) = algorithm else {
        return false;
    };
    compute_digest(&signature.payload, algorithm.digest_algorithm())
        .and_then(|digest| canonical_signed_info(&digest, algorithm))
        .map(|expected| expected == embedded_canonical)
        .unwrap_or(false)
}

/// RSA PKCS#1 v1.5 check of `signature_value_base64` over `signed_bytes`.
fn signature_verifies(
    certificate: &CertificateRecord,
    algorithm: Option<SigningAlgorithm>,
    signed_bytes: &[u8],
    signature_value_base64: &str,
) -> bool {
    let Some(algorithm) = algorithm else {
        return false;
    };
    let compact: String = signature_value_base64
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let Ok(signature_bytes) = general_purpose::STANDARD.decode(compact) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(signature_bytes.as_slice()) else {
        return false;
    };
    let Ok(public_key) = certificate.rsa_public_key() else {
        return false;
    };

    match algorithm {
        SigningAlgorithm::Rs1 => VerifyingKey::<Sha1>::new(public_key)
            .verify(signed_bytes, &signature)
            .is_ok(),
        SigningAlgorithm::Rs256 => VerifyingKey::<Sha256>::new(public_key)
            .verify(signed_bytes, &signature)
            .is_ok(),
    }
}
