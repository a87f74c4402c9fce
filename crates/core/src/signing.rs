//! Preparing a prescription for signing and embedding the returned signature.
//!
//! Signing happens outside this crate: a smartcard or remote signing service receives the
//! base64 canonical `SignedInfo`, signs the decoded bytes with the prescriber's key and hands
//! back the signature value and the signing certificate. [`PayloadSigner`] is that seam;
//! [`LocalRsaSigner`] fills it with a key held in memory for development and tests.

use base64::{engine::general_purpose, Engine as _};
use chrono::SecondsFormat;
use hl7v3::{Element, XMLDSIG_NAMESPACE};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;

use crate::certificate::CertificateRecord;
use crate::digest::compute_digest;
use crate::error::{CoreError, CoreResult};
use crate::fragments::{assemble, extract_fragments};
use crate::prescription::PrescriptionDocument;
use crate::signed_info::{build_signed_info_payload, SignedInfoDescriptor, SigningAlgorithm};

/// What an external signer needs to sign a prescription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPayload {
    /// Base64 of the canonical `SignedInfo`.
    pub digest: String,
    /// The author time, RFC 3339 in UTC.
    pub timestamp: String,
    pub algorithm: SigningAlgorithm,
}

/// Build the signing payload for `document`.
///
/// # Errors
///
/// Returns `CoreError::MissingField` if a signed element is absent, or
/// `CoreError::InvalidTimestamp` if the author time cannot be read.
pub fn prepare_signing_payload(
    document: &PrescriptionDocument,
    algorithm: SigningAlgorithm,
) -> CoreResult<SigningPayload> {
    let payload = assemble(&extract_fragments(document)?);
    let digest = compute_digest(&payload, algorithm.digest_algorithm())?;
    let signed_at = document.signed_at()?;

    Ok(SigningPayload {
        digest: build_signed_info_payload(&digest, algorithm)?,
        timestamp: signed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        algorithm,
    })
}

fn signed_info_for(
    document: &PrescriptionDocument,
    algorithm: SigningAlgorithm,
) -> CoreResult<SignedInfoDescriptor> {
    let payload = assemble(&extract_fragments(document)?);
    let digest = compute_digest(&payload, algorithm.digest_algorithm())?;
    SignedInfoDescriptor::new(&digest, algorithm)
}

/// The signer's answer: a base64 signature over the decoded payload and the base64 DER
/// certificate of the signing key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSignature {
    pub signature_value_base64: String,
    pub certificate_der_base64: String,
}

/// Something that can sign a base64 signing payload.
pub trait PayloadSigner {
    /// # Errors
    ///
    /// Returns `CoreError::Base64` if `payload_base64` is not base64, or `CoreError::Sign` if
    /// the signature cannot be produced.
    fn sign(&self, payload_base64: &str, algorithm: SigningAlgorithm)
        -> CoreResult<ExternalSignature>;
}

/// RSA PKCS#1 v1.5 signer holding a private key and its certificate.
#[derive(Clone, Debug)]
pub struct LocalRsaSigner {
    private_key: RsaPrivateKey,
    certificate: CertificateRecord,
}

impl LocalRsaSigner {
    /// Load a PKCS#8 PEM private key and the PEM certificate of its public key.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PrivateKeyParse` if the key cannot be read,
    /// `CoreError::CertificateParse` if the certificate cannot be read, or
    /// `CoreError::InvalidInput` if the certificate is for a different key.
    pub fn from_pem(private_key_pem: &str, certificate_pem: &str) -> CoreResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .map_err(|e| CoreError::PrivateKeyParse(e.to_string()))?;
        let certificate = CertificateRecord::from_pem(certificate_pem)?;

        if certificate.rsa_public_key()? != private_key.to_public_key() {
            return Err(CoreError::InvalidInput(
                "certificate does not match the private key".into(),
            ));
        }

        Ok(Self {
            private_key,
            certificate,
        })
    }

    pub fn certificate(&self) -> &CertificateRecord {
        &self.certificate
    }

    fn sign_bytes(&self, bytes: &[u8], algorithm: SigningAlgorithm) -> CoreResult<Vec<u8>> {
        let key = self.private_key.clone();
        let signature = match algorithm {
            SigningAlgorithm::Rs1 => SigningKey::<Sha1>::new(key)
                .try_sign(bytes)
                .map(|s| s.to_vec()),
            SigningAlgorithm::Rs256 => SigningKey::<Sha256>::new(key)
                .try_sign(bytes)
                .map(|s| s.to_vec()),
        };
        signature.map_err(|e| CoreError::Sign(e.to_string()))
    }
}

impl PayloadSigner for LocalRsaSigner {
    fn sign(
        &self,
        payload_base64: &str,
        algorithm: SigningAlgorithm,
    ) -> CoreResult<ExternalSignature> {
        let bytes = general_purpose::STANDARD
            .decode(payload_base64)
            .map_err(CoreError::Base64)?;
        let signature = self.sign_bytes(&bytes, algorithm)?;

        Ok(ExternalSignature {
            signature_value_base64: general_purpose::STANDARD.encode(signature),
            certificate_der_base64: self.certificate.to_base64(),
        })
    }
}

/// Write the signature block into `author/signatureText`, replacing whatever it held.
///
/// The `SignedInfo` is rebuilt from the document, so `signature` must have been produced over
/// the payload of the same document and algorithm.
///
/// # Errors
///
/// Returns `CoreError::MissingField` if a signed element or the author is absent.
pub fn embed_signature(
    document: &mut PrescriptionDocument,
    algorithm: SigningAlgorithm,
    signature: &ExternalSignature,
) -> CoreResult<()> {
    let signed_info = signed_info_for(document, algorithm)?;

    let block = Element::new("Signature")
        .with_attribute("xmlns", XMLDSIG_NAMESPACE)
        .with_child(signed_info.to_element())
        .with_child(
            Element::new("SignatureValue").with_text(signature.signature_value_base64.clone()),
        )
        .with_child(
            Element::new("KeyInfo").with_child(
                Element::new("X509Data").with_child(
                    Element::new("X509Certificate")
                        .with_text(signature.certificate_der_base64.clone()),
                ),
            ),
        );

    let signature_text = document.signature_root_mut()?;
    signature_text.remove_attribute("nullFlavor");
    signature_text.clear_children();
    signature_text.push_child(block);

    tracing::debug!(
        prescription_id = document.prescription_id().as_deref().unwrap_or("unknown"),
        %algorithm,
        "embedded signature"
    );
    Ok(())
}

/// Prepare, sign and embed in one step.
///
/// # Errors
///
/// Returns the errors of [`prepare_signing_payload`], the signer, and [`embed_signature`].
pub fn sign_document(
    document: &mut PrescriptionDocument,
    algorithm: SigningAlgorithm,
    signer: &dyn PayloadSigner,
) -> CoreResult<()> {
    let payload = prepare_signing_payload(document, algorithm)?;
    let signature = signer.sign(&payload.digest, algorithm)?;
    embed_signature(document, algorithm, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signed_info::canonical_signed_info;
    use crate::digest::DigestAlgorithm;
    use crate::test_support::{pki, prescription_xml, signer_for};

    #[test]
    fn payload_carries_signed_info_timestamp_and_algorithm() {
        let doc = PrescriptionDocument::parse(&prescription_xml()).unwrap();
        let payload = prepare_signing_payload(&doc, SigningAlgorithm::Rs256).unwrap();

        assert_eq!(payload.timestamp, "2024-03-15T09:30:00Z");
        assert_eq!(payload.algorithm, SigningAlgorithm::Rs256);

        let digest = compute_digest(
            &assemble(&extract_fragments(&doc).unwrap()),
            DigestAlgorithm::Sha256,
        )
        .unwrap();
        let decoded = general_purpose::STANDARD.decode(&payload.digest).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            canonical_signed_info(&digest, SigningAlgorithm::Rs256).unwrap()
        );
    }

    #[test]
    fn payload_serializes_algorithm_code() {
        let doc = PrescriptionDocument::parse(&prescription_xml()).unwrap();
        let payload = prepare_signing_payload(&doc, SigningAlgorithm::Rs1).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["algorithm"], "RS1");
        assert_eq!(json["timestamp"], "2024-03-15T09:30:00Z");
    }

    #[test]
    fn payload_requires_signed_fields() {
        let xml = prescription_xml().replace("AgentPerson", "AgentDevice");
        let doc = PrescriptionDocument::parse(&xml).unwrap();
        assert!(matches!(
            prepare_signing_payload(&doc, SigningAlgorithm::Rs1),
            Err(CoreError::MissingField(_))
        ));
    }

    #[test]
    fn embedding_writes_signature_block() {
        let mut doc = PrescriptionDocument::parse(&prescription_xml()).unwrap();
        sign_document(&mut doc, SigningAlgorithm::Rs1, &signer_for(&pki().prescriber)).unwrap();

        let signature_text = doc.signature_root().unwrap();
        let signature_text = signature_text.element();
        assert_eq!(signature_text.attribute("nullFlavor"), None);

        let block = signature_text.child("Signature").unwrap();
        assert_eq!(block.attribute("xmlns"), Some(XMLDSIG_NAMESPACE));
        assert!(block.child("SignedInfo").is_some());
        assert!(!block.child("SignatureValue").unwrap().text().is_empty());
        assert!(block
            .descendant(&["KeyInfo", "X509Data", "X509Certificate"])
            .is_some());
    }

    #[test]
    fn embedding_does_not_change_signed_payload() {
        let mut doc = PrescriptionDocument::parse(&prescription_xml()).unwrap();
        let before = prepare_signing_payload(&doc, SigningAlgorithm::Rs256).unwrap();
        sign_document(&mut doc, SigningAlgorithm::Rs256, &signer_for(&pki().prescriber)).unwrap();
        assert_eq!(prepare_signing_payload(&doc, SigningAlgorithm::Rs256).unwrap(), before);
    }

    #[test]
    fn resigning_replaces_previous_block() {
        let mut doc = PrescriptionDocument::parse(&prescription_xml()).unwrap();
        let signer = signer_for(&pki().prescriber);
        sign_document(&mut doc, SigningAlgorithm::Rs1, &signer).unwrap();
        sign_document(&mut doc, SigningAlgorithm::Rs256, &signer).unwrap();

        let signature_text = doc.signature_root().unwrap();
        assert_eq!(signature_text.element().children_named("Signature").count(), 1);
    }

    #[test]
    fn signer_rejects_mismatched_certificate() {
        let pki = pki();
        let result = LocalRsaSigner::from_pem(&pki.prescriber.key_pem, &pki.expired_prescriber.cert_pem);
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn signer_rejects_non_base64_payload() {
        let signer = signer_for(&pki().prescriber);
        assert!(matches!(
            signer.sign("not base64!", SigningAlgorithm::Rs1),
            Err(CoreError::Base64(_))
        ));
    }
}
