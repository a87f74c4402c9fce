//! XML-DSig `SignedInfo` construction.
//!
//! The prescriber's signer signs the canonical `SignedInfo`, not the payload itself. The
//! `SignedInfo` names the canonicalization, signature and digest methods and carries the
//! payload digest. Method URIs are fixed by a closed set of algorithm pairs so that a digest
//! can never be announced under the wrong hash.

use base64::{engine::general_purpose, Engine as _};
use hl7v3::{Element, XMLDSIG_NAMESPACE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{EXCLUSIVE_C14N_URI, RSA_SHA1_SIGNATURE_URI, RSA_SHA256_SIGNATURE_URI};
use crate::digest::{Digest, DigestAlgorithm};
use crate::error::{CoreError, CoreResult};

/// RSA PKCS#1 v1.5 signature algorithm, paired with its digest algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSA with SHA-1.
    #[default]
    #[serde(rename = "RS1")]
    Rs1,
    /// RSA with SHA-256.
    #[serde(rename = "RS256")]
    Rs256,
}

impl SigningAlgorithm {
    /// Short code used in signing requests.
    pub fn code(&self) -> &'static str {
        match self {
            SigningAlgorithm::Rs1 => "RS1",
            SigningAlgorithm::Rs256 => "RS256",
        }
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            SigningAlgorithm::Rs1 => DigestAlgorithm::Sha1,
            SigningAlgorithm::Rs256 => DigestAlgorithm::Sha256,
        }
    }

    /// XML-DSig `SignatureMethod` algorithm URI.
    pub fn signature_method_uri(&self) -> &'static str {
        match self {
            SigningAlgorithm::Rs1 => RSA_SHA1_SIGNATURE_URI,
            SigningAlgorithm::Rs256 => RSA_SHA256_SIGNATURE_URI,
        }
    }

    pub fn digest_method_uri(&self) -> &'static str {
        self.digest_algorithm().uri()
    }

    pub fn from_signature_method_uri(uri: &str) -> Option<Self> {
        match uri {
            RSA_SHA1_SIGNATURE_URI => Some(SigningAlgorithm::Rs1),
            RSA_SHA256_SIGNATURE_URI => Some(SigningAlgorithm::Rs256),
            _ => None,
        }
    }

    /// Resolve a digest algorithm and a signing code into a supported pair.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnsupportedAlgorithm` for an unknown signing code, or
    /// `CoreError::UnsupportedAlgorithmPairing` when the code does not pair with `digest`.
    pub fn from_pair(digest: DigestAlgorithm, signing_code: &str) -> CoreResult<Self> {
        let algorithm: SigningAlgorithm = signing_code.parse()?;
        if algorithm.digest_algorithm() != digest {
            return Err(CoreError::UnsupportedAlgorithmPairing {
                digest: digest.to_string(),
                signature: algorithm.code().to_owned(),
            });
        }
        Ok(algorithm)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RS1" => Ok(SigningAlgorithm::Rs1),
            "RS256" => Ok(SigningAlgorithm::Rs256),
            _ => Err(CoreError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

/// The fields of a `SignedInfo` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedInfoDescriptor {
    pub canonicalization_method_uri: String,
    pub signature_method_uri: String,
    pub transform_uri: String,
    pub digest_method_uri: String,
    pub digest_value: String,
}

impl SignedInfoDescriptor {
    /// Describe the `SignedInfo` for `digest` signed with `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnsupportedAlgorithmPairing` if the digest was not produced with the
    /// algorithm's paired hash.
    pub fn new(digest: &Digest, algorithm: SigningAlgorithm) -> CoreResult<Self> {
        if digest.algorithm != algorithm.digest_algorithm() {
            return Err(CoreError::UnsupportedAlgorithmPairing {
                digest: digest.algorithm.to_string(),
                signature: algorithm.code().to_owned(),
            });
        }
        Ok(Self {
            canonicalization_method_uri: EXCLUSIVE_C14N_URI.to_owned(),
            signature_method_uri: algorithm.signature_method_uri().to_owned(),
            transform_uri: EXCLUSIVE_C14N_URI.to_owned(),
            digest_method_uri: algorithm.digest_method_uri().to_owned(),
            digest_value: digest.value.clone(),
        })
    }

    /// Read the fields back from a `SignedInfo` element. Returns `None` if any is absent.
    pub fn from_element(signed_info: &Element) -> Option<Self> {
        let algorithm_of = |path: &[&str]| {
            signed_info
                .descendant(path)
                .and_then(|element| element.attribute("Algorithm"))
                .map(str::to_owned)
        };
        Some(Self {
            canonicalization_method_uri: algorithm_of(&["CanonicalizationMethod"])?,
            signature_method_uri: algorithm_of(&["SignatureMethod"])?,
            transform_uri: algorithm_of(&["Reference", "Transforms", "Transform"])?,
            digest_method_uri: algorithm_of(&["Reference", "DigestMethod"])?,
            digest_value: signed_info
                .descendant(&["Reference", "DigestValue"])
                .map(Element::text)?,
        })
    }

    /// The `SignedInfo` element without a namespace declaration, for embedding inside a
    /// `Signature` that declares it.
    pub fn to_element(&self) -> Element {
        let algorithm = |name: &str, uri: &str| Element::new(name).with_attribute("Algorithm", uri);

        Element::new("SignedInfo")
            .with_child(algorithm(
                "CanonicalizationMethod",
                &self.canonicalization_method_uri,
            ))
            .with_child(algorithm("SignatureMethod", &self.signature_method_uri))
            .with_child(
                Element::new("Reference")
                    .with_child(
                        Element::new("Transforms")
                            .with_child(algorithm("Transform", &self.transform_uri)),
                    )
                    .with_child(algorithm("DigestMethod", &self.digest_method_uri))
                    .with_child(Element::new("DigestValue").with_text(self.digest_value.clone())),
            )
    }

    /// The stand-alone `SignedInfo` element, declaring the XML-DSig namespace.
    pub fn to_namespaced_element(&self) -> Element {
        self.to_element()
            .with_attribute("xmlns", XMLDSIG_NAMESPACE)
    }

    pub fn canonicalize(&self) -> CoreResult<String> {
        Ok(hl7v3::canonicalize(&self.to_namespaced_element())?)
    }
}

/// Canonical `SignedInfo` text for `digest` signed with `algorithm`.
///
/// # Errors
///
/// Returns `CoreError::UnsupportedAlgorithmPairing` if the digest and algorithm do not pair.
pub fn canonical_signed_info(digest: &Digest, algorithm: SigningAlgorithm) -> CoreResult<String> {
    SignedInfoDescriptor::new(digest, algorithm)?.canonicalize()
}

/// Base64 of the canonical `SignedInfo`: the bytes handed to the external signer.
///
/// # Errors
///
/// Returns `CoreError::UnsupportedAlgorithmPairing` if the digest and algorithm do not pair.
pub fn build_signed_info_payload(digest: &Digest, algorithm: SigningAlgorithm) -> CoreResult<String> {
    let canonical = canonical_signed_info(digest, algorithm)?;
    Ok(general_purpose::STANDARD.encode(canonical.as_bytes()))
}
