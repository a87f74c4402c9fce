//! Content digest of the signable payload.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::constants::{SHA1_DIGEST_URI, SHA256_DIGEST_URI};
use crate::error::{CoreError, CoreResult};
use crate::fragments::SignablePayload;

/// Hash function used for the payload digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA1",
            DigestAlgorithm::Sha256 => "SHA256",
        }
    }

    /// XML-DSig `DigestMethod` algorithm URI.
    pub fn uri(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => SHA1_DIGEST_URI,
            DigestAlgorithm::Sha256 => SHA256_DIGEST_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            SHA1_DIGEST_URI => Some(DigestAlgorithm::Sha1),
            SHA256_DIGEST_URI => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn hash(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Ok(DigestAlgorithm::Sha1),
            "SHA256" | "SHA-256" => Ok(DigestAlgorithm::Sha256),
            _ => Err(CoreError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

/// A base64 digest and the algorithm that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub value: String,
}

/// Digest the canonical text of `payload`.
///
/// # Errors
///
/// Returns `CoreError::Xml` if the payload cannot be canonicalized.
pub fn compute_digest(payload: &SignablePayload, algorithm: DigestAlgorithm) -> CoreResult<Digest> {
    let canonical = payload.canonicalize()?;
    let value = general_purpose::STANDARD.encode(algorithm.hash(canonical.as_bytes()));
    tracing::debug!(%algorithm, digest = %value, "computed payload digest");
    Ok(Digest { algorithm, value })
}
