//! X.509 certificate records and validation.
//!
//! A [`CertificateRecord`] keeps the DER bytes of a certificate together with the fields the
//! verifier needs, so that callers never hold a borrowed parser structure across an await.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use eps_types::SerialNumberHex;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::error::{CoreError, CoreResult};

const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// The parts of an X.509 certificate used for signature verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRecord {
    der: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: String,
    pub subject: String,
    pub serial_number_hex: SerialNumberHex,
    pub crl_distribution_point_uris: Vec<String>,
}

impl CertificateRecord {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CertificateParse` if the bytes are not a valid X.509 certificate.
    pub fn from_der(der: &[u8]) -> CoreResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CoreError::CertificateParse(e.to_string()))?;

        let validity = cert.validity();
        Ok(Self {
            der: der.to_vec(),
            not_before: to_utc(validity.not_before)?,
            not_after: to_utc(validity.not_after)?,
            issuer: cert.issuer().to_string(),
            subject: cert.subject().to_string(),
            serial_number_hex: SerialNumberHex::from_bytes(cert.raw_serial()),
            crl_distribution_point_uris: crl_distribution_point_uris(&cert),
        })
    }

    /// Parse a base64 DER certificate, as carried in `X509Certificate` elements. Whitespace in
    /// the text is ignored.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Base64` if the text is not base64, or `CoreError::CertificateParse`
    /// if the decoded bytes are not a certificate.
    pub fn from_base64(text: &str) -> CoreResult<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let der = general_purpose::STANDARD
            .decode(compact)
            .map_err(CoreError::Base64)?;
        Self::from_der(&der)
    }

    /// Parse the first certificate in a PEM document.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CertificateParse` if the text holds no PEM certificate.
    pub fn from_pem(text: &str) -> CoreResult<Self> {
        Self::all_from_pem(text)?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::CertificateParse("no PEM certificate found".into()))
    }

    /// Parse every certificate in a PEM bundle, skipping other PEM sections.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CertificateParse` if a PEM section is malformed or a certificate
    /// section does not hold a valid certificate.
    pub fn all_from_pem(text: &str) -> CoreResult<Vec<Self>> {
        let mut records = Vec::new();
        for pem in Pem::iter_from_buffer(text.as_bytes()) {
            let pem = pem.map_err(|e| CoreError::CertificateParse(e.to_string()))?;
            if pem.label == CERTIFICATE_PEM_LABEL {
                records.push(Self::from_der(&pem.contents)?);
            }
        }
        Ok(records)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Base64 of the DER bytes, the form embedded in a signature block.
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.der)
    }

    /// The subject RSA public key.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CertificateParse` if the certificate does not carry an RSA key.
    pub fn rsa_public_key(&self) -> CoreResult<RsaPublicKey> {
        let cert = self.parsed()?;
        RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| CoreError::CertificateParse(format!("not an RSA public key: {e}")))
    }

    fn parsed(&self) -> CoreResult<X509Certificate<'_>> {
        X509Certificate::from_der(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| CoreError::CertificateParse(e.to_string()))
    }
}

fn to_utc(time: ASN1Time) -> CoreResult<DateTime<Utc>> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| CoreError::CertificateParse(format!("validity out of range: {time}")))
}

fn crl_distribution_point_uris(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut uris = Vec::new();
    for extension in cert.extensions() {
        let ParsedExtension::CRLDistributionPoints(points) = extension.parsed_extension() else {
            continue;
        };
        for point in points.points.iter() {
            if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                for name in names {
                    if let GeneralName::URI(uri) = name {
                        uris.push((*uri).to_owned());
                    }
                }
            }
        }
    }
    uris
}

/// Whether `at` falls within the certificate's validity period, bounds included.
pub fn check_validity_window(cert: &CertificateRecord, at: DateTime<Utc>) -> bool {
    cert.not_before <= at && at <= cert.not_after
}

/// Whether `issuer` issued `cert`: the issuer name matches the issuer's subject and the
/// certificate signature verifies with the issuer's public key.
pub fn check_issued_by(cert: &CertificateRecord, issuer: &CertificateRecord) -> bool {
    let (Ok(cert), Ok(issuer)) = (cert.parsed(), issuer.parsed()) else {
        return false;
    };
    cert.issuer() == issuer.subject() && cert.verify_signature(Some(issuer.public_key())).is_ok()
}
