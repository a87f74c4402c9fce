//! Development public key infrastructure for prescription signing.
//!
//! Prescription signatures are RSA PKCS#1 v1.5 over an XML-DSig `SignedInfo`, checked against
//! X.509 certificates issued by a trusted authority that publishes certificate revocation
//! lists. This crate mints that material for local development and tests:
//! - RSA key pairs,
//! - a certificate authority (root and intermediate),
//! - prescriber signing certificates carrying a CRL distribution point,
//! - CRLs with per-entry reason codes.
//!
//! It is not a production CA. Keys are returned as PKCS#8 PEM and nothing is persisted.

use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, CrlDistributionPoint,
    DistinguishedName, DnType, Ia5String, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevokedCertParams, SanType, SerialNumber,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use thiserror::Error;
use time::OffsetDateTime;

pub use rcgen::RevocationReason;

/// Modulus size of generated RSA keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Errors that can occur during certificate and CRL creation.
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Failed to generate key pair: {0}")]
    KeyGeneration(String),
    #[error("Failed to generate certificate: {0}")]
    GenerationError(String),
    #[error("Invalid certificate request: {0}")]
    InvalidRequest(String),
}

pub type CertificateResult<T> = Result<T, CertificateError>;

/// Generate an RSA private key and return it as PKCS#8 PEM.
///
/// # Errors
///
/// Returns `CertificateError::KeyGeneration` if key generation or encoding fails.
pub fn generate_rsa_key_pem() -> CertificateResult<String> {
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    Ok(pem.to_string())
}

fn rsa_key_pair(key_pem: &str) -> CertificateResult<KeyPair> {
    KeyPair::from_pem_and_sign_algo(key_pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))
}

fn serial_number(serial: u64) -> SerialNumber {
    SerialNumber::from(serial.to_be_bytes().to_vec())
}

fn generation_error(e: rcgen::Error) -> CertificateError {
    CertificateError::GenerationError(e.to_string())
}

// ============================================================================
// VALIDITY
// ============================================================================

/// Validity period of a certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validity {
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl Validity {
    /// # Errors
    ///
    /// Returns `CertificateError::InvalidRequest` if `not_after` is not later than `not_before`.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> CertificateResult<Self> {
        if not_after <= not_before {
            return Err(CertificateError::InvalidRequest(
                "not_after must be later than not_before".into(),
            ));
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// From now until `days` days from now.
    pub fn days_from_now(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + time::Duration::days(days.max(1)),
        }
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    fn apply(&self, params: &mut CertificateParams) {
        params.not_before = self.not_before;
        params.not_after = self.not_after;
    }
}

// ============================================================================
// CERTIFICATE AUTHORITY
// ============================================================================

/// A certificate authority able to issue certificates and revocation lists.
pub struct CertificateAuthority {
    certificate: rcgen::Certificate,
    key_pair: KeyPair,
    key_pem: String,
    serial: u64,
}

/// What to put in a prescriber signing certificate.
#[derive(Clone, Debug)]
pub struct PrescriberRequest {
    /// Full name of the prescriber (Subject Common Name).
    pub name: String,
    /// Registration body, e.g. "GMC".
    pub registration_authority: String,
    /// Registration number within that body.
    pub registration_number: String,
    pub serial: u64,
    pub validity: Validity,
    /// URI published in the CRL distribution points extension.
    pub crl_distribution_point: Option<String>,
}

/// A certificate issued by a [`CertificateAuthority`] together with its private key.
#[derive(Clone, Debug)]
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub cert_der: Vec<u8>,
    pub key_pem: String,
    pub serial: u64,
}

/// A certificate listed on a revocation list.
#[derive(Clone, Debug)]
pub struct RevokedSerial {
    pub serial: u64,
    pub revoked_at: OffsetDateTime,
    pub reason: Option<RevocationReason>,
}

/// Contents of a revocation list to issue.
#[derive(Clone, Debug)]
pub struct RevocationListRequest {
    pub crl_number: u64,
    pub this_update: OffsetDateTime,
    pub next_update: OffsetDateTime,
    pub revoked: Vec<RevokedSerial>,
}

impl CertificateAuthority {
    /// Creates a self-signed root authority with a fresh RSA key.
    ///
    /// # Arguments
    ///
    /// * `common_name` - Subject Common Name of the authority.
    /// * `validity` - Validity period of the root certificate.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError` if key generation or self-signing fails.
    pub fn create(common_name: &str, validity: Validity) -> CertificateResult<Self> {
        let key_pem = generate_rsa_key_pem()?;
        let key_pair = rsa_key_pair(&key_pem)?;

        let serial = 1;
        let params = authority_params(common_name, validity, serial, None, None)?;
        let certificate = params.self_signed(&key_pair).map_err(generation_error)?;

        Ok(Self {
            certificate,
            key_pair,
            key_pem,
            serial,
        })
    }

    /// Issues a subordinate authority signed by this one.
    ///
    /// The subordinate may carry a CRL distribution point so that its own revocation status can
    /// be checked against this authority's list.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError` if key generation or signing fails.
    pub fn create_intermediate(
        &self,
        common_name: &str,
        validity: Validity,
        serial: u64,
        crl_distribution_point: Option<&str>,
    ) -> CertificateResult<Self> {
        let key_pem = generate_rsa_key_pem()?;
        let key_pair = rsa_key_pair(&key_pem)?;

        let params = authority_params(
            common_name,
            validity,
            serial,
            Some(BasicConstraints::Constrained(0)),
            crl_distribution_point,
        )?;
        let certificate = params
            .signed_by(&key_pair, &self.certificate, &self.key_pair)
            .map_err(generation_error)?;

        Ok(Self {
            certificate,
            key_pair,
            key_pem,
            serial,
        })
    }

    pub fn cert_pem(&self) -> String {
        self.certificate.pem()
    }

    pub fn cert_der(&self) -> Vec<u8> {
        self.certificate.der().to_vec()
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Issues a prescriber signing certificate with a fresh RSA key.
    ///
    /// The subject carries the prescriber's name as Common Name and their professional
    /// registration as a `urn:eps:registration:<authority>:<number>` subject alternative name.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::InvalidRequest` for an empty name or registration, or
    /// `CertificateError` if key generation or signing fails.
    pub fn issue_prescriber(
        &self,
        request: &PrescriberRequest,
    ) -> CertificateResult<IssuedCertificate> {
        if request.name.trim().is_empty() {
            return Err(CertificateError::InvalidRequest(
                "prescriber name cannot be empty".into(),
            ));
        }
        if request.registration_authority.trim().is_empty()
            || request.registration_number.trim().is_empty()
        {
            return Err(CertificateError::InvalidRequest(
                "registration authority and number are required".into(),
            ));
        }

        let key_pem = generate_rsa_key_pem()?;
        let key_pair = rsa_key_pair(&key_pem)?;

        let mut params = CertificateParams::default();
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, request.name.as_str());
        params.distinguished_name = subject;
        params.is_ca = IsCa::NoCa;

        let uri = format!(
            "urn:eps:registration:{}:{}",
            request.registration_authority, request.registration_number
        );
        let uri = Ia5String::try_from(uri).map_err(generation_error)?;
        params.subject_alt_names.push(SanType::URI(uri));

        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
        ];
        request.validity.apply(&mut params);
        params.serial_number = Some(serial_number(request.serial));
        if let Some(uri) = &request.crl_distribution_point {
            params.crl_distribution_points = vec![CrlDistributionPoint {
                uris: vec![uri.clone()],
            }];
        }

        let cert = params
            .signed_by(&key_pair, &self.certificate, &self.key_pair)
            .map_err(generation_error)?;

        Ok(IssuedCertificate {
            cert_pem: cert.pem(),
            cert_der: cert.der().to_vec(),
            key_pem,
            serial: request.serial,
        })
    }

    /// Issues a DER-encoded certificate revocation list signed by this authority.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError::InvalidRequest` if `next_update` is not after `this_update`,
    /// or `CertificateError::GenerationError` if signing fails.
    pub fn issue_revocation_list(
        &self,
        request: &RevocationListRequest,
    ) -> CertificateResult<Vec<u8>> {
        if request.next_update <= request.this_update {
            return Err(CertificateError::InvalidRequest(
                "next_update must be later than this_update".into(),
            ));
        }

        let params = CertificateRevocationListParams {
            this_update: request.this_update,
            next_update: request.next_update,
            crl_number: serial_number(request.crl_number),
            issuing_distribution_point: None,
            revoked_certs: request
                .revoked
                .iter()
                .map(|revoked| RevokedCertParams {
                    serial_number: serial_number(revoked.serial),
                    revocation_time: revoked.revoked_at,
                    reason_code: revoked.reason.clone(),
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        };

        let crl = params
            .signed_by(&self.certificate, &self.key_pair)
            .map_err(generation_error)?;
        Ok(crl.der().to_vec())
    }
}

fn authority_params(
    common_name: &str,
    validity: Validity,
    serial: u64,
    constraints: Option<BasicConstraints>,
    crl_distribution_point: Option<&str>,
) -> CertificateResult<CertificateParams> {
    if common_name.trim().is_empty() {
        return Err(CertificateError::InvalidRequest(
            "authority common name cannot be empty".into(),
        ));
    }

    let mut params = CertificateParams::default();
    let mut subject = DistinguishedName::new();
    subject.push(DnType::CommonName, common_name);
    subject.push(DnType::OrganizationName, "EPS Development PKI");
    params.distinguished_name = subject;
    params.is_ca = IsCa::Ca(constraints.unwrap_or(BasicConstraints::Unconstrained));
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    validity.apply(&mut params);
    params.serial_number = Some(serial_number(serial));
    if let Some(uri) = crl_distribution_point {
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: vec![uri.to_owned()],
        }];
    }
    Ok(params)
}

// ============================================================================
// DEVELOPMENT BUNDLE
// ============================================================================

/// A ready-to-use authority, prescriber certificate and (empty) revocation list.
pub struct DevelopmentPki {
    pub authority: CertificateAuthority,
    pub prescriber: IssuedCertificate,
    pub revocation_list_der: Vec<u8>,
}

impl DevelopmentPki {
    /// Generates a root authority valid for ten years, a prescriber certificate valid for one
    /// year whose CRL distribution point is `crl_uri`, and an empty CRL valid for 30 days.
    ///
    /// # Errors
    ///
    /// Returns `CertificateError` if any key generation or signing step fails.
    pub fn generate(crl_uri: &str) -> CertificateResult<Self> {
        let authority = CertificateAuthority::create(
            "EPS Development Root CA",
            Validity::days_from_now(3650),
        )?;
        let prescriber = authority.issue_prescriber(&PrescriberRequest {
            name: "Development Prescriber".into(),
            registration_authority: "GMC".into(),
            registration_number: "0000000".into(),
            serial: 1000,
            validity: Validity::days_from_now(365),
            crl_distribution_point: Some(crl_uri.to_owned()),
        })?;

        let now = OffsetDateTime::now_utc();
        let revocation_list_der = authority.issue_revocation_list(&RevocationListRequest {
            crl_number: 1,
            this_update: now,
            next_update: now + time::Duration::days(30),
            revoked: Vec::new(),
        })?;

        Ok(Self {
            authority,
            prescriber,
            revocation_list_der,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};

    const CRL_URI: &str = "http://crl.example.test/eps.crl";

    fn authority() -> &'static CertificateAuthority {
        static AUTHORITY: OnceLock<CertificateAuthority> = OnceLock::new();
        AUTHORITY.get_or_init(|| {
            CertificateAuthority::create("Test Root CA", Validity::days_from_now(30)).unwrap()
        })
    }

    fn significant(serial: &[u8]) -> Vec<u8> {
        serial.iter().copied().skip_while(|b| *b == 0).collect()
    }

    fn prescriber_request(serial: u64) -> PrescriberRequest {
        PrescriberRequest {
            name: "Jane Smith".into(),
            registration_authority: "GMC".into(),
            registration_number: "7654321".into(),
            serial,
            validity: Validity::days_from_now(10),
            crl_distribution_point: Some(CRL_URI.into()),
        }
    }

    #[test]
    fn test_create_authority() {
        let ca = authority();
        assert!(ca.cert_pem().contains("BEGIN CERTIFICATE"));
        assert!(ca.key_pem().contains("BEGIN PRIVATE KEY"));

        let der = ca.cert_der();
        let (_, cert) = x509_parser::parse_x509_certificate(&der).unwrap();
        assert!(cert.is_ca());
        assert_eq!(cert.issuer(), cert.subject());
    }

    #[test]
    fn test_prescriber_certificate_is_issued_by_authority() {
        let ca = authority();
        let issued = ca.issue_prescriber(&prescriber_request(42)).unwrap();
        assert!(issued.key_pem.contains("BEGIN PRIVATE KEY"));

        let ca_der = ca.cert_der();
        let (_, ca_cert) = x509_parser::parse_x509_certificate(&ca_der).unwrap();
        let (_, cert) = x509_parser::parse_x509_certificate(&issued.cert_der).unwrap();

        assert_eq!(cert.issuer(), ca_cert.subject());
        assert!(!cert.is_ca());
        assert_eq!(significant(cert.raw_serial()), vec![42]);
    }

    #[test]
    fn test_prescriber_certificate_has_crl_distribution_point() {
        let issued = authority().issue_prescriber(&prescriber_request(7)).unwrap();
        let (_, cert) = x509_parser::parse_x509_certificate(&issued.cert_der).unwrap();

        let uris: Vec<String> = cert
            .extensions()
            .iter()
            .filter_map(|ext| match ext.parsed_extension() {
                ParsedExtension::CRLDistributionPoints(points) => Some(points),
                _ => None,
            })
            .flat_map(|points| points.points.iter())
            .filter_map(|point| match &point.distribution_point {
                Some(DistributionPointName::FullName(names)) => Some(names),
                _ => None,
            })
            .flatten()
            .filter_map(|name| match name {
                GeneralName::URI(uri) => Some(uri.to_string()),
                _ => None,
            })
            .collect();

        assert_eq!(uris, vec![CRL_URI.to_string()]);
    }

    #[test]
    fn test_empty_prescriber_name_is_rejected() {
        let mut request = prescriber_request(8);
        request.name = "  ".into();
        assert!(matches!(
            authority().issue_prescriber(&request),
            Err(CertificateError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_revocation_list_lists_serials_with_reasons() {
        let ca = authority();
        let now = OffsetDateTime::now_utc();
        let der = ca
            .issue_revocation_list(&RevocationListRequest {
                crl_number: 3,
                this_update: now,
                next_update: now + time::Duration::days(1),
                revoked: vec![RevokedSerial {
                    serial: 99,
                    revoked_at: now - time::Duration::hours(1),
                    reason: Some(RevocationReason::KeyCompromise),
                }],
            })
            .unwrap();

        let (_, crl) = x509_parser::parse_x509_crl(&der).unwrap();
        let entries: Vec<_> = crl.iter_revoked_certificates().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(significant(entries[0].raw_serial()), vec![99]);
        let (_, reason) = entries[0].reason_code().unwrap();
        assert_eq!(reason.0, 1);
    }

    #[test]
    fn test_revocation_list_rejects_inverted_window() {
        let now = OffsetDateTime::now_utc();
        let result = authority().issue_revocation_list(&RevocationListRequest {
            crl_number: 1,
            this_update: now,
            next_update: now,
            revoked: Vec::new(),
        });
        assert!(matches!(result, Err(CertificateError::InvalidRequest(_))));
    }

    #[test]
    fn test_validity_rejects_inverted_range() {
        let now = OffsetDateTime::now_utc();
        assert!(Validity::new(now, now - time::Duration::days(1)).is_err());
        assert!(Validity::new(now, now + time::Duration::days(1)).is_ok());
    }
}
