//! Certificate revocation checking against CRL distribution points.
//!
//! Revocation is judged at the prescription's signing time, not at verification time: a
//! certificate revoked for an administrative reason after a prescription was signed does not
//! invalidate that prescription. Compromise reasons are the exception, because a compromised
//! key could have been used to back-date a signature.

use chrono::{DateTime, TimeZone, Utc};
use eps_types::SerialNumberHex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;
use x509_parser::time::ASN1Time;

use crate::certificate::CertificateRecord;

/// Boxed future returned by dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur when fetching or reading a revocation list.
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    /// Network error fetching the CRL.
    #[error("failed to fetch CRL: {0}")]
    Network(String),
    /// The distribution point answered with a non-success status.
    #[error("CRL distribution point {uri} returned status {status}")]
    Status { uri: String, status: u16 },
    /// The CRL response was not parseable.
    #[error("failed to parse CRL: {0}")]
    Parse(String),
    /// The CRL was not signed by the certificate's issuer.
    #[error("CRL from {0} is not signed by the certificate issuer")]
    UntrustedList(String),
}

// ============================================================================
// FETCHING
// ============================================================================

/// Downloads DER-encoded CRLs.
pub trait CrlFetcher: Send + Sync {
    /// Fetch the CRL published at `uri`. Called at most once per distribution point per check.
    ///
    /// # Errors
    ///
    /// Returns [`RevocationError`] if the list cannot be retrieved.
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RevocationError>>;
}

/// `reqwest`-backed [`CrlFetcher`] with a per-request timeout and no retries.
#[derive(Debug, Clone)]
pub struct HttpCrlFetcher {
    http: reqwest::Client,
}

impl HttpCrlFetcher {
    /// # Errors
    ///
    /// Returns `RevocationError::Network` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, RevocationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RevocationError::Network(e.to_string()))?;
        Ok(Self { http })
    }
}

impl CrlFetcher for HttpCrlFetcher {
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RevocationError>> {
        Box::pin(async move {
            tracing::debug!(%uri, "fetching CRL");
            let response = self
                .http
                .get(uri)
                .send()
                .await
                .map_err(|e| RevocationError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RevocationError::Status {
                    uri: uri.to_owned(),
                    status: status.as_u16(),
                });
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| RevocationError::Network(e.to_string()))?;
            Ok(body.to_vec())
        })
    }
}

/// An in-memory [`CrlFetcher`] for use in tests and offline scenarios.
#[derive(Debug, Default, Clone)]
pub struct StaticCrlFetcher {
    lists: HashMap<String, Vec<u8>>,
}

impl StaticCrlFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `der` for `uri`.
    pub fn insert(&mut self, uri: impl Into<String>, der: Vec<u8>) {
        self.lists.insert(uri.into(), der);
    }

    pub fn with_list(mut self, uri: impl Into<String>, der: Vec<u8>) -> Self {
        self.insert(uri, der);
        self
    }
}

impl CrlFetcher for StaticCrlFetcher {
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RevocationError>> {
        let result = self
            .lists
            .get(uri)
            .cloned()
            .ok_or_else(|| RevocationError::Network(format!("no CRL available for {uri}")));
        Box::pin(async move { result })
    }
}

// ============================================================================
// REVOCATION LISTS
// ============================================================================

/// CRL entry reason codes (RFC 5280 section 5.3.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CrlReasonCode {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl CrlReasonCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CrlReasonCode::Unspecified),
            1 => Some(CrlReasonCode::KeyCompromise),
            2 => Some(CrlReasonCode::CaCompromise),
            3 => Some(CrlReasonCode::AffiliationChanged),
            4 => Some(CrlReasonCode::Superseded),
            5 => Some(CrlReasonCode::CessationOfOperation),
            6 => Some(CrlReasonCode::CertificateHold),
            8 => Some(CrlReasonCode::RemoveFromCrl),
            9 => Some(CrlReasonCode::PrivilegeWithdrawn),
            10 => Some(CrlReasonCode::AaCompromise),
            _ => None,
        }
    }

    /// Reasons that revoke regardless of when the revocation happened.
    pub fn is_compromise(&self) -> bool {
        matches!(self, CrlReasonCode::KeyCompromise | CrlReasonCode::CaCompromise)
    }

    /// Reasons that revoke only signatures made after the revocation date.
    pub fn is_time_bound(&self) -> bool {
        matches!(
            self,
            CrlReasonCode::Unspecified
                | CrlReasonCode::AffiliationChanged
                | CrlReasonCode::Superseded
                | CrlReasonCode::CessationOfOperation
                | CrlReasonCode::CertificateHold
                | CrlReasonCode::RemoveFromCrl
        )
    }
}

impl fmt::Display for CrlReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One revoked certificate listed on a CRL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationEntry {
    pub serial_number_hex: SerialNumberHex,
    pub revocation_date: DateTime<Utc>,
    /// `None` when the entry has no reason code extension or an unassigned value.
    pub reason_code: Option<CrlReasonCode>,
}

impl RevocationEntry {
    /// Whether this entry revokes a signature made at `signed_at`.
    ///
    /// Entries without a usable reason code do not revoke; they are logged so the list
    /// publisher can be chased.
    pub fn revokes_at(&self, signed_at: DateTime<Utc>) -> bool {
        match self.reason_code {
            Some(reason) if reason.is_compromise() => true,
            Some(reason) if reason.is_time_bound() => self.revocation_date < signed_at,
            Some(reason) => {
                tracing::error!(
                    serial = %self.serial_number_hex,
                    %reason,
                    "unhandled CRL reason code; entry ignored"
                );
                false
            }
            None => {
                tracing::error!(
                    serial = %self.serial_number_hex,
                    "CRL entry has no readable reason code; entry ignored"
                );
                false
            }
        }
    }
}

/// A parsed certificate revocation list.
#[derive(Clone, Debug)]
pub struct RevocationList {
    der: Vec<u8>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub entries: Vec<RevocationEntry>,
}

impl RevocationList {
    /// Parse a DER-encoded CRL.
    ///
    /// # Errors
    ///
    /// Returns `RevocationError::Parse` if the bytes are not a valid CRL.
    pub fn from_der(der: &[u8]) -> Result<Self, RevocationError> {
        let (_, crl) = CertificateRevocationList::from_der(der)
            .map_err(|e| RevocationError::Parse(e.to_string()))?;

        let entries = crl
            .iter_revoked_certificates()
            .map(|revoked| {
                let reason_code = revoked.reason_code().and_then(|(_, code)| {
                    let reason = CrlReasonCode::from_code(code.0);
                    if reason.is_none() {
                        tracing::error!(code = code.0, "unassigned CRL reason code");
                    }
                    reason
                });
                Ok(RevocationEntry {
                    serial_number_hex: SerialNumberHex::from_bytes(revoked.raw_serial()),
                    revocation_date: to_utc(revoked.revocation_date)?,
                    reason_code,
                })
            })
            .collect::<Result<Vec<_>, RevocationError>>()?;

        Ok(Self {
            der: der.to_vec(),
            this_update: to_utc(crl.last_update())?,
            next_update: crl.next_update().map(to_utc).transpose()?,
            entries,
        })
    }

    /// Entries for the given serial number.
    pub fn entries_for<'a>(
        &'a self,
        serial: &'a SerialNumberHex,
    ) -> impl Iterator<Item = &'a RevocationEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| &entry.serial_number_hex == serial)
    }

    /// Whether the list's signature verifies with `issuer`'s public key.
    pub fn is_signed_by(&self, issuer: &CertificateRecord) -> bool {
        let Ok((_, crl)) = CertificateRevocationList::from_der(&self.der) else {
            return false;
        };
        let Ok((_, issuer)) = X509Certificate::from_der(issuer.der()) else {
            return false;
        };
        crl.verify_signature(issuer.public_key()).is_ok()
    }
}

fn to_utc(time: ASN1Time) -> Result<DateTime<Utc>, RevocationError> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| RevocationError::Parse(format!("time out of range: {time}")))
}

// ============================================================================
// CHECKING
// ============================================================================

/// Outcome of a revocation check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevocationStatus {
    /// No list revokes the certificate, or it publishes no distribution point.
    Good,
    Revoked {
        reason: Option<CrlReasonCode>,
        revoked_at: DateTime<Utc>,
    },
    /// A list could not be fetched or read, and no other list revokes the certificate.
    Unknown(String),
}

impl RevocationStatus {
    pub fn is_revoked(&self) -> bool {
        matches!(self, RevocationStatus::Revoked { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, RevocationStatus::Unknown(_))
    }
}

/// Check `cert` against every CRL distribution point it publishes, as of `signed_at`.
pub async fn check_revocation(
    cert: &CertificateRecord,
    signed_at: DateTime<Utc>,
    fetcher: &dyn CrlFetcher,
) -> RevocationStatus {
    check_revocation_with_issuer(cert, None, signed_at, fetcher).await
}

/// As [`check_revocation`], additionally requiring every list to be signed by `issuer` when
/// one is given. A list signed by anyone else is treated as unreadable.
pub async fn check_revocation_with_issuer(
    cert: &CertificateRecord,
    issuer: Option<&CertificateRecord>,
    signed_at: DateTime<Utc>,
    fetcher: &dyn CrlFetcher,
) -> RevocationStatus {
    if cert.crl_distribution_point_uris.is_empty() {
        tracing::info!(
            subject = %cert.subject,
            "certificate has no CRL distribution point; treating as not revoked"
        );
        return RevocationStatus::Good;
    }

    let mut problems = Vec::new();
    for uri in &cert.crl_distribution_point_uris {
        let list = match load_list(uri, issuer, fetcher).await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(%uri, error = %e, "CRL unavailable");
                problems.push(e.to_string());
                continue;
            }
        };

        let revoked = list
            .entries_for(&cert.serial_number_hex)
            .find(|entry| entry.revokes_at(signed_at))
            .map(|entry| RevocationStatus::Revoked {
                reason: entry.reason_code,
                revoked_at: entry.revocation_date,
            });
        if let Some(status) = revoked {
            return status;
        }
    }

    if problems.is_empty() {
        RevocationStatus::Good
    } else {
        RevocationStatus::Unknown(problems.join("; "))
    }
}

async fn load_list(
    uri: &str,
    issuer: Option<&CertificateRecord>,
    fetcher: &dyn CrlFetcher,
) -> Result<RevocationList, RevocationError> {
    let der = fetcher.fetch(uri).await?;
    let list = RevocationList::from_der(&der)?;
    if let Some(issuer) = issuer {
        if !list.is_signed_by(issuer) {
            return Err(RevocationError::UntrustedList(uri.to_owned()));
        }
    }
    tracing::debug!(%uri, entries = list.entries.len(), "loaded CRL");
    Ok(list)
}
