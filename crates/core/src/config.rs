//! Trust configuration for signature verification.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the verifier. Nothing here reads environment variables: binaries resolve their
//! own settings and build a [`TrustConfig`] from them.

use std::path::Path;
use std::time::Duration;

use crate::certificate::CertificateRecord;
use crate::constants::DEFAULT_CRL_FETCH_TIMEOUT_SECS;
use crate::error::{CoreError, CoreResult};

/// How to treat a certificate whose revocation status cannot be determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevocationPolicy {
    /// Report unknown status as a verification failure.
    pub unknown_is_failure: bool,
}

impl Default for RevocationPolicy {
    fn default() -> Self {
        Self {
            unknown_is_failure: true,
        }
    }
}

/// Verification configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct TrustConfig {
    trusted_issuers: Vec<CertificateRecord>,
    revocation_policy: RevocationPolicy,
    crl_fetch_timeout: Duration,
}

impl TrustConfig {
    /// Create a new `TrustConfig` trusting certificates issued by any of `trusted_issuers`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if no trusted issuer is given.
    pub fn new(trusted_issuers: Vec<CertificateRecord>) -> CoreResult<Self> {
        if trusted_issuers.is_empty() {
            return Err(CoreError::InvalidInput(
                "at least one trusted issuer certificate is required".into(),
            ));
        }

        Ok(Self {
            trusted_issuers,
            revocation_policy: RevocationPolicy::default(),
            crl_fetch_timeout: Duration::from_secs(DEFAULT_CRL_FETCH_TIMEOUT_SECS),
        })
    }

    /// Trust every certificate in a PEM bundle.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CertificateParse` if the bundle is malformed, or
    /// `CoreError::InvalidInput` if it holds no certificate.
    pub fn from_pem_bundle(text: &str) -> CoreResult<Self> {
        Self::new(CertificateRecord::all_from_pem(text)?)
    }

    pub fn with_revocation_policy(mut self, policy: RevocationPolicy) -> Self {
        self.revocation_policy = policy;
        self
    }

    pub fn with_crl_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.crl_fetch_timeout = timeout;
        self
    }

    pub fn trusted_issuers(&self) -> &[CertificateRecord] {
        &self.trusted_issuers
    }

    pub fn revocation_policy(&self) -> RevocationPolicy {
        self.revocation_policy
    }

    pub fn crl_fetch_timeout(&self) -> Duration {
        self.crl_fetch_timeout
    }
}

/// Load a [`TrustConfig`] from a PEM bundle on disk, with default policy and timeout.
///
/// # Errors
///
/// Returns `CoreError::FileRead` if the file cannot be read, or the errors of
/// [`TrustConfig::from_pem_bundle`].
pub fn load_trust_config(path: &Path) -> CoreResult<TrustConfig> {
    let text = std::fs::read_to_string(path).map_err(CoreError::FileRead)?;
    let config = TrustConfig::from_pem_bundle(&text)?;
    tracing::debug!(
        path = %path.display(),
        issuers = config.trusted_issuers.len(),
        "loaded trusted issuers"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pki;

    fn bundle() -> String {
        format!("{}\n{}", pki().root.cert_pem(), pki().intermediate.cert_pem())
    }

    #[test]
    fn defaults_fail_closed() {
        let config = TrustConfig::from_pem_bundle(&bundle()).unwrap();
        assert_eq!(config.trusted_issuers().len(), 2);
        assert!(config.revocation_policy().unknown_is_failure);
        assert_eq!(config.crl_fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn builder_overrides_policy_and_timeout() {
        let config = TrustConfig::from_pem_bundle(&bundle())
            .unwrap()
            .with_revocation_policy(RevocationPolicy {
                unknown_is_failure: false,
            })
            .with_crl_fetch_timeout(Duration::from_secs(3));
        assert!(!config.revocation_policy().unknown_is_failure);
        assert_eq!(config.crl_fetch_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn empty_bundle_is_rejected() {
        assert!(matches!(
            TrustConfig::from_pem_bundle("no certificates here"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = load_trust_config(Path::new("/nonexistent/eps/trusted.pem"));
        assert!(matches!(result, Err(CoreError::FileRead(_))));
    }
}
