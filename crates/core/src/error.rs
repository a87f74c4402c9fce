#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("unsupported algorithm pairing: digest {digest} with signature {signature}")]
    UnsupportedAlgorithmPairing { digest: String, signature: String },

    #[error("XML error: {0}")]
    Xml(#[from] hl7v3::Hl7v3Error),
    #[error("failed to decode base64: {0}")]
    Base64(base64::DecodeError),
    #[error("failed to parse certificate: {0}")]
    CertificateParse(String),
    #[error("failed to parse private key: {0}")]
    PrivateKeyParse(String),
    #[error("failed to sign: {0}")]
    Sign(String),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
