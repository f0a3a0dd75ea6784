#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("anchor file parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("anchor file parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid public key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid scope pattern '{pattern}': {source}")]
    Scope {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("unknown signer: {0}")]
    UnknownSigner(String),

    #[error("'{0}' cannot issue certificates")]
    InvalidIssuer(String),

    #[error("certificate for org '{0}' is not signed by its issuer")]
    CertificateSignature(String),

    #[error("trust chain depth {depth} exceeds maximum {max}")]
    ChainDepth { depth: usize, max: usize },

    #[error("duplicate {kind} '{id}' in trust anchors")]
    Duplicate { kind: &'static str, id: String },
}
