use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rule tables: {0}")]
    Rules(#[from] jade_rules::RulesError),

    #[error("trust anchors: {0}")]
    Trust(#[from] jade_trust::TrustError),

    #[error("malformed descriptor: {0}")]
    Shape(&'static str),
}

impl VerifyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
