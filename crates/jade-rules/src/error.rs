#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rule table parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pattern for rule '{id}': {source}")]
    Pattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid jade_version range '{range}': {source}")]
    VersionRange {
        range: String,
        #[source]
        source: semver::Error,
    },

    #[error("duplicate {kind} '{name}' in rule table")]
    Duplicate { kind: &'static str, name: String },

    #[error("rule table is empty: {0}")]
    Empty(&'static str),
}
