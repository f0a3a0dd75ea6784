use glob::Pattern;

use crate::error::TrustError;

/// Glob over skill ids that a signature or certificate is allowed to cover.
///
/// Several globs may be given separated by commas; any match is sufficient.
/// An empty scope is treated as `*`.
#[derive(Debug, Clone)]
pub struct Scope {
    patterns: Vec<Pattern>,
}

impl Scope {
    /// # Errors
    ///
    /// Returns [`TrustError::Scope`] if any glob is malformed.
    pub fn parse(text: &str) -> Result<Self, TrustError> {
        let mut patterns = Vec::new();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let pattern = Pattern::new(&part.to_lowercase()).map_err(|source| TrustError::Scope {
                pattern: part.to_owned(),
                source,
            })?;
            patterns.push(pattern);
        }
        if patterns.is_empty() {
            patterns.push(Pattern::new("*").map_err(|source| TrustError::Scope {
                pattern: "*".to_owned(),
                source,
            })?);
        }
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn covers(&self, skill_id: &str) -> bool {
        let id = skill_id.to_lowercase();
        self.patterns.iter().any(|p| p.matches(&id))
    }

    #[must_use]
    pub fn as_strings(&self) -> Vec<&str> {
        self.patterns.iter().map(Pattern::as_str).collect()
    }
}
