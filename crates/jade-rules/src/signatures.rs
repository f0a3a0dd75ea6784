//! Compiled threat signature sets.

use std::collections::HashSet;
use std::fmt;

use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::RulesError;

const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    DynamicExecution,
    ScriptInjection,
    TemplateInjection,
    DestructiveFilesystem,
    PrivilegeEscalation,
    RemoteExecution,
    CredentialAccess,
    SystemControl,
    Secret,
}

impl ThreatCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DynamicExecution => "dynamic_execution",
            Self::ScriptInjection => "script_injection",
            Self::TemplateInjection => "template_injection",
            Self::DestructiveFilesystem => "destructive_filesystem",
            Self::PrivilegeEscalation => "privilege_escalation",
            Self::RemoteExecution => "remote_execution",
            Self::CredentialAccess => "credential_access",
            Self::SystemControl => "system_control",
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSignature {
    pub id: String,
    pub category: ThreatCategory,
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct SignatureRule {
    pub id: String,
    pub category: ThreatCategory,
    regex: Regex,
}

impl SignatureRule {
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// Signature hit with the exact matched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch<'r> {
    pub rule: &'r str,
    pub category: ThreatCategory,
    pub matched: String,
}

/// A named, immutable list of case-insensitive patterns.
///
/// A `RegexSet` prefilters so that a clean string costs one automaton pass
/// regardless of rule count.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    rules: Vec<SignatureRule>,
    set: RegexSet,
}

pub(crate) fn compile(id: &str, pattern: &str) -> Result<Regex, RulesError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|source| RulesError::Pattern {
            id: id.to_owned(),
            source,
        })
}

impl SignatureSet {
    pub(crate) fn from_raw(kind: &'static str, raw: Vec<RawSignature>) -> Result<Self, RulesError> {
        if raw.is_empty() {
            return Err(RulesError::Empty(kind));
        }
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(raw.len());
        for sig in raw {
            if !seen.insert(sig.id.clone()) {
                return Err(RulesError::Duplicate {
                    kind: "signature",
                    name: sig.id,
                });
            }
            let regex = compile(&sig.id, &sig.pattern)?;
            rules.push(SignatureRule {
                id: sig.id,
                category: sig.category,
                regex,
            });
        }
        let set = RegexSetBuilder::new(rules.iter().map(SignatureRule::pattern))
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT * 8)
            .build()
            .map_err(|source| RulesError::Pattern {
                id: kind.to_owned(),
                source,
            })?;
        Ok(Self { rules, set })
    }

    /// All rules matching `text`, in table order.
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<SignatureMatch<'_>> {
        self.set
            .matches(text)
            .into_iter()
            .filter_map(|idx| {
                let rule = &self.rules[idx];
                rule.regex.find(text).map(|m| SignatureMatch {
                    rule: &rule.id,
                    category: rule.category,
                    matched: m.as_str().to_owned(),
                })
            })
            .collect()
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.set.is_match(text)
    }

    #[must_use]
    pub fn rules(&self) -> &[SignatureRule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Compile additive literal deny patterns, skipping empty entries.
///
/// Patterns are escaped: a descriptor can extend the deny list but never
/// smuggle a regex that matches everything or nothing.
#[must_use]
pub fn compile_extra_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter(|p| !p.trim().is_empty())
        .filter_map(|p| match compile("extra", &regex::escape(p.trim())) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "invalid extra deny pattern, skipping");
                None
            }
        })
        .collect()
}
