//! Findings and the per-descriptor verdict.

use std::fmt;

use jade_trust::TrustLevel;
use serde::{Deserialize, Serialize};

/// Stable issue codes. Reports and downstream tooling match on these strings.
pub mod code {
    pub const NOT_AN_OBJECT: &str = "NOT_AN_OBJECT";
    pub const MISSING_FIELD: &str = "MISSING_FIELD";
    pub const UNKNOWN_FIELD: &str = "UNKNOWN_FIELD";
    pub const INVALID_TYPE: &str = "INVALID_TYPE";
    pub const INVALID_VALUE: &str = "INVALID_VALUE";
    pub const UNSUPPORTED_VERSION: &str = "UNSUPPORTED_VERSION";
    pub const INVALID_SKILL_ID: &str = "INVALID_SKILL_ID";
    pub const DUPLICATE_TAG: &str = "DUPLICATE_TAG";
    pub const UNKNOWN_PARAM_TYPE: &str = "UNKNOWN_PARAM_TYPE";
    pub const MALFORMED_GRAPH: &str = "MALFORMED_GRAPH";
    pub const POLICY_LIMIT_EXCEEDED: &str = "POLICY_LIMIT_EXCEEDED";
    pub const FILE_SCOPE_TOO_BROAD: &str = "FILE_SCOPE_TOO_BROAD";
    pub const SENSITIVE_FILE_SCOPE: &str = "SENSITIVE_FILE_SCOPE";
    pub const FILE_ACTION_NO_PERMISSIONS: &str = "FILE_ACTION_NO_PERMISSIONS";

    pub const CODE_INJECTION: &str = "CODE_INJECTION";
    pub const DANGEROUS_COMMAND: &str = "DANGEROUS_COMMAND";
    pub const SCAN_LIMIT_EXCEEDED: &str = "SCAN_LIMIT_EXCEEDED";

    pub const HOST_NOT_WHITELISTED: &str = "HOST_NOT_WHITELISTED";
    pub const DYNAMIC_HOST: &str = "DYNAMIC_HOST";
    pub const NO_NETWORK_TARGET: &str = "NO_NETWORK_TARGET";
    pub const INVALID_TARGET: &str = "INVALID_TARGET";
    pub const WILDCARD_WHITELIST: &str = "WILDCARD_WHITELIST";
    pub const SUSPICIOUS_WHITELIST_ENTRY: &str = "SUSPICIOUS_WHITELIST_ENTRY";
    pub const POSSIBLE_SECRET: &str = "POSSIBLE_SECRET";

    pub const UNPARSEABLE_GRAPH: &str = "UNPARSEABLE_GRAPH";
    pub const GRAPH_TOO_LARGE: &str = "GRAPH_TOO_LARGE";
    pub const DUPLICATE_NODE: &str = "DUPLICATE_NODE";
    pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
    pub const DANGLING_EDGE: &str = "DANGLING_EDGE";
    pub const ENTRY_NODE_COUNT: &str = "ENTRY_NODE_COUNT";
    pub const UNKNOWN_ENTRY_NODE: &str = "UNKNOWN_ENTRY_NODE";
    pub const NO_EXIT_NODES: &str = "NO_EXIT_NODES";
    pub const UNKNOWN_EXIT_NODE: &str = "UNKNOWN_EXIT_NODE";
    pub const CYCLE_DETECTED: &str = "CYCLE_DETECTED";
    pub const ORPHAN_NODE: &str = "ORPHAN_NODE";
    pub const DEAD_END: &str = "DEAD_END";
    pub const EXIT_HAS_OUTGOING: &str = "EXIT_HAS_OUTGOING";
    pub const UNKNOWN_EDGE_LABEL: &str = "UNKNOWN_EDGE_LABEL";
    pub const INCOMPLETE_BRANCH: &str = "INCOMPLETE_BRANCH";

    pub const MALFORMED_SIGNATURE: &str = "MALFORMED_SIGNATURE";
    pub const UNKNOWN_SIGNER: &str = "UNKNOWN_SIGNER";
    pub const UNSUPPORTED_ALGORITHM: &str = "UNSUPPORTED_ALGORITHM";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
    pub const CHAIN_INVALID: &str = "CHAIN_INVALID";
    pub const SIGNATURE_NOT_YET_VALID: &str = "SIGNATURE_NOT_YET_VALID";
    pub const SCOPE_MISMATCH: &str = "SCOPE_MISMATCH";
    pub const SIGNATURE_REVOKED: &str = "SIGNATURE_REVOKED";
    pub const SIGNATURE_EXPIRED: &str = "SIGNATURE_EXPIRED";
    pub const COMMUNITY_QUORUM_NOT_MET: &str = "COMMUNITY_QUORUM_NOT_MET";
    pub const SIGNATURE_REQUIRED: &str = "SIGNATURE_REQUIRED";

    pub const LAYER_SKIPPED: &str = "LAYER_SKIPPED";
    pub const LAYER_FAILED: &str = "LAYER_FAILED";
    pub const IO_ERROR: &str = "IO_ERROR";
    pub const INVALID_JSON: &str = "INVALID_JSON";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => f.write_str("CRITICAL"),
            Self::Warning => f.write_str("WARNING"),
        }
    }
}

/// Verification layer that produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Schema,
    Threat,
    Network,
    Dag,
    Trust,
}

impl Layer {
    pub const ALL: [Self; 5] = [
        Self::Schema,
        Self::Threat,
        Self::Network,
        Self::Dag,
        Self::Trust,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Threat => "threat",
            Self::Network => "network",
            Self::Dag => "dag",
            Self::Trust => "trust",
        }
    }

    /// Deterministic layers whose CRITICAL findings reject outright.
    #[must_use]
    pub fn is_hard_gate(self) -> bool {
        !matches!(self, Self::Trust)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum IssueKind {
    StructuralError,
    ThreatDetected,
    GraphError,
    PolicyWarning,
    SignatureError,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub layer: Layer,
    pub kind: IssueKind,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Ordered node ids for graph findings (cycle paths).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl ValidationIssue {
    #[must_use]
    pub fn critical(layer: Layer, kind: IssueKind, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            layer,
            kind,
            code: code.to_owned(),
            message: message.into(),
            location: None,
            path: Vec::new(),
        }
    }

    #[must_use]
    pub fn warning(layer: Layer, kind: IssueKind, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::critical(layer, kind, code, message)
        }
    }

    #[must_use]
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", self.severity, self.layer, self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {location})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Verdict {
    Verified,
    Warning,
    Locked,
    Rejected,
}

impl Verdict {
    #[must_use]
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Verified | Self::Warning)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => f.write_str("Verified"),
            Self::Warning => f.write_str("Warning"),
            Self::Locked => f.write_str("Locked"),
            Self::Rejected => f.write_str("Rejected"),
        }
    }
}

/// Complete outcome of one verification call. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub layers_passed: usize,
    pub total_layers: usize,
    pub confidence: f64,
    pub issues: Vec<ValidationIssue>,
    pub skill_hash: String,
    pub verdict: Verdict,
    pub trust_level: TrustLevel,
}

impl ValidationResult {
    /// Result for input that never reached the pipeline (unreadable file, bad JSON).
    #[must_use]
    pub fn rejected(issue: ValidationIssue) -> Self {
        Self {
            valid: false,
            layers_passed: 0,
            total_layers: Layer::ALL.len(),
            confidence: 0.0,
            issues: vec![issue],
            skill_hash: String::new(),
            verdict: Verdict::Rejected,
            trust_level: TrustLevel::Unsigned,
        }
    }

    pub fn criticals(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_critical())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| !i.is_critical())
    }

    #[must_use]
    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    pub fn issues_in(&self, layer: Layer) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.layer == layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_display() {
        let issue = ValidationIssue::critical(
            Layer::Dag,
            IssueKind::GraphError,
            code::CYCLE_DETECTED,
            "cycle a -> b -> a",
        )
        .at("execution_dag.edges[1]");
        insta::assert_snapshot!(
            issue.to_string(),
            @"[CRITICAL] dag CYCLE_DETECTED: cycle a -> b -> a (at execution_dag.edges[1])"
        );
    }

    #[test]
    fn warning_constructor() {
        let issue = ValidationIssue::warning(
            Layer::Network,
            IssueKind::PolicyWarning,
            code::WILDCARD_WHITELIST,
            "bare wildcard",
        );
        assert!(!issue.is_critical());
        assert!(issue.location.is_none());
    }

    #[test]
    fn issue_serializes_without_empty_fields() {
        let issue = ValidationIssue::warning(
            Layer::Schema,
            IssueKind::StructuralError,
            code::UNKNOWN_FIELD,
            "unknown field 'x'",
        );
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "WARNING");
        assert_eq!(json["layer"], "schema");
        assert_eq!(json["kind"], "StructuralError");
        assert!(json.get("location").is_none());
        assert!(json.get("path").is_none());
    }

    #[test]
    fn verdict_validity() {
        assert!(Verdict::Verified.is_valid());
        assert!(Verdict::Warning.is_valid());
        assert!(!Verdict::Locked.is_valid());
        assert!(!Verdict::Rejected.is_valid());
    }

    #[test]
    fn rejected_result_shape() {
        let result = ValidationResult::rejected(ValidationIssue::critical(
            Layer::Schema,
            IssueKind::StructuralError,
            code::INVALID_JSON,
            "expected value at line 1",
        ));
        assert!(!result.valid);
        assert_eq!(result.total_layers, 5);
        assert_eq!(result.verdict, Verdict::Rejected);
        assert!(result.has_code(code::INVALID_JSON));
        assert_eq!(result.criticals().count(), 1);
        assert_eq!(result.issues_in(Layer::Dag).count(), 0);
    }

    #[test]
    fn only_trust_is_soft() {
        assert!(Layer::Schema.is_hard_gate());
        assert!(Layer::Network.is_hard_gate());
        assert!(!Layer::Trust.is_hard_gate());
    }
}
