//! Five-layer verification pipeline.

use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};

use chrono::{DateTime, Utc};
use jade_rules::{RuleStore, RuleTables};
use jade_trust::{AnchorStore, TrustAnchors};
use serde_json::Value;

use crate::confidence::{self, History};
use crate::config::{Config, VerifierConfig};
use crate::dag::{self, DagAnalysis, ValidatedDag};
use crate::descriptor::{SkillDescriptor, skill_hash};
use crate::error::VerifyError;
use crate::issue::{IssueKind, Layer, ValidationIssue, ValidationResult, code};
use crate::network::check_network;
use crate::scanner::ThreatScanner;
use crate::schema::{SchemaReport, validate_schema};
use crate::trust::{TrustOutcome, verify_trust};

/// Per-call inputs that are not part of the descriptor.
#[derive(Debug, Clone, Copy)]
pub struct VerifyContext {
    pub now: DateTime<Utc>,
    pub history: History,
}

impl VerifyContext {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            history: History::default(),
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }
}

/// Result plus the artifacts presentation code needs.
#[derive(Debug, Clone)]
pub struct Verification {
    pub result: ValidationResult,
    /// Present only when the graph passed every check.
    pub dag: Option<ValidatedDag>,
    /// Present only when the schema layer passed.
    pub descriptor: Option<SkillDescriptor>,
}

impl Verification {
    fn invalid_json(err: &serde_json::Error) -> Self {
        Self {
            result: ValidationResult::rejected(ValidationIssue::critical(
                Layer::Schema,
                IssueKind::StructuralError,
                code::INVALID_JSON,
                format!("input is not valid JSON: {err}"),
            )),
            dag: None,
            descriptor: None,
        }
    }
}

/// Stateless verifier over one rule snapshot and one set of trust anchors.
///
/// Safe to share across threads; every call works on its own data.
#[derive(Debug, Clone)]
pub struct Verifier {
    rules: Arc<RuleTables>,
    anchors: Arc<TrustAnchors>,
    config: VerifierConfig,
}

fn layer_failed(layer: Layer) -> ValidationIssue {
    ValidationIssue::critical(
        layer,
        IssueKind::StructuralError,
        code::LAYER_FAILED,
        format!("{layer} layer aborted unexpectedly"),
    )
}

fn joined<T>(
    handle: ScopedJoinHandle<'_, T>,
    layer: Layer,
    fallback: impl FnOnce(ValidationIssue) -> T,
) -> T {
    handle.join().unwrap_or_else(|_| {
        tracing::error!("{layer} layer panicked");
        fallback(layer_failed(layer))
    })
}

struct Layers {
    threat: Vec<ValidationIssue>,
    network: Vec<ValidationIssue>,
    dag: DagAnalysis,
    trust: TrustOutcome,
}

impl Verifier {
    #[must_use]
    pub fn new(rules: Arc<RuleTables>, anchors: Arc<TrustAnchors>, config: VerifierConfig) -> Self {
        Self {
            rules,
            anchors,
            config,
        }
    }

    /// Built-in rules, no trust anchors, default settings.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(
            Arc::new(RuleTables::builtin()),
            Arc::new(TrustAnchors::empty()),
            VerifierConfig::default(),
        )
    }

    /// Take the current snapshots of both stores.
    #[must_use]
    pub fn from_stores(rules: &RuleStore, anchors: &AnchorStore, config: VerifierConfig) -> Self {
        Self::new(rules.snapshot(), anchors.snapshot(), config)
    }

    /// Build from a loaded [`Config`], reading rule and anchor files if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured rule or anchor file cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self, VerifyError> {
        let rules = match &config.paths.rules {
            Some(path) => RuleStore::from_path(path)?,
            None => RuleStore::builtin(),
        };
        let anchors = match &config.paths.anchors {
            Some(path) => AnchorStore::from_path(path)?,
            None => AnchorStore::empty(),
        };
        let verifier = Self::from_stores(&rules, &anchors, config.verifier.clone());
        tracing::info!(
            rules = verifier.rules.version(),
            orgs = verifier.anchors.org_count(),
            community = verifier.anchors.community_count(),
            "verifier ready"
        );
        Ok(verifier)
    }

    #[must_use]
    pub fn rules(&self) -> &RuleTables {
        &self.rules
    }

    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Parse `text` and verify it. Malformed JSON yields a rejected result.
    #[must_use]
    pub fn verify_str(&self, text: &str, ctx: &VerifyContext) -> Verification {
        self.verify_str_with(text, |_| *ctx)
    }

    /// Like [`Self::verify_str`], with the context built from the parsed
    /// descriptor, e.g. history looked up by its skill id.
    #[must_use]
    pub fn verify_str_with(
        &self,
        text: &str,
        context: impl FnOnce(&Value) -> VerifyContext,
    ) -> Verification {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                let ctx = context(&value);
                self.verify(&value, &ctx)
            }
            Err(e) => Verification::invalid_json(&e),
        }
    }

    /// Run every layer over `value` and score the outcome.
    #[must_use]
    pub fn verify(&self, value: &Value, ctx: &VerifyContext) -> Verification {
        let hash = skill_hash(value);
        let report = validate_schema(value, &self.rules);
        let layers = if self.config.parallel_layers {
            self.run_parallel(value, &report, &hash, ctx)
        } else {
            Layers {
                threat: self.threat(value, &report),
                network: self.network(&report),
                dag: self.dag(&report),
                trust: self.trust(&report, &hash, ctx),
            }
        };

        let descriptor = report.descriptor(value);
        let skill = report.skill_id.as_deref().unwrap_or("<unknown>");
        tracing::debug!(
            skill,
            schema = report.issues.len(),
            threat = layers.threat.len(),
            network = layers.network.len(),
            dag = layers.dag.issues.len(),
            trust = layers.trust.issues.len() + report.signature_issues.len(),
            "layer issue counts"
        );

        let mut issues = report.issues;
        issues.extend(layers.threat);
        issues.extend(layers.network);
        issues.extend(layers.dag.issues);
        issues.extend(report.signature_issues);
        issues.extend(layers.trust.issues);

        let score = confidence::score(
            &issues,
            layers.trust.locked,
            ctx.history,
            &self.config.confidence,
        );
        tracing::debug!(
            skill,
            verdict = %score.verdict,
            confidence = score.confidence,
            "verification finished"
        );

        Verification {
            result: ValidationResult {
                valid: score.verdict.is_valid(),
                layers_passed: score.layers_passed,
                total_layers: Layer::ALL.len(),
                confidence: score.confidence,
                issues,
                skill_hash: hash,
                verdict: score.verdict,
                trust_level: layers.trust.level,
            },
            dag: layers.dag.validated,
            descriptor,
        }
    }

    fn run_parallel(
        &self,
        value: &Value,
        report: &SchemaReport,
        hash: &str,
        ctx: &VerifyContext,
    ) -> Layers {
        thread::scope(|s| {
            let threat = s.spawn(|| self.threat(value, report));
            let network = s.spawn(|| self.network(report));
            let dag = s.spawn(|| self.dag(report));
            let trust = self.trust(report, hash, ctx);
            Layers {
                threat: joined(threat, Layer::Threat, |issue| vec![issue]),
                network: joined(network, Layer::Network, |issue| vec![issue]),
                dag: joined(dag, Layer::Dag, |issue| DagAnalysis {
                    issues: vec![issue],
                    validated: None,
                }),
                trust,
            }
        })
    }

    fn threat(&self, value: &Value, report: &SchemaReport) -> Vec<ValidationIssue> {
        ThreatScanner::new(&self.rules, &report.security, &self.config.scanner).scan(value)
    }

    fn network(&self, report: &SchemaReport) -> Vec<ValidationIssue> {
        check_network(report.dag.as_ref(), &report.security, &self.rules, &self.config.network)
    }

    fn dag(&self, report: &SchemaReport) -> DagAnalysis {
        dag::analyze(report.dag.as_ref(), &self.rules, &self.config.graph)
    }

    fn trust(&self, report: &SchemaReport, hash: &str, ctx: &VerifyContext) -> TrustOutcome {
        verify_trust(
            &report.signatures,
            report.skill_id.as_deref().unwrap_or_default(),
            hash,
            &self.anchors,
            ctx.now,
            &self.config.trust,
            self.config.strict_mode,
        )
    }
}
