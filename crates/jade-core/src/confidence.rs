//! Bayesian confidence over layer results and execution history.

use serde::{Deserialize, Serialize};

use crate::config::ConfidenceConfig;
use crate::issue::{Layer, ValidationIssue, Verdict};

/// Recorded outcomes of earlier runs of one skill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct History {
    #[serde(default)]
    pub successes: u64,
    #[serde(default)]
    pub failures: u64,
}

impl History {
    #[must_use]
    pub fn new(successes: u64, failures: u64) -> Self {
        Self {
            successes,
            failures,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub confidence: f64,
    pub verdict: Verdict,
    pub layers_passed: usize,
}

/// Layers that ran and produced no CRITICAL finding.
///
/// A skipped layer reports `LAYER_SKIPPED` as critical, so it never counts.
/// Trust also fails when a signature locked the skill.
#[must_use]
pub fn layers_passed(issues: &[ValidationIssue], locked: bool) -> usize {
    Layer::ALL
        .iter()
        .filter(|&&layer| {
            let clean = !issues
                .iter()
                .any(|i| i.layer == layer && i.is_critical());
            clean && !(layer == Layer::Trust && locked)
        })
        .count()
}

/// Posterior mean of Beta(alpha + s, beta + f).
///
/// `s` counts historical successes plus weighted passed layers, `f` counts
/// historical failures plus weighted warnings.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn posterior(
    history: History,
    layers_passed: usize,
    warnings: usize,
    config: &ConfidenceConfig,
) -> f64 {
    let s = history.successes as f64 + config.layer_success_weight * layers_passed as f64;
    let f = history.failures as f64 + config.warning_weight * warnings as f64;
    let total = s + f + config.alpha + config.beta;
    if total <= 0.0 {
        return 0.0;
    }
    ((s + config.alpha) / total).clamp(0.0, 1.0)
}

/// Final verdict and confidence.
///
/// Any CRITICAL from a hard-gate layer rejects with zero confidence. A lock
/// wins over every other trust outcome. Otherwise the posterior decides.
#[must_use]
pub fn score(
    issues: &[ValidationIssue],
    locked: bool,
    history: History,
    config: &ConfidenceConfig,
) -> Score {
    let passed = layers_passed(issues, locked);
    let hard_fail = issues
        .iter()
        .any(|i| i.is_critical() && i.layer.is_hard_gate());
    if hard_fail {
        return Score {
            confidence: 0.0,
            verdict: Verdict::Rejected,
            layers_passed: passed,
        };
    }

    let warnings = issues.iter().filter(|i| !i.is_critical()).count();
    let confidence = posterior(history, passed, warnings, config);
    let verdict = if locked {
        Verdict::Locked
    } else if issues.iter().any(ValidationIssue::is_critical) {
        Verdict::Rejected
    } else if confidence >= config.verified_threshold {
        Verdict::Verified
    } else if confidence >= config.warning_threshold {
        Verdict::Warning
    } else {
        Verdict::Rejected
    };
    Score {
        confidence,
        verdict,
        layers_passed: passed,
    }
}
