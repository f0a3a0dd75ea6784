//! Trust layer: checks every attached signature against the anchors.

use chrono::{DateTime, Utc};
use jade_trust::{
    LockReason, Rejection, SignatureStatus, TrustAnchors, TrustLevel, check_signature,
    community_count, rank,
};

use crate::config::TrustConfig;
use crate::descriptor::Signature;
use crate::issue::{IssueKind, Layer, ValidationIssue, code};

#[derive(Debug, Clone)]
pub struct TrustOutcome {
    pub issues: Vec<ValidationIssue>,
    pub level: TrustLevel,
    /// An authentic signature was revoked or expired.
    pub locked: bool,
}

fn rejection_code(rejection: &Rejection) -> &'static str {
    match rejection {
        Rejection::UnknownSigner(_) => code::UNKNOWN_SIGNER,
        Rejection::UnsupportedAlgorithm(_) => code::UNSUPPORTED_ALGORITHM,
        Rejection::Encoding(_) | Rejection::BadSignature => code::INVALID_SIGNATURE,
        Rejection::BrokenChain(_) => code::CHAIN_INVALID,
        Rejection::NotYetValid { .. } => code::SIGNATURE_NOT_YET_VALID,
        Rejection::OutOfScope { .. } | Rejection::InvalidScope(_) => code::SCOPE_MISMATCH,
    }
}

fn lock_code(reason: &LockReason) -> &'static str {
    if reason.is_revocation() {
        code::SIGNATURE_REVOKED
    } else {
        code::SIGNATURE_EXPIRED
    }
}

/// Check `signatures` against the hex `skill_hash` and rank the result.
///
/// Discarded signatures only warn. A revoked or expired signature that is
/// otherwise authentic locks the skill. With `strict_mode`, an unsigned
/// outcome is critical.
#[must_use]
pub fn verify_trust(
    signatures: &[Signature],
    skill_id: &str,
    skill_hash: &str,
    anchors: &TrustAnchors,
    now: DateTime<Utc>,
    config: &TrustConfig,
    strict_mode: bool,
) -> TrustOutcome {
    let mut issues = Vec::new();
    let mut locked = false;
    let mut statuses = Vec::with_capacity(signatures.len());

    for (i, sig) in signatures.iter().enumerate() {
        let status = check_signature(anchors, &sig.claim(), skill_id, skill_hash, now);
        tracing::debug!(
            signer = %sig.signer_id,
            key = %sig.public_key_ref,
            ?status,
            "signature checked"
        );
        let location = format!("signatures[{i}]");
        match &status {
            SignatureStatus::Valid { .. } => {}
            SignatureStatus::Rejected(rejection) => issues.push(
                ValidationIssue::warning(
                    Layer::Trust,
                    IssueKind::SignatureError,
                    rejection_code(rejection),
                    format!(
                        "signature by '{}' ({}) ignored: {rejection}",
                        sig.signer_id, sig.public_key_ref
                    ),
                )
                .at(location),
            ),
            SignatureStatus::Locked(reason) => {
                locked = true;
                issues.push(
                    ValidationIssue::critical(
                        Layer::Trust,
                        IssueKind::SignatureError,
                        lock_code(reason),
                        format!("skill locked: {reason} (signer '{}')", sig.signer_id),
                    )
                    .at(location),
                );
            }
        }
        statuses.push(status);
    }

    let level = rank(&statuses, config.community_min_signatures);
    let community = community_count(&statuses);
    if community > 0 && community < config.community_min_signatures {
        issues.push(
            ValidationIssue::warning(
                Layer::Trust,
                IssueKind::SignatureError,
                code::COMMUNITY_QUORUM_NOT_MET,
                format!(
                    "{community} valid community signature(s), {} required",
                    config.community_min_signatures
                ),
            )
            .at("signatures"),
        );
    }
    if strict_mode && !level.is_signed() && !locked {
        issues.push(
            ValidationIssue::critical(
                Layer::Trust,
                IssueKind::SignatureError,
                code::SIGNATURE_REQUIRED,
                "no valid signature from a trusted signer",
            )
            .at("signatures"),
        );
    }

    TrustOutcome {
        issues,
        level,
        locked,
    }
}
