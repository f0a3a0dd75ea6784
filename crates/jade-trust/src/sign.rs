//! Producing skill signatures and org certificates.
//!
//! A skill signature covers an envelope, not the bare skill hash: the scope
//! and validity window travel inside the signed bytes, so none of them can
//! be edited or stripped without invalidating the signature.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signer as _, SigningKey};
use serde_json::Value;

use crate::anchor::OrgCertificate;
use crate::check::SignatureClaim;
use crate::error::TrustError;
use crate::key::{decode_public_key, encode_signature};
use crate::scope::Scope;

fn timestamp(at: Option<DateTime<Utc>>) -> Value {
    at.map_or(Value::Null, |t| {
        Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    })
}

/// Bytes a skill signature covers: compact JSON with sorted keys of the
/// skill hash, scope, `issued_at` and `expires_at` (null when absent).
#[must_use]
pub fn signing_message(
    skill_hash: &str,
    scope: &str,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
) -> Vec<u8> {
    let body: BTreeMap<&str, Value> = BTreeMap::from([
        ("expires_at", timestamp(expires_at)),
        ("issued_at", timestamp(issued_at)),
        ("scope", Value::from(scope)),
        ("skill_hash", Value::from(skill_hash)),
    ]);
    serde_json::to_vec(&body).unwrap_or_default()
}

impl SignatureClaim<'_> {
    /// Envelope this claim's signature must cover for `skill_hash`.
    #[must_use]
    pub fn message(&self, skill_hash: &str) -> Vec<u8> {
        signing_message(skill_hash, self.scope, self.issued_at, self.expires_at)
    }
}

/// Validity claims a signer attaches to a skill signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTerms {
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SignatureTerms {
    #[must_use]
    pub fn new(issued_at: DateTime<Utc>) -> Self {
        Self {
            scope: "*".into(),
            issued_at,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    #[must_use]
    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// Sign the envelope of `skill_hash` under `terms`, returning `jade-sig-…` text.
///
/// # Errors
///
/// Returns [`TrustError::Scope`] when the scope is not a valid pattern.
pub fn sign_skill(
    key: &SigningKey,
    skill_hash: &str,
    terms: &SignatureTerms,
) -> Result<String, TrustError> {
    Scope::parse(&terms.scope)?;
    let message = signing_message(
        skill_hash,
        &terms.scope,
        Some(terms.issued_at),
        terms.expires_at,
    );
    Ok(encode_signature(&key.sign(&message)))
}

/// Fields of a certificate before the issuer signs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub org_id: String,
    /// Encoded org public key, usually `jade-pk-org-{org_id}-…`.
    pub public_key: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
}

/// Certify an org key with the issuer's signing key.
///
/// The issuer is recorded as `root`, the only key allowed to certify orgs.
///
/// # Errors
///
/// Returns [`TrustError::InvalidKey`] for an undecodable org key and
/// [`TrustError::Scope`] for an invalid scope pattern.
pub fn issue_certificate(
    issuer_key: &SigningKey,
    request: CertificateRequest,
) -> Result<OrgCertificate, TrustError> {
    decode_public_key(&request.public_key)?;
    Scope::parse(&request.scope)?;
    let mut cert = OrgCertificate {
        org_id: request.org_id,
        public_key: request.public_key,
        scope: request.scope,
        expires_at: request.expires_at,
        not_before: request.not_before,
        issuer: "root".into(),
        issuer_signature: String::new(),
        revoked: false,
    };
    cert.issuer_signature = encode_signature(&issuer_key.sign(&cert.signing_payload()));
    tracing::debug!(org = %cert.org_id, scope = %cert.scope, "certificate issued");
    Ok(cert)
}
