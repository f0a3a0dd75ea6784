//! Per-signature checks and trust-level ranking.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::anchor::TrustAnchors;
use crate::chain::{Authority, resolve, signing_key, verify_chain};
use crate::key::{check_algorithm, decode_signature, fingerprint, verify};
use crate::level::TrustLevel;
use crate::scope::Scope;

/// One signature attached to a descriptor, as the checker sees it.
#[derive(Debug, Clone, Copy)]
pub struct SignatureClaim<'a> {
    pub signer_id: &'a str,
    pub key_ref: &'a str,
    pub algorithm: &'a str,
    pub signature: &'a str,
    pub scope: &'a str,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

/// Why a signature was discarded. Discarded signatures never lock a skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnknownSigner(String),
    UnsupportedAlgorithm(String),
    Encoding(String),
    BadSignature,
    BrokenChain(String),
    NotYetValid { since: DateTime<Utc> },
    OutOfScope { scope: String },
    InvalidScope(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSigner(reason)
            | Self::BrokenChain(reason)
            | Self::InvalidScope(reason) => f.write_str(reason),
            Self::UnsupportedAlgorithm(alg) => write!(f, "unsupported algorithm '{alg}'"),
            Self::Encoding(reason) => write!(f, "undecodable signature: {reason}"),
            Self::BadSignature => f.write_str("signature does not match skill hash and terms"),
            Self::NotYetValid { since } => write!(f, "not valid before {}", since.to_rfc3339()),
            Self::OutOfScope { scope } => write!(f, "scope '{scope}' does not cover this skill"),
        }
    }
}

/// Authentic signature that must lock the skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockReason {
    SignatureRevoked,
    KeyRevoked { key_ref: String },
    CertificateRevoked { org_id: String },
    SignatureExpired { at: DateTime<Utc> },
    CertificateExpired { org_id: String, at: DateTime<Utc> },
}

impl LockReason {
    #[must_use]
    pub fn is_revocation(&self) -> bool {
        matches!(
            self,
            Self::SignatureRevoked | Self::KeyRevoked { .. } | Self::CertificateRevoked { .. }
        )
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureRevoked => f.write_str("signature is marked revoked"),
            Self::KeyRevoked { key_ref } => write!(f, "signing key {key_ref} is revoked"),
            Self::CertificateRevoked { org_id } => {
                write!(f, "certificate for org '{org_id}' is revoked")
            }
            Self::SignatureExpired { at } => write!(f, "signature expired at {}", at.to_rfc3339()),
            Self::CertificateExpired { org_id, at } => write!(
                f,
                "certificate for org '{org_id}' expired at {}",
                at.to_rfc3339()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Valid {
        level: TrustLevel,
        fingerprint: String,
    },
    Rejected(Rejection),
    Locked(LockReason),
}

/// Check one signature for `skill_id` whose canonical hash is `skill_hash`.
///
/// The signature must cover the claim's envelope (see
/// [`signing_message`](crate::sign::signing_message)), so the scope and
/// validity window are as authentic as the hash itself.
///
/// Order: resolve, algorithm, cryptographic check, chain, revocation,
/// expiry, not-yet-valid, scope. Only signatures that pass the
/// cryptographic and chain checks can reach a lock.
#[must_use]
pub fn check_signature(
    anchors: &TrustAnchors,
    claim: &SignatureClaim<'_>,
    skill_id: &str,
    skill_hash: &str,
    now: DateTime<Utc>,
) -> SignatureStatus {
    let authority = match resolve(anchors, claim.key_ref) {
        Ok(a) => a,
        Err(e) => return SignatureStatus::Rejected(Rejection::UnknownSigner(e.to_string())),
    };
    if check_algorithm(claim.algorithm).is_err() {
        return SignatureStatus::Rejected(Rejection::UnsupportedAlgorithm(
            claim.algorithm.to_owned(),
        ));
    }
    let signature = match decode_signature(claim.signature) {
        Ok(s) => s,
        Err(e) => return SignatureStatus::Rejected(Rejection::Encoding(e.to_string())),
    };
    let key = match signing_key(anchors, &authority) {
        Ok(k) => k,
        Err(e) => return SignatureStatus::Rejected(Rejection::UnknownSigner(e.to_string())),
    };
    if !verify(key, &claim.message(skill_hash), &signature) {
        return SignatureStatus::Rejected(Rejection::BadSignature);
    }
    if let Err(e) = verify_chain(anchors, &authority) {
        return SignatureStatus::Rejected(Rejection::BrokenChain(e.to_string()));
    }

    if claim.revoked {
        return SignatureStatus::Locked(LockReason::SignatureRevoked);
    }
    let key_ref = authority.key_ref();
    if anchors.is_revoked(&key_ref, key) {
        return SignatureStatus::Locked(LockReason::KeyRevoked { key_ref });
    }
    let org = match &authority {
        Authority::Org { org_id, .. } => anchors.org(org_id),
        _ => None,
    };
    if let Some(org) = org
        && org.cert.revoked
    {
        return SignatureStatus::Locked(LockReason::CertificateRevoked {
            org_id: org.cert.org_id.clone(),
        });
    }
    if let Some(at) = claim.expires_at
        && at <= now
    {
        return SignatureStatus::Locked(LockReason::SignatureExpired { at });
    }
    if let Some(org) = org
        && org.cert.expires_at <= now
    {
        return SignatureStatus::Locked(LockReason::CertificateExpired {
            org_id: org.cert.org_id.clone(),
            at: org.cert.expires_at,
        });
    }

    if let Some(since) = claim.issued_at
        && since > now
    {
        return SignatureStatus::Rejected(Rejection::NotYetValid { since });
    }
    if let Some(since) = org.and_then(|o| o.cert.not_before)
        && since > now
    {
        return SignatureStatus::Rejected(Rejection::NotYetValid { since });
    }

    let scope = match Scope::parse(claim.scope) {
        Ok(s) => s,
        Err(e) => return SignatureStatus::Rejected(Rejection::InvalidScope(e.to_string())),
    };
    if !scope.covers(skill_id) {
        return SignatureStatus::Rejected(Rejection::OutOfScope {
            scope: claim.scope.to_owned(),
        });
    }
    if let Some(org) = org
        && !org.scope.covers(skill_id)
    {
        return SignatureStatus::Rejected(Rejection::OutOfScope {
            scope: org.cert.scope.clone(),
        });
    }

    SignatureStatus::Valid {
        level: authority.level(),
        fingerprint: fingerprint(key),
    }
}

/// Highest level achieved by a set of checked signatures.
///
/// Community level needs `community_min` distinct valid community keys.
#[must_use]
pub fn rank(statuses: &[SignatureStatus], community_min: usize) -> TrustLevel {
    let mut level = TrustLevel::Unsigned;
    let mut community = BTreeSet::new();
    for status in statuses {
        if let SignatureStatus::Valid { level: l, fingerprint } = status {
            if *l == TrustLevel::Community {
                community.insert(fingerprint.as_str());
            } else {
                level = level.max_trust(*l);
            }
        }
    }
    if community.len() >= community_min.max(1) {
        level = level.max_trust(TrustLevel::Community);
    }
    level
}

/// Distinct valid community keys among `statuses`.
#[must_use]
pub fn community_count(statuses: &[SignatureStatus]) -> usize {
    statuses
        .iter()
        .filter_map(|s| match s {
            SignatureStatus::Valid {
                level: TrustLevel::Community,
                fingerprint,
            } => Some(fingerprint.as_str()),
            _ => None,
        })
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;
    use crate::anchor::{AnchorFile, CommunityKey, OrgCertificate};
    use crate::key::{encode_public_key, encode_signature};
    use crate::sign::signing_message;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn sk(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn org_cert(org_id: &str, seed: u8, expires_at: DateTime<Utc>, scope: &str) -> OrgCertificate {
        let mut cert = OrgCertificate {
            org_id: org_id.into(),
            public_key: encode_public_key(&format!("org-{org_id}"), &sk(seed).verifying_key()),
            scope: scope.into(),
            expires_at,
            not_before: None,
            issuer: "root".into(),
            issuer_signature: String::new(),
            revoked: false,
        };
        cert.issuer_signature = encode_signature(&sk(1).sign(&cert.signing_payload()));
        cert
    }

    fn anchors_with(orgs: Vec<OrgCertificate>, revoked: Vec<String>) -> TrustAnchors {
        TrustAnchors::from_file(AnchorFile {
            root_public_key: Some(encode_public_key("root", &sk(1).verifying_key())),
            orgs,
            community: (20..24)
                .map(|seed| CommunityKey {
                    key_id: format!("c{seed}"),
                    public_key: encode_public_key("community", &sk(seed).verifying_key()),
                })
                .collect(),
            revoked,
        })
        .unwrap()
    }

    fn anchors() -> TrustAnchors {
        anchors_with(
            vec![org_cert("acme", 2, now() + Duration::days(30), "acme_*")],
            Vec::new(),
        )
    }

    fn sign(seed: u8) -> String {
        let message = signing_message(HASH, "*", Some(now() - Duration::days(1)), None);
        encode_signature(&sk(seed).sign(&message))
    }

    fn claim<'a>(key_ref: &'a str, signature: &'a str) -> SignatureClaim<'a> {
        SignatureClaim {
            signer_id: "tester",
            key_ref,
            algorithm: "ed25519",
            signature,
            scope: "*",
            issued_at: Some(now() - Duration::days(1)),
            expires_at: None,
            revoked: false,
        }
    }

    fn check(anchors: &TrustAnchors, claim: &SignatureClaim<'_>) -> SignatureStatus {
        check_signature(anchors, claim, "acme_fetch", HASH, now())
    }

    #[test]
    fn root_signature_valid() {
        let sig = sign(1);
        let status = check(&anchors(), &claim("root", &sig));
        assert!(matches!(status, SignatureStatus::Valid { level: TrustLevel::Root, .. }));
    }

    #[test]
    fn org_signature_valid_in_scope() {
        let sig = sign(2);
        let status = check(&anchors(), &claim("org:acme", &sig));
        assert!(matches!(status, SignatureStatus::Valid { level: TrustLevel::Org, .. }));
    }

    #[test]
    fn org_signature_outside_cert_scope() {
        let sig = sign(2);
        let status = check_signature(
            &anchors(),
            &claim("org:acme", &sig),
            "other_skill",
            HASH,
            now(),
        );
        assert!(matches!(status, SignatureStatus::Rejected(Rejection::OutOfScope { .. })));
    }

    #[test]
    fn wrong_key_is_discarded_not_locked() {
        let sig = sign(3);
        let mut c = claim("org:acme", &sig);
        c.revoked = true;
        assert_eq!(check(&anchors(), &c), SignatureStatus::Rejected(Rejection::BadSignature));
    }

    #[test]
    fn expired_certificate_locks() {
        let anchors = anchors_with(
            vec![org_cert("acme", 2, now() - Duration::days(1), "*")],
            Vec::new(),
        );
        let sig = sign(2);
        let status = check(&anchors, &claim("org:acme", &sig));
        assert!(matches!(
            status,
            SignatureStatus::Locked(LockReason::CertificateExpired { .. })
        ));
    }

    #[test]
    fn expired_signature_locks() {
        let mut c = claim("root", "");
        c.expires_at = Some(now() - Duration::hours(1));
        let sig = encode_signature(&sk(1).sign(&c.message(HASH)));
        c.signature = &sig;
        assert!(matches!(
            check(&anchors(), &c),
            SignatureStatus::Locked(LockReason::SignatureExpired { .. })
        ));
    }

    #[test]
    fn revoked_flag_locks() {
        let sig = sign(1);
        let mut c = claim("root", &sig);
        c.revoked = true;
        assert_eq!(
            check(&anchors(), &c),
            SignatureStatus::Locked(LockReason::SignatureRevoked)
        );
    }

    #[test]
    fn revocation_list_locks() {
        let anchors = anchors_with(Vec::new(), vec!["community:c20".into()]);
        let sig = sign(20);
        assert!(matches!(
            check(&anchors, &claim("community:c20", &sig)),
            SignatureStatus::Locked(LockReason::KeyRevoked { .. })
        ));
    }

    #[test]
    fn revoked_certificate_locks() {
        let mut cert = org_cert("acme", 2, now() + Duration::days(1), "*");
        cert.revoked = true;
        let anchors = anchors_with(vec![cert], Vec::new());
        let sig = sign(2);
        assert!(matches!(
            check(&anchors, &claim("org:acme", &sig)),
            SignatureStatus::Locked(LockReason::CertificateRevoked { .. })
        ));
    }

    #[test]
    fn future_signature_not_yet_valid() {
        let mut c = claim("root", "");
        c.issued_at = Some(now() + Duration::days(2));
        let sig = encode_signature(&sk(1).sign(&c.message(HASH)));
        c.signature = &sig;
        assert!(matches!(
            check(&anchors(), &c),
            SignatureStatus::Rejected(Rejection::NotYetValid { .. })
        ));
    }

    #[test]
    fn edited_terms_invalidate_signature() {
        let mut c = claim("root", "");
        c.expires_at = Some(now() - Duration::hours(1));
        c.scope = "acme_*";
        let sig = encode_signature(&sk(1).sign(&c.message(HASH)));
        c.signature = &sig;
        assert!(matches!(
            check(&anchors(), &c),
            SignatureStatus::Locked(LockReason::SignatureExpired { .. })
        ));

        let mut stripped = c;
        stripped.expires_at = None;
        assert_eq!(
            check(&anchors(), &stripped),
            SignatureStatus::Rejected(Rejection::BadSignature)
        );

        let mut widened = c;
        widened.scope = "*";
        assert_eq!(
            check(&anchors(), &widened),
            SignatureStatus::Rejected(Rejection::BadSignature)
        );

        let mut backdated = c;
        backdated.issued_at = Some(now() - Duration::days(400));
        assert_eq!(
            check(&anchors(), &backdated),
            SignatureStatus::Rejected(Rejection::BadSignature)
        );
    }

    #[test]
    fn unsupported_algorithm() {
        let sig = sign(1);
        let mut c = claim("root", &sig);
        c.algorithm = "rsa";
        assert!(matches!(
            check(&anchors(), &c),
            SignatureStatus::Rejected(Rejection::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn unknown_signer_and_bad_encoding() {
        let sig = sign(1);
        assert!(matches!(
            check(&anchors(), &claim("org:ghost", &sig)),
            SignatureStatus::Rejected(Rejection::UnknownSigner(_))
        ));
        assert!(matches!(
            check(&anchors(), &claim("root", "jade-sig-%%%")),
            SignatureStatus::Rejected(Rejection::Encoding(_))
        ));
    }

    #[test]
    fn community_quorum() {
        let anchors = anchors();
        let sigs: Vec<String> = [20, 21, 21].iter().map(|s| sign(*s)).collect();
        let refs = ["community:c20", "community:c21", "community:c21"];
        let statuses: Vec<_> = refs
            .iter()
            .zip(&sigs)
            .map(|(r, s)| check(&anchors, &claim(r, s)))
            .collect();
        assert_eq!(community_count(&statuses), 2);
        assert_eq!(rank(&statuses, 2), TrustLevel::Community);
        assert_eq!(rank(&statuses, 3), TrustLevel::Unsigned);
        assert_eq!(rank(&statuses[..2], 3), TrustLevel::Unsigned);
    }

    #[test]
    fn rank_takes_highest() {
        let statuses = vec![
            SignatureStatus::Rejected(Rejection::BadSignature),
            SignatureStatus::Valid {
                level: TrustLevel::Org,
                fingerprint: "a".into(),
            },
            SignatureStatus::Valid {
                level: TrustLevel::Root,
                fingerprint: "b".into(),
            },
        ];
        assert_eq!(rank(&statuses, 2), TrustLevel::Root);
        assert_eq!(rank(&[], 2), TrustLevel::Unsigned);
    }

    #[test]
    fn lock_reason_display() {
        let reason = LockReason::CertificateExpired {
            org_id: "acme".into(),
            at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        insta::assert_snapshot!(
            reason.to_string(),
            @"certificate for org 'acme' expired at 2026-01-01T00:00:00+00:00"
        );
        assert!(!reason.is_revocation());
        assert!(LockReason::SignatureRevoked.is_revocation());
    }
}
