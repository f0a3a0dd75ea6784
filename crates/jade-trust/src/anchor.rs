//! Trust anchors: root key, org certificates, community keys, revocations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;
use crate::key::{decode_public_key, fingerprint};
use crate::scope::Scope;

fn default_scope() -> String {
    "*".into()
}

fn default_issuer() -> String {
    "root".into()
}

/// Root-issued delegation to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrgCertificate {
    pub org_id: String,
    pub public_key: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    pub issuer_signature: String,
    #[serde(default)]
    pub revoked: bool,
}

impl OrgCertificate {
    /// Bytes the issuer signs: compact JSON of the certificate body with sorted keys.
    ///
    /// `not_before` is part of the body only when set.
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut body: BTreeMap<&str, String> = BTreeMap::from([
            (
                "expires_at",
                self.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("issuer", self.issuer.clone()),
            ("org_id", self.org_id.clone()),
            ("public_key", self.public_key.clone()),
            ("scope", self.scope.clone()),
        ]);
        if let Some(since) = self.not_before {
            body.insert("not_before", since.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        serde_json::to_vec(&body).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommunityKey {
    pub key_id: String,
    pub public_key: String,
}

/// On-disk anchor document (TOML or JSON).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnchorFile {
    #[serde(default)]
    pub root_public_key: Option<String>,
    #[serde(default)]
    pub orgs: Vec<OrgCertificate>,
    #[serde(default)]
    pub community: Vec<CommunityKey>,
    /// Key refs (`org:acme`) or key fingerprints (`SHA256:...`).
    #[serde(default)]
    pub revoked: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OrgAuthority {
    pub cert: OrgCertificate,
    pub key: VerifyingKey,
    pub scope: Scope,
}

/// Decoded, read-only trust anchors.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    root: Option<VerifyingKey>,
    orgs: BTreeMap<String, OrgAuthority>,
    community: BTreeMap<String, VerifyingKey>,
    revoked: BTreeSet<String>,
}

impl TrustAnchors {
    /// Anchors with nothing registered: every signature resolves to an unknown signer.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode every key and scope in an anchor document.
    ///
    /// # Errors
    ///
    /// Returns an error for undecodable keys, malformed scopes or duplicate ids.
    pub fn from_file(file: AnchorFile) -> Result<Self, TrustError> {
        let root = file
            .root_public_key
            .as_deref()
            .map(decode_public_key)
            .transpose()?;

        let mut orgs = BTreeMap::new();
        for cert in file.orgs {
            let key = decode_public_key(&cert.public_key)?;
            let scope = Scope::parse(&cert.scope)?;
            let org_id = cert.org_id.clone();
            if orgs
                .insert(org_id.clone(), OrgAuthority { cert, key, scope })
                .is_some()
            {
                return Err(TrustError::Duplicate {
                    kind: "org",
                    id: org_id,
                });
            }
        }

        let mut community = BTreeMap::new();
        for entry in file.community {
            let key = decode_public_key(&entry.public_key)?;
            if community.insert(entry.key_id.clone(), key).is_some() {
                return Err(TrustError::Duplicate {
                    kind: "community key",
                    id: entry.key_id,
                });
            }
        }

        let anchors = Self {
            root,
            orgs,
            community,
            revoked: file.revoked.into_iter().collect(),
        };
        tracing::debug!(
            root = anchors.root.is_some(),
            orgs = anchors.orgs.len(),
            community = anchors.community.len(),
            revoked = anchors.revoked.len(),
            "trust anchors loaded"
        );
        Ok(anchors)
    }

    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or [`Self::from_file`] fails.
    pub fn from_toml_str(text: &str) -> Result<Self, TrustError> {
        Self::from_file(toml::from_str(text)?)
    }

    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or [`Self::from_file`] fails.
    pub fn from_json_str(text: &str) -> Result<Self, TrustError> {
        Self::from_file(serde_json::from_str(text)?)
    }

    /// Load anchors from disk; `.json` files are read as JSON, anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, TrustError> {
        let text = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }

    #[must_use]
    pub fn root(&self) -> Option<&VerifyingKey> {
        self.root.as_ref()
    }

    #[must_use]
    pub fn org(&self, org_id: &str) -> Option<&OrgAuthority> {
        self.orgs.get(org_id)
    }

    #[must_use]
    pub fn community_key(&self, key_id: &str) -> Option<&VerifyingKey> {
        self.community.get(key_id)
    }

    /// Whether a key is on the anchor revocation list, by ref or by fingerprint.
    #[must_use]
    pub fn is_revoked(&self, key_ref: &str, key: &VerifyingKey) -> bool {
        self.revoked.contains(key_ref) || self.revoked.contains(&fingerprint(key))
    }

    #[must_use]
    pub fn org_count(&self) -> usize {
        self.orgs.len()
    }

    #[must_use]
    pub fn community_count(&self) -> usize {
        self.community.len()
    }
}
