//! Signer resolution and certificate chain verification.

use std::fmt;

use ed25519_dalek::VerifyingKey;

use crate::anchor::TrustAnchors;
use crate::error::TrustError;
use crate::key::{decode_signature, verify};
use crate::level::TrustLevel;

/// Maximum delegation depth below root. Orgs cannot issue further sub-authorities.
pub const MAX_CHAIN_DEPTH: usize = 1;

/// Parsed `public_key_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRef<'a> {
    Root,
    Org(&'a str),
    Community(&'a str),
}

impl<'a> KeyRef<'a> {
    /// `root`, `org:<id>` or `community:<id>`.
    #[must_use]
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.trim();
        if text == "root" {
            return Some(Self::Root);
        }
        let (kind, id) = text.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        match kind {
            "org" => Some(Self::Org(id)),
            "community" => Some(Self::Community(id)),
            _ => None,
        }
    }
}

/// Who vouches for a signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authority {
    Root,
    Org {
        org_id: String,
        parent: Box<Authority>,
    },
    Community {
        key_id: String,
    },
}

impl Authority {
    #[must_use]
    pub fn level(&self) -> TrustLevel {
        match self {
            Self::Root => TrustLevel::Root,
            Self::Org { .. } => TrustLevel::Org,
            Self::Community { .. } => TrustLevel::Community,
        }
    }

    /// Number of delegation links between this authority and its trust root.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Root | Self::Community { .. } => 0,
            Self::Org { parent, .. } => 1 + parent.depth(),
        }
    }

    #[must_use]
    pub fn key_ref(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Org { org_id, .. } => write!(f, "org:{org_id}"),
            Self::Community { key_id } => write!(f, "community:{key_id}"),
        }
    }
}

fn depth_guard(depth: usize) -> Result<(), TrustError> {
    if depth > MAX_CHAIN_DEPTH {
        return Err(TrustError::ChainDepth {
            depth,
            max: MAX_CHAIN_DEPTH,
        });
    }
    Ok(())
}

/// Resolve a key ref into its authority chain.
///
/// # Errors
///
/// Unknown signers, community keys used as issuers and chains deeper than
/// [`MAX_CHAIN_DEPTH`] are errors.
pub fn resolve(anchors: &TrustAnchors, key_ref: &str) -> Result<Authority, TrustError> {
    resolve_at(anchors, key_ref, 0)
}

fn resolve_at(
    anchors: &TrustAnchors,
    key_ref: &str,
    depth: usize,
) -> Result<Authority, TrustError> {
    depth_guard(depth)?;
    let unknown = || TrustError::UnknownSigner(key_ref.to_owned());
    match KeyRef::parse(key_ref).ok_or_else(unknown)? {
        KeyRef::Root => anchors.root().map(|_| Authority::Root).ok_or_else(unknown),
        KeyRef::Org(org_id) => {
            let org = anchors.org(org_id).ok_or_else(unknown)?;
            let parent = resolve_at(anchors, &org.cert.issuer, depth + 1)?;
            Ok(Authority::Org {
                org_id: org_id.to_owned(),
                parent: Box::new(parent),
            })
        }
        KeyRef::Community(key_id) => {
            if depth > 0 {
                return Err(TrustError::InvalidIssuer(key_ref.to_owned()));
            }
            anchors.community_key(key_id).ok_or_else(unknown)?;
            Ok(Authority::Community {
                key_id: key_id.to_owned(),
            })
        }
    }
}

/// Public key that signs on behalf of `authority`.
///
/// # Errors
///
/// Returns [`TrustError::UnknownSigner`] if the anchors no longer hold the key.
pub fn signing_key<'a>(
    anchors: &'a TrustAnchors,
    authority: &Authority,
) -> Result<&'a VerifyingKey, TrustError> {
    let key = match authority {
        Authority::Root => anchors.root(),
        Authority::Org { org_id, .. } => anchors.org(org_id).map(|o| &o.key),
        Authority::Community { key_id } => anchors.community_key(key_id),
    };
    key.ok_or_else(|| TrustError::UnknownSigner(authority.key_ref()))
}

/// Check every issuer signature from `authority` up to the root.
///
/// # Errors
///
/// Returns an error if any certificate is not signed by its parent or the
/// chain exceeds [`MAX_CHAIN_DEPTH`].
pub fn verify_chain(anchors: &TrustAnchors, authority: &Authority) -> Result<(), TrustError> {
    verify_link(anchors, authority, 0)
}

fn verify_link(
    anchors: &TrustAnchors,
    authority: &Authority,
    depth: usize,
) -> Result<(), TrustError> {
    depth_guard(depth)?;
    let Authority::Org { org_id, parent } = authority else {
        return Ok(());
    };
    verify_link(anchors, parent, depth + 1)?;
    let org = anchors
        .org(org_id)
        .ok_or_else(|| TrustError::UnknownSigner(authority.key_ref()))?;
    let issuer_key = signing_key(anchors, parent)?;
    let signature = decode_signature(&org.cert.issuer_signature)
        .map_err(|_| TrustError::CertificateSignature(org_id.clone()))?;
    if verify(issuer_key, &org.cert.signing_payload(), &signature) {
        Ok(())
    } else {
        Err(TrustError::CertificateSignature(org_id.clone()))
    }
}
