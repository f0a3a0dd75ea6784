//! Hierarchical Ed25519 trust chain: root, root-certified orgs, community keys.

pub mod anchor;
pub mod chain;
pub mod check;
pub mod error;
pub mod key;
pub mod level;
pub mod scope;
pub mod sign;
pub mod store;

pub use anchor::{AnchorFile, CommunityKey, OrgAuthority, OrgCertificate, TrustAnchors};
pub use chain::{Authority, KeyRef, MAX_CHAIN_DEPTH};
pub use check::{
    LockReason, Rejection, SignatureClaim, SignatureStatus, check_signature, community_count,
    rank,
};
pub use error::TrustError;
pub use level::TrustLevel;
pub use scope::Scope;
pub use sign::{
    CertificateRequest, SignatureTerms, issue_certificate, sign_skill, signing_message,
};
pub use store::AnchorStore;
