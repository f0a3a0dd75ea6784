//! Static verification of declarative skill descriptors: schema, threat
//! scan, network policy, graph proofs and signature trust, scored into a
//! single verdict.

pub mod batch;
pub mod confidence;
pub mod config;
pub mod dag;
pub mod descriptor;
pub mod error;
pub mod history;
pub mod issue;
pub mod network;
pub mod scanner;
pub mod schema;
pub mod trust;
pub mod verifier;

pub use batch::{FileReport, collect_inputs, verify_batch};
pub use confidence::History;
pub use config::Config;
pub use dag::ValidatedDag;
pub use descriptor::{Signature, SkillDescriptor, attach_signature, canonical_json, skill_hash};
pub use error::VerifyError;
pub use history::{HistorySource, NoHistory, load_history};
pub use issue::{IssueKind, Layer, Severity, ValidationIssue, ValidationResult, Verdict, code};
pub use verifier::{Verification, Verifier, VerifyContext};
