//! Versioned, immutable rule tables: allowed actions, threat signatures and
//! the expected descriptor shape.

pub mod actions;
pub mod error;
pub mod schema;
pub mod signatures;
pub mod store;
pub mod tables;

pub use actions::{ActionCatalog, ActionCategory, ActionSpec};
pub use error::RulesError;
pub use schema::SchemaShape;
pub use signatures::{
    SignatureMatch, SignatureRule, SignatureSet, ThreatCategory, compile_extra_patterns,
};
pub use store::RuleStore;
pub use tables::RuleTables;
