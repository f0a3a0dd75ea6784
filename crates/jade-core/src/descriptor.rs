//! Skill descriptor data model and canonical hashing.

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use jade_trust::{SignatureTerms, TrustError, sign_skill};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::VerifyError;

/// Top-level key excluded from the skill hash; signatures sign the hash.
pub const SIGNATURES_KEY: &str = "signatures";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SkillDescriptor {
    pub jade_version: String,
    pub skill_id: String,
    #[serde(default)]
    pub version: Option<String>,
    pub metadata: Metadata,
    pub trigger: Trigger,
    #[serde(default)]
    pub input_schema: Option<InputSchema>,
    #[serde(default)]
    pub output_schema: Option<OutputSchema>,
    pub execution_dag: ExecutionDag,
    pub security: SecurityPolicy,
    #[serde(default)]
    pub signatures: Vec<Signature>,
    #[serde(default)]
    pub mcp_compatible: bool,
    #[serde(default)]
    pub required_mcp_capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InputSchema {
    #[serde(default)]
    pub required_params: Vec<ParamSpec>,
    #[serde(default)]
    pub optional_params: Vec<ParamSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputSchema {
    #[serde(default)]
    pub fields: Vec<ParamSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Node {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Edge {
    /// Branch label; `label` wins over the older `condition` spelling.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        self.label.as_deref().or(self.condition.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDag {
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    entry_node: Option<OneOrMany>,
    #[serde(default)]
    exit_node: Option<OneOrMany>,
    #[serde(default)]
    exit_nodes: Option<OneOrMany>,
}

/// Declared task graph. Entry and exit lists keep whatever multiplicity the
/// descriptor declared; the analyzer enforces exactly one entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "RawDag")]
pub struct ExecutionDag {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub entry_nodes: Vec<String>,
    pub exit_nodes: Vec<String>,
}

impl From<RawDag> for ExecutionDag {
    fn from(raw: RawDag) -> Self {
        let mut exit_nodes: Vec<String> = raw.exit_nodes.map(Into::into).unwrap_or_default();
        if let Some(single) = raw.exit_node {
            for id in Vec::<String>::from(single) {
                if !exit_nodes.contains(&id) {
                    exit_nodes.push(id);
                }
            }
        }
        Self {
            nodes: raw.nodes,
            edges: raw.edges,
            entry_nodes: raw.entry_node.map(Into::into).unwrap_or_default(),
            exit_nodes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilePermissions {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecurityPolicy {
    #[serde(default)]
    pub network_whitelist: Vec<String>,
    #[serde(default)]
    pub file_permissions: FilePermissions,
    #[serde(default)]
    pub max_execution_time_ms: u64,
    #[serde(default)]
    pub max_retries: u64,
    #[serde(default = "default_sandbox_level")]
    pub sandbox_level: String,
    /// Extra literal deny substrings. Additive only.
    #[serde(default)]
    pub dangerous_patterns: Vec<String>,
    #[serde(default)]
    pub env_whitelist: Vec<String>,
}

fn default_sandbox_level() -> String {
    "strict".into()
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            network_whitelist: Vec::new(),
            file_permissions: FilePermissions::default(),
            max_execution_time_ms: 0,
            max_retries: 0,
            sandbox_level: default_sandbox_level(),
            dangerous_patterns: Vec::new(),
            env_whitelist: Vec::new(),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

impl SecurityPolicy {
    /// Field-by-field extraction that keeps every well-typed field even when
    /// others are malformed; type errors are reported by the schema layer.
    #[must_use]
    pub fn lenient(value: &Value) -> Self {
        let perms = value.get("file_permissions");
        Self {
            network_whitelist: string_list(value.get("network_whitelist")),
            file_permissions: FilePermissions {
                read: string_list(perms.and_then(|p| p.get("read"))),
                write: string_list(perms.and_then(|p| p.get("write"))),
            },
            max_execution_time_ms: value
                .get("max_execution_time_ms")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            max_retries: value.get("max_retries").and_then(Value::as_u64).unwrap_or(0),
            sandbox_level: value
                .get("sandbox_level")
                .and_then(Value::as_str)
                .map_or_else(default_sandbox_level, str::to_owned),
            dangerous_patterns: string_list(value.get("dangerous_patterns")),
            env_whitelist: string_list(value.get("env_whitelist")),
        }
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.sandbox_level.eq_ignore_ascii_case("strict")
    }

    #[must_use]
    pub fn allows_any_host(&self) -> bool {
        self.network_whitelist.iter().any(|h| h.trim() == "*")
    }
}

fn default_algorithm() -> String {
    jade_trust::key::ED25519.into()
}

fn default_signature_scope() -> String {
    "*".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signature {
    pub signer_id: String,
    pub public_key_ref: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub bytes: String,
    #[serde(default = "default_signature_scope")]
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
}

impl Signature {
    /// Sign `skill_hash` under `terms` for verification through `key_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Scope`] when the scope is not a valid pattern.
    pub fn create(
        key: &SigningKey,
        signer_id: impl Into<String>,
        key_ref: impl Into<String>,
        skill_hash: &str,
        terms: &SignatureTerms,
    ) -> Result<Self, TrustError> {
        Ok(Self {
            signer_id: signer_id.into(),
            public_key_ref: key_ref.into(),
            algorithm: jade_trust::key::ED25519.into(),
            bytes: sign_skill(key, skill_hash, terms)?,
            scope: terms.scope.clone(),
            issued_at: terms.issued_at,
            expires_at: terms.expires_at,
            revoked: false,
        })
    }

    #[must_use]
    pub fn claim(&self) -> jade_trust::SignatureClaim<'_> {
        jade_trust::SignatureClaim {
            signer_id: &self.signer_id,
            key_ref: &self.public_key_ref,
            algorithm: &self.algorithm,
            signature: &self.bytes,
            scope: &self.scope,
            issued_at: Some(self.issued_at),
            expires_at: self.expires_at,
            revoked: self.revoked,
        }
    }
}

/// Compact JSON with object keys sorted at every level.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out, None);
    out
}

fn write_canonical(value: &Value, out: &mut String, skip_key: Option<&str>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| skip_key != Some(k.as_str()))
                .collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(&map[key], out, None);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out, None);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Add `signature` to the top-level `signatures` array of a raw descriptor.
///
/// A signature made through the same key reference is replaced. The skill
/// hash is unaffected.
///
/// # Errors
///
/// Returns [`VerifyError::Shape`] when the descriptor is not an object or its
/// `signatures` field is not an array.
pub fn attach_signature(value: &mut Value, signature: &Signature) -> Result<(), VerifyError> {
    let Value::Object(map) = value else {
        return Err(VerifyError::Shape("descriptor must be a JSON object"));
    };
    let entry = map
        .entry(SIGNATURES_KEY)
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(signatures) = entry else {
        return Err(VerifyError::Shape("`signatures` must be an array"));
    };
    signatures.retain(|existing| {
        existing.get("public_key_ref").and_then(Value::as_str)
            != Some(signature.public_key_ref.as_str())
    });
    signatures.push(serde_json::to_value(signature)?);
    Ok(())
}

/// SHA-256 hex of the canonical descriptor with top-level `signatures` removed.
#[must_use]
pub fn skill_hash(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical, Some(SIGNATURES_KEY));
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
