//! Expected descriptor shape.

use std::collections::BTreeSet;

use regex::Regex;
use semver::{Version, VersionReq};
use serde::Deserialize;

use crate::error::RulesError;
use crate::signatures::compile;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSchema {
    pub jade_version: String,
    pub skill_id: String,
    pub template_path: String,
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub optional_fields: Vec<String>,
    pub param_types: Vec<String>,
    pub trigger_types: Vec<String>,
    pub condition_operators: Vec<String>,
    pub sandbox_levels: Vec<String>,
    pub edge_labels: Vec<String>,
}

/// Field names, enums and patterns a descriptor must conform to.
#[derive(Debug, Clone)]
pub struct SchemaShape {
    jade_version: VersionReq,
    skill_id: Regex,
    template_path: Regex,
    pub required_fields: Vec<String>,
    pub optional_fields: BTreeSet<String>,
    pub param_types: BTreeSet<String>,
    pub trigger_types: BTreeSet<String>,
    pub condition_operators: BTreeSet<String>,
    pub sandbox_levels: BTreeSet<String>,
    pub edge_labels: BTreeSet<String>,
}

fn non_empty(kind: &'static str, items: Vec<String>) -> Result<BTreeSet<String>, RulesError> {
    if items.is_empty() {
        return Err(RulesError::Empty(kind));
    }
    Ok(items.into_iter().collect())
}

impl SchemaShape {
    pub(crate) fn from_raw(raw: RawSchema) -> Result<Self, RulesError> {
        let jade_version =
            VersionReq::parse(&raw.jade_version).map_err(|source| RulesError::VersionRange {
                range: raw.jade_version.clone(),
                source,
            })?;
        if raw.required_fields.is_empty() {
            return Err(RulesError::Empty("schema.required_fields"));
        }
        Ok(Self {
            jade_version,
            skill_id: compile("schema.skill_id", &raw.skill_id)?,
            template_path: compile("schema.template_path", &raw.template_path)?,
            required_fields: raw.required_fields,
            optional_fields: raw.optional_fields.into_iter().collect(),
            param_types: non_empty("schema.param_types", raw.param_types)?,
            trigger_types: non_empty("schema.trigger_types", raw.trigger_types)?,
            condition_operators: non_empty("schema.condition_operators", raw.condition_operators)?,
            sandbox_levels: non_empty("schema.sandbox_levels", raw.sandbox_levels)?,
            edge_labels: non_empty("schema.edge_labels", raw.edge_labels)?,
        })
    }

    #[must_use]
    pub fn supported_versions(&self) -> &VersionReq {
        &self.jade_version
    }

    #[must_use]
    pub fn supports_version(&self, version: &Version) -> bool {
        self.jade_version.matches(version)
    }

    #[must_use]
    pub fn is_valid_skill_id(&self, id: &str) -> bool {
        self.skill_id.is_match(id)
    }

    /// Whether the inside of a `{{ ... }}` block is a plain variable path.
    #[must_use]
    pub fn is_template_path(&self, inner: &str) -> bool {
        self.template_path.is_match(inner.trim())
    }

    #[must_use]
    pub fn is_known_field(&self, name: &str) -> bool {
        self.required_fields.iter().any(|f| f == name) || self.optional_fields.contains(name)
    }
}
