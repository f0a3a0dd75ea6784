//! Allowed atomic action catalog.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RulesError;

/// Coarse grouping for catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    Network,
    File,
    Data,
    Control,
    Mcp,
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::File => f.write_str("file"),
            Self::Data => f.write_str("data"),
            Self::Control => f.write_str("control"),
            Self::Mcp => f.write_str("mcp"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawAction {
    pub name: String,
    pub category: ActionCategory,
    #[serde(default)]
    pub network: bool,
}

/// One allowed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub category: ActionCategory,
    /// Whether the action can reach a remote host.
    pub network: bool,
}

/// Immutable set of actions a DAG node may reference.
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: BTreeMap<String, ActionSpec>,
}

impl ActionCatalog {
    pub(crate) fn from_raw(raw: Vec<RawAction>) -> Result<Self, RulesError> {
        if raw.is_empty() {
            return Err(RulesError::Empty("actions"));
        }
        let mut actions = BTreeMap::new();
        for action in raw {
            let spec = ActionSpec {
                category: action.category,
                network: action.network,
            };
            if actions.insert(action.name.clone(), spec).is_some() {
                return Err(RulesError::Duplicate {
                    kind: "action",
                    name: action.name,
                });
            }
        }
        Ok(Self { actions })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    /// Unknown actions are never network-capable; the DAG layer rejects them separately.
    #[must_use]
    pub fn is_network(&self, name: &str) -> bool {
        self.actions.get(name).is_some_and(|a| a.network)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
