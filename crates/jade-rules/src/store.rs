use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::RulesError;
use crate::tables::RuleTables;

/// Load-once holder for the active rule tables.
///
/// Readers take an `Arc` snapshot and keep it for the whole verification
/// call; `refresh` swaps in a new table set only when explicitly asked.
#[derive(Debug)]
pub struct RuleStore {
    source: Option<PathBuf>,
    current: RwLock<Arc<RuleTables>>,
}

impl RuleStore {
    /// Store backed by the built-in tables.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(RuleTables::builtin())),
        }
    }

    /// Store backed by a rule file, loaded immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, RulesError> {
        let path = path.into();
        let tables = RuleTables::load(&path)?;
        Ok(Self {
            source: Some(path),
            current: RwLock::new(Arc::new(tables)),
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleTables> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Reload from the backing file. On failure the previous tables stay active.
    ///
    /// # Errors
    ///
    /// Returns the load error; the active snapshot is unchanged.
    pub fn refresh(&self) -> Result<Arc<RuleTables>, RulesError> {
        let tables = match &self.source {
            Some(path) => RuleTables::load(path)?,
            None => RuleTables::builtin(),
        };
        let tables = Arc::new(tables);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&tables);
        tracing::info!(version = tables.version(), "rule tables refreshed");
        Ok(tables)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::builtin()
    }
}
