//! Execution history lookup for the confidence score.

use std::collections::HashMap;
use std::path::Path;

use crate::confidence::History;
use crate::error::VerifyError;

/// Source of per-skill execution history.
pub trait HistorySource: Send + Sync {
    fn history(&self, skill_id: &str) -> History;
}

/// Every skill is treated as never run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistorySource for NoHistory {
    fn history(&self, _skill_id: &str) -> History {
        History::default()
    }
}

impl HistorySource for HashMap<String, History> {
    fn history(&self, skill_id: &str) -> History {
        self.get(skill_id).copied().unwrap_or_default()
    }
}

/// Load a JSON object mapping skill ids to `{successes, failures}`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not such an object.
pub fn load_history(path: &Path) -> Result<HashMap<String, History>, VerifyError> {
    let text = std::fs::read_to_string(path).map_err(|e| VerifyError::io(path, e))?;
    let map: HashMap<String, History> = serde_json::from_str(&text)?;
    tracing::debug!(skills = map.len(), "execution history loaded from {}", path.display());
    Ok(map)
}
