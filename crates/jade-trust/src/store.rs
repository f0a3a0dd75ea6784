use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::anchor::TrustAnchors;
use crate::error::TrustError;

/// Load-once holder for the active trust anchors; refreshed only on request.
#[derive(Debug)]
pub struct AnchorStore {
    source: Option<PathBuf>,
    current: RwLock<Arc<TrustAnchors>>,
}

impl AnchorStore {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(TrustAnchors::empty())),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the initial load fails.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let path = path.into();
        let anchors = TrustAnchors::load(&path)?;
        Ok(Self {
            source: Some(path),
            current: RwLock::new(Arc::new(anchors)),
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<TrustAnchors> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Reload from the backing file; a failed reload leaves the previous anchors active.
    ///
    /// # Errors
    ///
    /// Returns the load error.
    pub fn refresh(&self) -> Result<Arc<TrustAnchors>, TrustError> {
        let Some(path) = &self.source else {
            return Ok(self.snapshot());
        };
        let anchors = Arc::new(TrustAnchors::load(path)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&anchors);
        tracing::info!(
            path = %path.display(),
            orgs = anchors.org_count(),
            "trust anchors refreshed"
        );
        Ok(anchors)
    }
}

impl Default for AnchorStore {
    fn default() -> Self {
        Self::empty()
    }
}
