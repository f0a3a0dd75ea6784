use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("JADE_STRICT_MODE") {
            if let Ok(strict) = v.parse::<bool>() {
                self.verifier.strict_mode = strict;
            } else {
                tracing::warn!("ignoring invalid JADE_STRICT_MODE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("JADE_RULES")
            && !v.trim().is_empty()
        {
            self.paths.rules = Some(v.into());
        }
        if let Ok(v) = std::env::var("JADE_ANCHORS")
            && !v.trim().is_empty()
        {
            self.paths.anchors = Some(v.into());
        }
        if let Ok(v) = std::env::var("JADE_HISTORY")
            && !v.trim().is_empty()
        {
            self.paths.history = Some(v.into());
        }
        if let Ok(v) = std::env::var("JADE_WORKERS") {
            match v.parse::<usize>() {
                Ok(workers) if workers > 0 => self.batch.workers = workers,
                _ => tracing::warn!("ignoring invalid JADE_WORKERS value: {v}"),
            }
        }
    }
}
