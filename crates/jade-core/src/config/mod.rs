mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;

/// Config file used when neither `--config` nor `JADE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        let scanner = &mut self.verifier.scanner;
        if scanner.max_decode_depth > MAX_DECODE_DEPTH {
            tracing::warn!(
                "max_decode_depth {} clamped to {MAX_DECODE_DEPTH}",
                scanner.max_decode_depth
            );
            scanner.max_decode_depth = MAX_DECODE_DEPTH;
        }
        if self.batch.workers == 0 {
            self.batch.workers = 1;
        }
    }
}
