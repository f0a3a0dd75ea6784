use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Hard ceiling for nested decoding; larger configured values are clamped.
pub const MAX_DECODE_DEPTH: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

fn default_parallel_layers() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VerifierConfig {
    /// Require at least one valid signature.
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default = "default_parallel_layers")]
    pub parallel_layers: bool,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub trust: TrustConfig,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            parallel_layers: default_parallel_layers(),
            confidence: ConfidenceConfig::default(),
            scanner: ScannerConfig::default(),
            graph: GraphConfig::default(),
            network: NetworkConfig::default(),
            trust: TrustConfig::default(),
        }
    }
}

fn default_prior() -> f64 {
    1.0
}

fn default_warning_weight() -> f64 {
    0.5
}

fn default_layer_success_weight() -> f64 {
    4.0
}

fn default_verified_threshold() -> f64 {
    0.95
}

fn default_warning_threshold() -> f64 {
    0.70
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_prior")]
    pub alpha: f64,
    #[serde(default = "default_prior")]
    pub beta: f64,
    /// Share of a failure each WARNING counts as.
    #[serde(default = "default_warning_weight")]
    pub warning_weight: f64,
    /// Share of a success each passed layer counts as.
    #[serde(default = "default_layer_success_weight")]
    pub layer_success_weight: f64,
    #[serde(default = "default_verified_threshold")]
    pub verified_threshold: f64,
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            alpha: default_prior(),
            beta: default_prior(),
            warning_weight: default_warning_weight(),
            layer_success_weight: default_layer_success_weight(),
            verified_threshold: default_verified_threshold(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

fn default_max_field_len() -> usize {
    65_536
}

fn default_max_decode_depth() -> usize {
    MAX_DECODE_DEPTH
}

fn default_max_decode_candidates() -> usize {
    16
}

fn default_max_string_leaves() -> usize {
    20_000
}

fn default_max_json_depth() -> usize {
    64
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScannerConfig {
    /// Bytes; longer string leaves are rejected unscanned.
    #[serde(default = "default_max_field_len")]
    pub max_field_len: usize,
    #[serde(default = "default_max_decode_depth")]
    pub max_decode_depth: usize,
    /// Decoded substrings examined per string per level.
    #[serde(default = "default_max_decode_candidates")]
    pub max_decode_candidates: usize,
    #[serde(default = "default_max_string_leaves")]
    pub max_string_leaves: usize,
    #[serde(default = "default_max_json_depth")]
    pub max_json_depth: usize,
}

impl ScannerConfig {
    #[must_use]
    pub fn decode_depth(&self) -> usize {
        self.max_decode_depth.min(MAX_DECODE_DEPTH)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_field_len: default_max_field_len(),
            max_decode_depth: default_max_decode_depth(),
            max_decode_candidates: default_max_decode_candidates(),
            max_string_leaves: default_max_string_leaves(),
            max_json_depth: default_max_json_depth(),
        }
    }
}

fn default_max_nodes() -> usize {
    1024
}

fn default_max_edges() -> usize {
    4096
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GraphConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_edges")]
    pub max_edges: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_edges: default_max_edges(),
        }
    }
}

fn default_entropy_threshold() -> f64 {
    4.0
}

fn default_min_token_len() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Shannon entropy (bits per byte) above which a URL token looks like a secret.
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: default_entropy_threshold(),
            min_token_len: default_min_token_len(),
        }
    }
}

fn default_community_min_signatures() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrustConfig {
    #[serde(default = "default_community_min_signatures")]
    pub community_min_signatures: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            community_min_signatures: default_community_min_signatures(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub rules: Option<PathBuf>,
    #[serde(default)]
    pub anchors: Option<PathBuf>,
    #[serde(default)]
    pub history: Option<PathBuf>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}
