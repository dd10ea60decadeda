//! Pipeline configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tagwise/config/pipeline.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Environment variables (`TAGWISE_BATCH_SIZE`, `TAGWISE_SIMILARITY_THRESHOLD`)
//! are applied last.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

/// Tunables for the classification pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Products per categorization request
    pub batch_size: usize,
    /// Embedding matches must be strictly closer than this cosine distance
    pub similarity_threshold: f64,
    /// Lower bound of the Travel amount hint
    pub travel_min_amount: f64,
    /// Upper bound of the Travel amount hint
    pub travel_max_amount: f64,
    /// Lifetime of a new session
    pub session_ttl_hours: i64,
    /// Timeout for each model request
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            similarity_threshold: 0.08,
            travel_min_amount: 80.0,
            travel_max_amount: 350.0,
            session_ttl_hours: 1,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    /// Load from the default override location, then the environment
    pub fn load() -> Result<Self> {
        let mut config = load_config(None)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file (no environment overrides)
    pub fn from_path(path: &Path) -> Result<Self> {
        let config = load_config(Some(path))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TAGWISE_BATCH_SIZE") {
            self.batch_size = value.trim().parse().map_err(|_| {
                Error::Config(format!("TAGWISE_BATCH_SIZE is not a number: {}", value))
            })?;
        }
        if let Some(value) = lookup("TAGWISE_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "TAGWISE_SIMILARITY_THRESHOLD is not a number: {}",
                    value
                ))
            })?;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 2.0) {
            return Err(Error::Config(format!(
                "similarity_threshold must be in (0, 2], got {}",
                self.similarity_threshold
            )));
        }
        if self.travel_min_amount > self.travel_max_amount {
            return Err(Error::Config(
                "travel_min_amount must not exceed travel_max_amount".into(),
            ));
        }
        if self.session_ttl_hours <= 0 {
            return Err(Error::Config("session ttl_hours must be positive".into()));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tagwise").join("config").join("pipeline.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<PipelineConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);

    let content = match path {
        Some(path) if path.exists() => fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?,
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    classification: Option<RawClassification>,
    embedding: Option<RawEmbedding>,
    session: Option<RawSession>,
    http: Option<RawHttp>,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    batch_size: Option<usize>,
    travel_min_amount: Option<f64>,
    travel_max_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawEmbedding {
    similarity_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    ttl_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawHttp {
    request_timeout_secs: Option<u64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<PipelineConfig> {
    let raw: RawConfig = toml::from_str(content)?;
    let mut config = PipelineConfig::default();

    if let Some(c) = raw.classification {
        if let Some(batch_size) = c.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(min) = c.travel_min_amount {
            config.travel_min_amount = min;
        }
        if let Some(max) = c.travel_max_amount {
            config.travel_max_amount = max;
        }
    }
    if let Some(threshold) = raw.embedding.and_then(|e| e.similarity_threshold) {
        config.similarity_threshold = threshold;
    }
    if let Some(ttl) = raw.session.and_then(|s| s.ttl_hours) {
        config.session_ttl_hours = ttl;
    }
    if let Some(secs) = raw.http.and_then(|h| h.request_timeout_secs) {
        config.request_timeout = Duration::from_secs(secs);
    }

    Ok(config)
}
