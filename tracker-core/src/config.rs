//! Tracker configuration.

use crate::bestiary::catalog::{CANDIDATE_FILES, FALLBACK_FILES};
use crate::persist::LOCAL_STORAGE_KEY;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number (got {value:?})")]
    InvalidNumber { var: &'static str, value: String },
}

/// How bestiary files are discovered.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// File names probed, in order.
    pub candidates: Vec<String>,

    /// Used when no probe could reach the source at all.
    pub fallback: Vec<String>,

    /// Number of probes in flight at once.
    pub batch_size: usize,

    /// Pause between batches.
    pub batch_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            candidates: CANDIDATE_FILES.iter().map(|f| f.to_string()).collect(),
            fallback: FALLBACK_FILES.iter().map(|f| f.to_string()).collect(),
            batch_size: 8,
            batch_delay: Duration::from_millis(50),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_candidates<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback = files.into_iter().map(Into::into).collect();
        self
    }

    /// Zero is treated as one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }
}

/// Top-level configuration for a tracker session.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Directory holding local storage files.
    pub data_dir: PathBuf,

    /// Key the campaign list is stored under.
    pub storage_key: String,

    /// Bestiary location: an `http(s)://` base URL or a directory.
    pub bestiary_base: String,

    pub discovery: DiscoveryConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            storage_key: LOCAL_STORAGE_KEY.to_string(),
            bestiary_base: "bestiary".to_string(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_bestiary_base(mut self, base: impl Into<String>) -> Self {
        self.bestiary_base = base.into();
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Whether the bestiary lives behind HTTP rather than on disk.
    pub fn bestiary_is_remote(&self) -> bool {
        self.bestiary_base.starts_with("http://") || self.bestiary_base.starts_with("https://")
    }

    /// Build from `TRACKER_*` environment variables, reading `.env` first
    /// if one exists. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup("TRACKER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup("TRACKER_STORAGE_KEY") {
            config.storage_key = key;
        }
        if let Some(base) = lookup("TRACKER_BESTIARY_BASE") {
            config.bestiary_base = base;
        }
        if let Some(size) = lookup("TRACKER_DISCOVERY_BATCH") {
            let size = parse_var("TRACKER_DISCOVERY_BATCH", &size)?;
            config.discovery = config.discovery.with_batch_size(size as usize);
        }
        if let Some(ms) = lookup("TRACKER_DISCOVERY_DELAY_MS") {
            let ms = parse_var("TRACKER_DISCOVERY_DELAY_MS", &ms)?;
            config.discovery = config.discovery.with_batch_delay(Duration::from_millis(ms));
        }

        Ok(config)
    }
}

fn parse_var(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.storage_key, "encounterFlowApp_campaigns_v2");
        assert_eq!(config.discovery.batch_size, 8);
        assert_eq!(config.discovery.batch_delay, Duration::from_millis(50));
        assert_eq!(config.discovery.candidates.len(), 28);
        assert!(!config.bestiary_is_remote());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("TRACKER_DATA_DIR", "/tmp/tracker"),
            ("TRACKER_BESTIARY_BASE", "https://example.com/data"),
            ("TRACKER_DISCOVERY_BATCH", "4"),
            ("TRACKER_DISCOVERY_DELAY_MS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/tracker"));
        assert!(config.bestiary_is_remote());
        assert_eq!(config.discovery.batch_size, 4);
        assert_eq!(config.discovery.batch_delay, Duration::ZERO);
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let result = TrackerConfig::from_lookup(lookup(&[("TRACKER_DISCOVERY_BATCH", "eight")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber {
                var: "TRACKER_DISCOVERY_BATCH",
                ..
            })
        ));
    }

    #[test]
    fn test_builder() {
        let config = TrackerConfig::new("saves")
            .with_storage_key("custom")
            .with_discovery(
                DiscoveryConfig::default()
                    .with_batch_size(0)
                    .with_candidates(["a.json"]),
            );
        assert_eq!(config.storage_key, "custom");
        assert_eq!(config.discovery.batch_size, 1);
        assert_eq!(config.discovery.candidates, vec!["a.json".to_string()]);
    }
}
