use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_CACHE_CAPACITY: usize = 8;
const CACHE_CAPACITY_ENV: &str = "REVTRACK_CACHE_CAPACITY";
const DIFF_TIMEOUT_ENV: &str = "REVTRACK_DIFF_TIMEOUT_MS";

/// Tunables for a [`crate::RevisionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of revisions (and file contents) a pass keeps cached.
    pub cache_capacity: usize,
    /// Upper bound for a single line diff, in milliseconds. When exceeded the
    /// diff degrades to a coarser (still correct) edit script.
    pub diff_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            diff_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `REVTRACK_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    /// Overlay values produced by `lookup` on top of `self`.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(CACHE_CAPACITY_ENV) {
            match raw.trim().parse() {
                Ok(capacity) => self.cache_capacity = capacity,
                Err(err) => warn!(key = CACHE_CAPACITY_ENV, %raw, %err, "ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(DIFF_TIMEOUT_ENV) {
            match raw.trim().parse() {
                Ok(millis) => self.diff_timeout_ms = Some(millis),
                Err(err) => warn!(key = DIFF_TIMEOUT_ENV, %raw, %err, "ignoring invalid value"),
            }
        }

        self
    }

    /// Diff timeout as a [`Duration`].
    #[must_use]
    pub fn diff_timeout(&self) -> Option<Duration> {
        self.diff_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 8);
        assert!(config.diff_timeout().is_none());
    }

    #[test]
    fn overlay_reads_known_keys() {
        let config = EngineConfig::default().overlay(|key| match key {
            "REVTRACK_CACHE_CAPACITY" => Some("3".into()),
            "REVTRACK_DIFF_TIMEOUT_MS" => Some(" 250 ".into()),
            _ => None,
        });
        assert_eq!(config.cache_capacity, 3);
        assert_eq!(config.diff_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn overlay_ignores_garbage() {
        let config = EngineConfig::default().overlay(|key| {
            (key == "REVTRACK_CACHE_CAPACITY").then(|| "lots".to_string())
        });
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"diff_timeout_ms": 40}"#).expect("deserialize config");
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.diff_timeout_ms, Some(40));
    }
}
