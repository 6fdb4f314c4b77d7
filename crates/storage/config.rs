//! Archive configuration, deserialized from the `db.archive` section.

use std::path::PathBuf;

use relayer_tinypack::DEFAULT_MAX_VARIADIC_LENGTH;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub options: StorageOptions,
    pub gc_interval_seconds: u64,
    pub iteration_timeout_seconds: u64,
    /// Row cap for ranged reads called with a zero limit.
    pub iteration_max_items: usize,
    pub log_filter_ttl_minutes: u64,
    pub index: LegacyIndexConfig,
    pub log_scan: LogScanConfig,
    pub codec: CodecConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            options: StorageOptions::default(),
            gc_interval_seconds: 10,
            iteration_timeout_seconds: 5,
            iteration_max_items: 10_000,
            log_filter_ttl_minutes: 15,
            index: LegacyIndexConfig::default(),
            log_scan: LogScanConfig::default(),
            codec: CodecConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageOptions {
    pub dir: PathBuf,
    pub in_memory: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp/badger/data"),
            in_memory: false,
        }
    }
}

/// Settings of the former range-scanner index. Only validated and logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyIndexConfig {
    pub max_jumps: u64,
    pub max_range_scanners: u64,
    pub max_value_fetchers: u64,
}

impl Default for LegacyIndexConfig {
    fn default() -> Self {
        Self {
            max_jumps: 1000,
            max_range_scanners: 4,
            max_value_fetchers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogScanConfig {
    /// Upper bound on the number of index iterators one query may open.
    pub max_iterators: usize,
    /// Height spans up to this value are always scanned linearly.
    pub range_threshold: u64,
    pub processors: usize,
    pub queue_depth: usize,
    /// Populate the hash-feature index on insert and use it for wide scans.
    pub feature_index: bool,
    /// Maximum number of features combined in one index entry.
    pub max_indexed_features: u32,
    /// Number of leading topics eligible for indexing.
    pub max_indexed_topics: usize,
}

impl Default for LogScanConfig {
    fn default() -> Self {
        Self {
            max_iterators: 10_000,
            range_threshold: 3000,
            processors: 6,
            queue_depth: 200,
            feature_index: true,
            max_indexed_features: 2,
            max_indexed_topics: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodecConfig {
    pub max_variadic_length: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_variadic_length: DEFAULT_MAX_VARIADIC_LENGTH,
        }
    }
}

fn require_non_zero(key: &str, value: u64) -> Result<(), StoreError> {
    if value == 0 {
        return Err(StoreError::InvalidConfig(format!("{key} must be positive")));
    }
    Ok(())
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            options: StorageOptions {
                in_memory: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        require_non_zero("gcIntervalSeconds", self.gc_interval_seconds)?;
        require_non_zero("iterationTimeoutSeconds", self.iteration_timeout_seconds)?;
        require_non_zero("iterationMaxItems", self.iteration_max_items as u64)?;
        require_non_zero("logFilterTtlMinutes", self.log_filter_ttl_minutes)?;
        require_non_zero("index.maxJumps", self.index.max_jumps)?;
        require_non_zero("index.maxRangeScanners", self.index.max_range_scanners)?;
        require_non_zero("index.maxValueFetchers", self.index.max_value_fetchers)?;
        require_non_zero("logScan.maxIterators", self.log_scan.max_iterators as u64)?;
        require_non_zero("logScan.processors", self.log_scan.processors as u64)?;
        require_non_zero("logScan.queueDepth", self.log_scan.queue_depth as u64)?;
        require_non_zero("codec.maxVariadicLength", self.codec.max_variadic_length)?;
        // Index bitmasks are stored in a single byte: address plus up to 7 topics.
        if self.log_scan.max_indexed_topics > 7 {
            return Err(StoreError::InvalidConfig(
                "logScan.maxIndexedTopics must be at most 7".to_string(),
            ));
        }
        if !self.options.in_memory && self.options.dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "options.dir must be set for on-disk storage".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn log_summary(&self) {
        info!(
            dir = %self.options.dir.display(),
            in_memory = self.options.in_memory,
            gc_interval_seconds = self.gc_interval_seconds,
            iteration_timeout_seconds = self.iteration_timeout_seconds,
            iteration_max_items = self.iteration_max_items,
            "Archive configuration"
        );
        info!(
            max_jumps = self.index.max_jumps,
            max_range_scanners = self.index.max_range_scanners,
            max_value_fetchers = self.index.max_value_fetchers,
            "Legacy index settings are accepted but have no effect"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"options":{"dir":"/var/lib/archive"},"logScan":{"rangeThreshold":10}}"#,
        )
        .unwrap();
        assert_eq!(config.options.dir, PathBuf::from("/var/lib/archive"));
        assert!(!config.options.in_memory);
        assert_eq!(config.log_scan.range_threshold, 10);
        assert_eq!(config.log_scan.processors, 6);
        assert_eq!(config.gc_interval_seconds, 10);
        assert_eq!(config.index.max_jumps, 1000);
        config.validate().unwrap();
    }

    #[test]
    fn default_data_directory() {
        let config = StoreConfig::default();
        assert_eq!(config.options.dir, PathBuf::from("/tmp/badger/data"));
        assert!(!config.options.in_memory);
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut config = StoreConfig::in_memory();
        config.index.max_value_fetchers = 0;
        assert!(matches!(
            config.validate(),
            Err(StoreError::InvalidConfig(msg)) if msg.contains("maxValueFetchers")
        ));
    }

    #[test]
    fn too_many_indexed_topics_rejected() {
        let mut config = StoreConfig::in_memory();
        config.log_scan.max_indexed_topics = 8;
        assert!(config.validate().is_err());
    }
}
