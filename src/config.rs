//! Publisher configuration, read from a TOML file and overridden from the
//! command line.
//!
//! ```toml
//! use_threshold = true
//! use_coverage_history = true
//! max_history = 50
//!
//! [thresholds]
//! statement = { min = 30, max = 90 }
//! branch = { min = 25, max = 80 }
//!
//! [[rules]]
//! kind = "statement-per-source-file"
//! min_percentage = 50.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CovError, Result};
use crate::health::HealthThresholds;
use crate::rules::{Rule, RuleConfig};

pub const DEFAULT_MAX_HISTORY: usize = 1_000_000;
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fail the build when a root percentage drops below its threshold minimum.
    pub use_threshold: bool,
    /// Fail the build when statement or branch coverage drops from the
    /// previous comparable build.
    pub use_coverage_history: bool,
    /// How many earlier builds to inspect when looking for history.
    pub max_history: Option<usize>,
    pub thresholds: Option<HealthThresholds>,
    /// When false, no health report is produced.
    pub health: bool,
    pub rules: Vec<RuleConfig>,
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_threshold: false,
            use_coverage_history: false,
            max_history: Some(DEFAULT_MAX_HISTORY),
            thresholds: Some(HealthThresholds::default()),
            health: true,
            rules: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Command-line values that take priority over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub use_threshold: bool,
    pub use_coverage_history: bool,
    pub max_history: Option<usize>,
    pub min_file_statement: Option<f64>,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CovError::Config(e.to_string()))
    }

    /// Load from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config = Self::from_toml(&content)?;
                log::debug!("loaded configuration from {}", p.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        self.use_threshold |= overrides.use_threshold;
        self.use_coverage_history |= overrides.use_coverage_history;
        if overrides.max_history.is_some() {
            self.max_history = overrides.max_history;
        }
        if let Some(min_percentage) = overrides.min_file_statement {
            self.rules
                .retain(|r| !matches!(r, RuleConfig::StatementPerSourceFile { .. }));
            self.rules
                .push(RuleConfig::StatementPerSourceFile { min_percentage });
        }
    }

    /// Thresholds used for scoring, `None` when health reporting is off.
    pub fn health_thresholds(&self) -> Option<&HealthThresholds> {
        if self.health {
            self.thresholds.as_ref()
        } else {
            None
        }
    }

    /// Thresholds used by the minimum gate.
    pub fn gate_thresholds(&self) -> HealthThresholds {
        self.thresholds.unwrap_or_default()
    }

    pub fn build_rules(&self) -> Vec<Box<dyn Rule>> {
        self.rules.iter().map(RuleConfig::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Threshold;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.use_threshold);
        assert!(!config.use_coverage_history);
        assert_eq!(config.max_history, Some(1_000_000));
        assert_eq!(config.cache_capacity, 16);
        assert_eq!(
            config.health_thresholds().unwrap().branch,
            Threshold::new(0, 70)
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml(
            r#"
            use_threshold = true
            max_history = 5
            health = false

            [thresholds]
            statement = { min = 30, max = 90 }

            [[rules]]
            kind = "statement-per-source-file"
            min_percentage = 50.0
            "#,
        )
        .unwrap();
        assert!(config.use_threshold);
        assert_eq!(config.max_history, Some(5));
        assert!(config.health_thresholds().is_none());
        assert_eq!(config.gate_thresholds().statement, Threshold::new(30, 90));
        assert_eq!(config.build_rules().len(), 1);
    }

    #[test]
    fn test_bad_file() {
        assert!(matches!(
            Config::from_toml("use_threshold = \"maybe\""),
            Err(CovError::Config(_))
        ));
    }

    #[test]
    fn test_out_of_range_thresholds_load() {
        let config =
            Config::from_toml("[thresholds]\nstatement = { min = 0, max = 5000000000 }\n").unwrap();
        let mut thresholds = config.gate_thresholds();
        assert_eq!(thresholds.statement.max, i32::MAX);
        thresholds.ensure_valid();
        assert_eq!(thresholds.statement, Threshold::new(0, 100));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::from_toml(
            r#"
            [[rules]]
            kind = "statement-per-source-file"
            min_percentage = 10.0
            "#,
        )
        .unwrap();
        config.apply(&Overrides {
            use_threshold: false,
            use_coverage_history: true,
            max_history: Some(3),
            min_file_statement: Some(60.0),
        });
        assert!(config.use_coverage_history);
        assert_eq!(config.max_history, Some(3));
        assert_eq!(
            config.rules,
            vec![RuleConfig::StatementPerSourceFile {
                min_percentage: 60.0
            }]
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covtrend.toml");
        std::fs::write(&path, "use_coverage_history = true\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert!(config.use_coverage_history);
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }
}
