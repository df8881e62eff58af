//! Gate configuration.
//!
//! Three layers, later wins: built-in defaults, an optional TOML file
//! (explicit path or `covgate.toml` under the platform config directory),
//! and `COVGATE_*` environment variables. Per-run options override all of it
//! for the fields they carry.

use crate::types::{TestRunOptions, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BASE_BRANCH: &str = "main";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

fn default_source_extensions() -> Vec<String> {
    [".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".py"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_base_branch() -> String {
    DEFAULT_BASE_BRANCH.to_string()
}

/// Gate settings. Every field has a usable default, so an absent config file
/// means "gate at 100% against main, changed-file enforcement off".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub coverage_thresholds: Thresholds,
    pub changed_file_coverage_thresholds: Thresholds,
    pub enforce_changed_file_coverage: bool,
    pub source_extensions: Vec<String>,
    pub base_branch: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            coverage_thresholds: Thresholds::default(),
            changed_file_coverage_thresholds: Thresholds::default(),
            enforce_changed_file_coverage: false,
            source_extensions: default_source_extensions(),
            base_branch: default_base_branch(),
        }
    }
}

impl GateConfig {
    /// Load configuration: file layer, then environment overrides.
    ///
    /// An explicit `path` must be readable; the default location is allowed
    /// to be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("covgate.toml"))
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `COVGATE_*` overrides through an injectable lookup, so tests
    /// never touch the process environment.
    pub fn apply_env_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let threshold = |key: &str, slot: &mut f64| {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<f64>() {
                    Ok(value) if value.is_finite() => *slot = value,
                    _ => warn!("ignoring {}: {:?} is not a finite number", key, raw),
                }
            }
        };
        threshold("COVGATE_MIN_LINES", &mut self.coverage_thresholds.lines);
        threshold(
            "COVGATE_MIN_STATEMENTS",
            &mut self.coverage_thresholds.statements,
        );
        threshold(
            "COVGATE_MIN_FUNCTIONS",
            &mut self.coverage_thresholds.functions,
        );
        threshold(
            "COVGATE_MIN_BRANCHES",
            &mut self.coverage_thresholds.branches,
        );
        threshold(
            "COVGATE_CHANGED_MIN_LINES",
            &mut self.changed_file_coverage_thresholds.lines,
        );
        threshold(
            "COVGATE_CHANGED_MIN_STATEMENTS",
            &mut self.changed_file_coverage_thresholds.statements,
        );
        threshold(
            "COVGATE_CHANGED_MIN_FUNCTIONS",
            &mut self.changed_file_coverage_thresholds.functions,
        );
        threshold(
            "COVGATE_CHANGED_MIN_BRANCHES",
            &mut self.changed_file_coverage_thresholds.branches,
        );

        if let Some(raw) = lookup("COVGATE_ENFORCE_CHANGED") {
            self.enforce_changed_file_coverage = parse_bool(&raw);
        }
        if let Some(raw) = lookup("COVGATE_BASE_BRANCH") {
            let branch = raw.trim();
            if !branch.is_empty() {
                self.base_branch = branch.to_string();
            }
        }
        if let Some(raw) = lookup("COVGATE_SOURCE_EXTENSIONS") {
            let extensions: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
            if !extensions.is_empty() {
                self.source_extensions = extensions;
            }
        }
    }

    /// Aggregate thresholds for a run, preferring the per-run override.
    pub fn thresholds_for(&self, options: &TestRunOptions) -> Thresholds {
        options.coverage_thresholds.unwrap_or(self.coverage_thresholds)
    }

    /// Changed-file thresholds for a run, preferring the per-run override.
    pub fn changed_thresholds_for(&self, options: &TestRunOptions) -> Thresholds {
        options
            .changed_file_coverage_thresholds
            .unwrap_or(self.changed_file_coverage_thresholds)
    }

    /// Whether the changed-file gate is enforced for this run.
    pub fn enforce_changed_for(&self, options: &TestRunOptions) -> bool {
        options
            .enforce_changed_file_coverage
            .unwrap_or(self.enforce_changed_file_coverage)
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_gate_at_100_without_enforcement() {
        let config = GateConfig::default();
        assert_eq!(config.coverage_thresholds, Thresholds::uniform(100.0));
        assert!(!config.enforce_changed_file_coverage);
        assert_eq!(config.base_branch, "main");
        assert!(config.source_extensions.contains(&".py".to_string()));
        assert!(!config.source_extensions.contains(&".md".to_string()));
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("covgate.toml");
        fs::write(
            &path,
            r#"
base_branch = "develop"
enforce_changed_file_coverage = true

[coverage_thresholds]
lines = 85
"#,
        )
        .unwrap();

        let config = GateConfig::from_file(&path).unwrap();
        assert_eq!(config.base_branch, "develop");
        assert!(config.enforce_changed_file_coverage);
        assert_eq!(config.coverage_thresholds.lines, 85.0);
        // Unset threshold dimensions keep their 100 default.
        assert_eq!(config.coverage_thresholds.branches, 100.0);
        assert_eq!(config.changed_file_coverage_thresholds.lines, 100.0);
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = GateConfig::from_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_broken_toml_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("covgate.toml");
        fs::write(&path, "base_branch = [unclosed").unwrap();
        let err = GateConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_thresholds_and_flags() {
        let mut config = GateConfig::default();
        config.apply_env_overrides_with(env(&[
            ("COVGATE_MIN_LINES", "90"),
            ("COVGATE_CHANGED_MIN_BRANCHES", "75.5"),
            ("COVGATE_ENFORCE_CHANGED", "yes"),
            ("COVGATE_BASE_BRANCH", "trunk"),
        ]));

        assert_eq!(config.coverage_thresholds.lines, 90.0);
        assert_eq!(config.coverage_thresholds.statements, 100.0);
        assert_eq!(config.changed_file_coverage_thresholds.branches, 75.5);
        assert!(config.enforce_changed_file_coverage);
        assert_eq!(config.base_branch, "trunk");
    }

    #[test]
    fn test_env_invalid_number_is_ignored() {
        let mut config = GateConfig::default();
        config.apply_env_overrides_with(env(&[
            ("COVGATE_MIN_LINES", "ninety"),
            ("COVGATE_MIN_BRANCHES", "NaN"),
        ]));
        assert_eq!(config.coverage_thresholds.lines, 100.0);
        assert_eq!(config.coverage_thresholds.branches, 100.0);
    }

    #[test]
    fn test_env_extension_list_parses_comma_separated() {
        let mut config = GateConfig::default();
        config.apply_env_overrides_with(env(&[(
            "COVGATE_SOURCE_EXTENSIONS",
            ".js, .ts , .py,,",
        )]));
        assert_eq!(config.source_extensions, vec![".js", ".ts", ".py"]);
    }

    #[test]
    fn test_env_false_disables_enforcement() {
        let mut config = GateConfig {
            enforce_changed_file_coverage: true,
            ..GateConfig::default()
        };
        config.apply_env_overrides_with(env(&[("COVGATE_ENFORCE_CHANGED", "0")]));
        assert!(!config.enforce_changed_file_coverage);
    }

    #[test]
    fn test_run_options_override_config() {
        let config = GateConfig {
            enforce_changed_file_coverage: false,
            ..GateConfig::default()
        };
        let options = TestRunOptions {
            coverage_thresholds: Some(Thresholds::uniform(80.0)),
            enforce_changed_file_coverage: Some(true),
            ..Default::default()
        };

        assert_eq!(config.thresholds_for(&options), Thresholds::uniform(80.0));
        assert!(config.enforce_changed_for(&options));
        // Absent per-run fields fall back to config.
        assert_eq!(
            config.changed_thresholds_for(&TestRunOptions::default()),
            Thresholds::default()
        );
        assert!(!config.enforce_changed_for(&TestRunOptions::default()));
    }
}
