//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(clippy::struct_excessive_bools)]

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{IvaError, Result};

/// Full auditor configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// `[fields]`
    pub fields: FieldsConfig,
    /// `[input]`
    pub input: InputConfig,
    /// `[reconcile]`
    pub reconcile: ReconcileConfig,
    /// `[structure]`
    pub structure: StructureConfig,
    /// `[paths]`
    pub paths: PathsConfig,
}

/// Which optional columns are retained on each node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldsConfig {
    /// Size, in bytes.
    pub size: bool,
    /// Allocated (on-disk) size, in bytes.
    pub allocated: bool,
    /// Last Modified timestamp.
    pub last_modified: bool,
    /// Last Accessed timestamp.
    pub last_accessed: bool,
    /// Creation Date timestamp.
    pub creation_date: bool,
    /// Owner account.
    pub owner: bool,
    /// Effective permission string, validated against the grammar.
    pub permissions: bool,
    /// Inherited Permissions string.
    pub inherited_permissions: bool,
    /// Own Permissions string.
    pub own_permissions: bool,
    /// Raw Type column (extension label) kept on the node.
    pub type_label: bool,
    /// Attribute letters.
    pub attributes: bool,
}

/// Shape of the export the record source hands to the decoder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputConfig {
    /// Non-data lines at the top of the export (title, drive, scan date...).
    pub preamble_lines: usize,
    /// Field separator of each line.
    pub delimiter: char,
    /// Type-column literal marking a directory row.
    pub directory_type: String,
    /// Type-column literal of the scanner's own aggregate placeholder rows.
    pub rollup_type: String,
    /// Path suffix of the scanner's wildcard aggregate rows.
    pub rollup_path_suffix: String,
    /// Separator assumed until one is detected from the data.
    pub default_separator: char,
    /// `chrono` formats tried in order for the timestamp columns.
    pub timestamp_formats: Vec<String>,
}

/// Rollup and discrepancy policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Allowed relative deviation, e.g. 0.01 for 1%.
    pub tolerance: f64,
    /// Roll up the Size column. Requires `fields.size`.
    pub rollup_size: bool,
    /// Roll up the Allocated column. Requires `fields.allocated`.
    pub rollup_allocated: bool,
    /// Severity when the rollup is smaller than the reported value.
    pub under_reported: DeviationSeverity,
    /// Severity when the rollup is larger than the reported value.
    pub over_reported: DeviationSeverity,
}

/// Structural conflict policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct StructureConfig {
    /// What happens when two records claim one slot.
    pub duplicate_policy: DuplicatePolicy,
}

/// Filesystem paths used by iva.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Where the config was (or would be) loaded from.
    pub config_file: PathBuf,
    /// Optional JSONL diagnostics log; `None` disables it.
    pub jsonl_log: Option<PathBuf>,
}

/// How a reconciliation deviation counts toward the exit status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviationSeverity {
    /// Reported, exit status unaffected.
    #[default]
    Warning,
    /// Reported and fails the audit.
    Error,
}

/// Resolution when two records claim the same slot in the tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Newer record's fields replace the existing node's.
    #[default]
    LastWins,
    /// Existing node is kept untouched.
    FirstWins,
    /// Existing node is kept and the duplicate is reported as an error.
    Reject,
}

impl FromStr for DeviationSeverity {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("expected `warning` or `error`, got `{other}`")),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "last_wins" | "last-wins" => Ok(Self::LastWins),
            "first_wins" | "first-wins" => Ok(Self::FirstWins),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "expected `last_wins`, `first_wins` or `reject`, got `{other}`"
            )),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LastWins => "last_wins",
            Self::FirstWins => "first_wins",
            Self::Reject => "reject",
        })
    }
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            size: true,
            allocated: true,
            last_modified: true,
            last_accessed: true,
            creation_date: true,
            owner: true,
            permissions: true,
            inherited_permissions: true,
            own_permissions: true,
            type_label: true,
            attributes: true,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            preamble_lines: 4,
            delimiter: ',',
            directory_type: "Folder".to_string(),
            rollup_type: "Multiple file types".to_string(),
            rollup_path_suffix: "*.*".to_string(),
            default_separator: '\\',
            timestamp_formats: vec![
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M".to_string(),
                "%m/%d/%Y %I:%M:%S %p".to_string(),
                "%m/%d/%Y %I:%M %p".to_string(),
                "%m/%d/%Y %H:%M:%S".to_string(),
                "%m/%d/%Y %H:%M".to_string(),
                "%d.%m.%Y %H:%M:%S".to_string(),
                "%d.%m.%Y %H:%M".to_string(),
            ],
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            rollup_size: true,
            rollup_allocated: true,
            under_reported: DeviationSeverity::Warning,
            over_reported: DeviationSeverity::Warning,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[IVA-CONFIG] WARNING: HOME not set, falling back to /tmp for config path");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("iva").join("config.toml"),
            jsonl_log: None,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| IvaError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(IvaError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for audit summaries.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // reconcile
        if let Some(raw) = lookup("IVA_RECONCILE_TOLERANCE") {
            self.reconcile.tolerance = parse_env("IVA_RECONCILE_TOLERANCE", &raw)?;
        }
        if let Some(raw) = lookup("IVA_RECONCILE_ROLLUP_SIZE") {
            self.reconcile.rollup_size = parse_env("IVA_RECONCILE_ROLLUP_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("IVA_RECONCILE_ROLLUP_ALLOCATED") {
            self.reconcile.rollup_allocated = parse_env("IVA_RECONCILE_ROLLUP_ALLOCATED", &raw)?;
        }
        if let Some(raw) = lookup("IVA_RECONCILE_UNDER_REPORTED") {
            self.reconcile.under_reported = parse_env("IVA_RECONCILE_UNDER_REPORTED", &raw)?;
        }
        if let Some(raw) = lookup("IVA_RECONCILE_OVER_REPORTED") {
            self.reconcile.over_reported = parse_env("IVA_RECONCILE_OVER_REPORTED", &raw)?;
        }

        // input
        if let Some(raw) = lookup("IVA_INPUT_PREAMBLE_LINES") {
            self.input.preamble_lines = parse_env("IVA_INPUT_PREAMBLE_LINES", &raw)?;
        }
        if let Some(raw) = lookup("IVA_INPUT_DELIMITER") {
            self.input.delimiter = parse_env("IVA_INPUT_DELIMITER", &raw)?;
        }

        // structure
        if let Some(raw) = lookup("IVA_STRUCTURE_DUPLICATE_POLICY") {
            self.structure.duplicate_policy = parse_env("IVA_STRUCTURE_DUPLICATE_POLICY", &raw)?;
        }

        // paths
        if let Some(raw) = lookup("IVA_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let tolerance = self.reconcile.tolerance;
        if !tolerance.is_finite() || !(0.0..=1.0).contains(&tolerance) {
            return Err(IvaError::InvalidConfig {
                details: format!("reconcile.tolerance must be in [0, 1], got {tolerance}"),
            });
        }

        if self.reconcile.rollup_size && !self.fields.size {
            return Err(IvaError::InvalidConfig {
                details: "reconcile.rollup_size requires fields.size = true".to_string(),
            });
        }
        if self.reconcile.rollup_allocated && !self.fields.allocated {
            return Err(IvaError::InvalidConfig {
                details: "reconcile.rollup_allocated requires fields.allocated = true".to_string(),
            });
        }

        if self.input.delimiter == '"' || self.input.delimiter.is_ascii_alphanumeric() {
            return Err(IvaError::InvalidConfig {
                details: format!(
                    "input.delimiter {:?} cannot be a quote or alphanumeric character",
                    self.input.delimiter
                ),
            });
        }
        if !self.input.delimiter.is_ascii() {
            return Err(IvaError::InvalidConfig {
                details: format!("input.delimiter {:?} must be ASCII", self.input.delimiter),
            });
        }

        if !matches!(self.input.default_separator, '\\' | '/') {
            return Err(IvaError::InvalidConfig {
                details: format!(
                    "input.default_separator must be '\\\\' or '/', got {:?}",
                    self.input.default_separator
                ),
            });
        }

        if self.input.directory_type.trim().is_empty() {
            return Err(IvaError::InvalidConfig {
                details: "input.directory_type must not be empty".to_string(),
            });
        }

        if self.input.timestamp_formats.is_empty()
            && (self.fields.last_modified || self.fields.last_accessed || self.fields.creation_date)
        {
            return Err(IvaError::InvalidConfig {
                details: "input.timestamp_formats must list at least one format when timestamp fields are retained"
                    .to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| IvaError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

#[cfg(test)]
mod tests {
    use super::{Config, DeviationSeverity, DuplicatePolicy, IvaError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.reconcile.tolerance - 0.01).abs() < f64::EPSILON);
        assert_eq!(cfg.structure.duplicate_policy, DuplicatePolicy::LastWins);
        assert_eq!(cfg.reconcile.under_reported, DeviationSeverity::Warning);
        assert_eq!(cfg.reconcile.over_reported, DeviationSeverity::Warning);
    }

    #[test]
    fn tolerance_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.reconcile.tolerance = 1.5;
        let err = cfg.validate().expect_err("expected tolerance error");
        assert!(err.to_string().contains("tolerance"));

        cfg.reconcile.tolerance = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rollup_size_requires_size_field() {
        let mut cfg = Config::default();
        cfg.fields.size = false;
        let err = cfg.validate().expect_err("expected dependency error");
        match err {
            IvaError::InvalidConfig { details } => assert!(details.contains("fields.size")),
            other => panic!("unexpected error: {other}"),
        }

        cfg.reconcile.rollup_size = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn quote_delimiter_rejected() {
        let mut cfg = Config::default();
        cfg.input.delimiter = '"';
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let hash_before = cfg.stable_hash().expect("hash should compute");
        let mut modified = Config::default();
        modified.reconcile.tolerance = 0.05;
        let hash_after = modified.stable_hash().expect("hash should compute");
        assert_ne!(hash_before, hash_after);
        assert_eq!(hash_before, cfg.stable_hash().expect("hash"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("IVA_RECONCILE_TOLERANCE", "0.05"),
            ("IVA_RECONCILE_UNDER_REPORTED", "error"),
            ("IVA_INPUT_PREAMBLE_LINES", "0"),
            ("IVA_INPUT_DELIMITER", ";"),
            ("IVA_STRUCTURE_DUPLICATE_POLICY", "first_wins"),
            ("IVA_PATHS_JSONL_LOG", "/tmp/iva/diag.jsonl"),
        ]);

        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");

        assert!((cfg.reconcile.tolerance - 0.05).abs() < f64::EPSILON);
        assert_eq!(cfg.reconcile.under_reported, DeviationSeverity::Error);
        assert_eq!(cfg.reconcile.over_reported, DeviationSeverity::Warning);
        assert_eq!(cfg.input.preamble_lines, 0);
        assert_eq!(cfg.input.delimiter, ';');
        assert_eq!(cfg.structure.duplicate_policy, DuplicatePolicy::FirstWins);
        assert_eq!(
            cfg.paths.jsonl_log,
            Some(PathBuf::from("/tmp/iva/diag.jsonl"))
        );
    }

    #[test]
    fn env_invalid_value_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("IVA_RECONCILE_OVER_REPORTED", "fatal")]);

        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid severity should fail");
        match err {
            IvaError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("IVA_RECONCILE_OVER_REPORTED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn toml_sections_parse_with_defaults_for_missing_keys() {
        let raw = r#"
            [reconcile]
            tolerance = 0.02
            over_reported = "error"

            [structure]
            duplicate_policy = "reject"

            [fields]
            owner = false
        "#;
        let cfg: Config = toml::from_str(raw).expect("parse");
        assert!((cfg.reconcile.tolerance - 0.02).abs() < f64::EPSILON);
        assert_eq!(cfg.reconcile.over_reported, DeviationSeverity::Error);
        assert_eq!(cfg.structure.duplicate_policy, DuplicatePolicy::Reject);
        assert!(!cfg.fields.owner);
        assert!(cfg.fields.size);
        assert_eq!(cfg.input.directory_type, "Folder");
    }

    #[test]
    fn toml_rendering_round_trips() {
        let cfg = Config::default();
        let rendered = cfg.to_toml_string().expect("render");
        let parsed: Config = toml::from_str(&rendered).expect("reparse");
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/iva/config.toml")));
        assert!(matches!(result, Err(IvaError::MissingConfig { .. })));
    }
}
