//! IVA-prefixed error types with structured error codes.
//!
//! Only conditions that stop an audit before it starts live here. Malformed
//! rows, bad permission strings and size deviations are reported through
//! [`crate::logger::diagnostics`] and never surface as `Err`.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, IvaError>;

/// Top-level error type for the inventory auditor.
#[derive(Debug, Error)]
pub enum IvaError {
    /// A value failed validation.
    #[error("[IVA-1001] invalid configuration: {details}")]
    InvalidConfig {
        /// Which key and why.
        details: String,
    },

    /// An explicitly requested config file does not exist.
    #[error("[IVA-1002] missing configuration file: {path}")]
    MissingConfig {
        /// The requested file.
        path: PathBuf,
    },

    /// The config file or an env override could not be parsed.
    #[error("[IVA-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        /// File or env var being parsed.
        context: &'static str,
        /// Parser message.
        details: String,
    },

    /// The export file does not exist.
    #[error("[IVA-2001] inventory export not found: {path}")]
    MissingInput {
        /// The export path given.
        path: PathBuf,
    },

    /// Nothing is left after the preamble.
    #[error("[IVA-2002] inventory export {path} has no header row after {preamble_lines} preamble lines")]
    EmptyInput {
        /// The export path given.
        path: PathBuf,
        /// Lines skipped before the header was expected.
        preamble_lines: usize,
    },

    /// JSON or TOML encoding failed.
    #[error("[IVA-2101] serialization failure in {context}: {details}")]
    Serialization {
        /// What was being encoded.
        context: &'static str,
        /// Encoder message.
        details: String,
    },

    /// Any other filesystem failure.
    #[error("[IVA-3002] IO failure at {path}: {source}")]
    Io {
        /// Path the operation touched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl IvaError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "IVA-1001",
            Self::MissingConfig { .. } => "IVA-1002",
            Self::ConfigParse { .. } => "IVA-1003",
            Self::MissingInput { .. } => "IVA-2001",
            Self::EmptyInput { .. } => "IVA-2002",
            Self::Serialization { .. } => "IVA-2101",
            Self::Io { .. } => "IVA-3002",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for IvaError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for IvaError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for IvaError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
