//! Structured warnings and errors produced by the audit core.
//!
//! The core only produces diagnostics; rendering them (console, JSONL) is the
//! job of the reporter. Every expected malformed-data condition ends up here
//! instead of as an `Err`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected condition worth noting.
    Info,
    /// Data was degraded or looks suspicious.
    Warning,
    /// Counts toward a failing exit status.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// What went wrong, grouped by taxonomy: schema (41xx), row (42xx),
/// structure (43xx), reconciliation (45xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Header has no path column or no Type column.
    MissingRequiredColumn,
    /// Header names a column outside the recognized set.
    UnknownColumn,
    /// Both `Full Path` and `Path` are present.
    ConflictingPathColumns,
    /// A retained field has no column in this export.
    UnavailableField,
    /// Row with an empty path.
    EmptyPath,
    /// Row intentionally not placed.
    RowSkipped,
    /// Size or Allocated did not parse.
    InvalidSize,
    /// Timestamp matched none of the configured formats.
    InvalidTimestamp,
    /// Permission string outside the grammar.
    InvalidPermissions,
    /// Scanner could not read the entry's security info.
    UnreadableEntry,
    /// Account shown as a broken-trust placeholder.
    TrustFailure,
    /// Same directory path twice.
    DuplicateDirectory,
    /// Same file name twice under one parent.
    DuplicateFile,
    /// Same root path twice.
    DuplicateRoot,
    /// Parent directory never appeared.
    UnresolvedParent,
    /// Path separator inferred from the data.
    SeparatorDetected,
    /// Rolled-up size outside tolerance.
    SizeDeviation,
    /// Rolled-up allocation outside tolerance.
    AllocationDeviation,
    /// Directory not compared for lack of a reported value.
    RollupSkipped,
}

impl DiagnosticKind {
    /// Stable machine-parseable diagnostic code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingRequiredColumn => "IVA-4101",
            Self::UnknownColumn => "IVA-4102",
            Self::ConflictingPathColumns => "IVA-4103",
            Self::UnavailableField => "IVA-4104",
            Self::EmptyPath => "IVA-4201",
            Self::RowSkipped => "IVA-4202",
            Self::InvalidSize => "IVA-4203",
            Self::InvalidTimestamp => "IVA-4204",
            Self::InvalidPermissions => "IVA-4205",
            Self::UnreadableEntry => "IVA-4206",
            Self::TrustFailure => "IVA-4207",
            Self::DuplicateDirectory => "IVA-4301",
            Self::DuplicateFile => "IVA-4302",
            Self::DuplicateRoot => "IVA-4303",
            Self::UnresolvedParent => "IVA-4304",
            Self::SeparatorDetected => "IVA-4305",
            Self::SizeDeviation => "IVA-4501",
            Self::AllocationDeviation => "IVA-4502",
            Self::RollupSkipped => "IVA-4503",
        }
    }

    /// Whether this kind describes the tree's shape rather than a single row.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            Self::DuplicateDirectory
                | Self::DuplicateFile
                | Self::DuplicateRoot
                | Self::UnresolvedParent
        )
    }
}

/// One reported problem or note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// How much it matters.
    pub severity: Severity,
    /// What happened; fixes the code.
    pub kind: DiagnosticKind,
    /// 1-based line in the export, when the problem belongs to one row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Inventory path involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Human-readable detail.
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic with no line or path attached.
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            line: None,
            path: None,
            message: message.into(),
        }
    }

    /// Attach the export line.
    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach the inventory path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.severity)?;
        if let Some(line) = self.line {
            write!(f, " line {line}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Ordered collection of diagnostics from one build or reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Append an info-level diagnostic.
    pub fn info(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Info, kind, message));
    }

    /// Append a warning.
    pub fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Warning, kind, message));
    }

    /// Append an error.
    pub fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Error, kind, message));
    }

    /// Append another pass's diagnostics after these.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Diagnostics in emission order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostics at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Error-severity diagnostics.
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    /// Warnings.
    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Whether any error was reported.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    /// All diagnostics of one kind, in emission order.
    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<&Diagnostic> {
        self.entries.iter().filter(|d| d.kind == kind).collect()
    }

    /// Take the diagnostics out.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
