//! JSONL diagnostics log: append-only line-delimited JSON, one object per
//! diagnostic plus a closing summary record per audit.
//!
//! Each line is assembled in memory and written with a single `write_all` so
//! a log being tailed never shows interleaved partial lines.
//!
//! Fallback chain:
//! 1. Primary file path
//! 2. Fallback path
//! 3. stderr with `[IVA-JSONL]` prefix
//! 4. Silent discard (an audit must never fail because its log did)

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{IvaError, Result};
use crate::logger::diagnostics::{Diagnostic, DiagnosticKind, Severity};

/// One diagnostic as written to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Always [`RecordType::Diagnostic`].
    pub record: RecordType,
    /// Stable `IVA-4xxx` code of `kind`.
    pub code: String,
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Kind of the diagnostic.
    pub kind: DiagnosticKind,
    /// Export file the diagnostic was produced from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    /// Physical line in the export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Inventory path the diagnostic is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Human-readable detail.
    pub message: String,
}

/// Closing record of one audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Export file that was audited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    /// Hash of the effective configuration.
    pub config_hash: String,
    /// Data rows read after the header.
    pub rows_read: usize,
    /// Rows not placed in the forest.
    pub rows_skipped: usize,
    /// File nodes in the forest.
    pub total_files: usize,
    /// Directory nodes in the forest.
    pub total_directories: usize,
    /// Sum of file sizes in bytes.
    pub total_size_bytes: u64,
    /// Sum of file allocations in bytes.
    pub total_allocated_bytes: u64,
    /// Entries kept as roots because their parent never appeared.
    pub unattached_roots: usize,
    /// Directories outside tolerance.
    pub deviations: usize,
    /// Warning diagnostics.
    pub warnings: usize,
    /// Error diagnostics.
    pub errors: usize,
    /// Hex SHA-256 of the forest.
    pub forest_digest: String,
}

#[derive(Debug, Clone, Serialize)]
struct SummaryRecord<'a> {
    ts: String,
    record: RecordType,
    #[serde(flatten)]
    summary: &'a AuditSummary,
}

/// Discriminator written as the `record` field of every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// One finding.
    Diagnostic,
    /// Totals closing an audit.
    Summary,
}

impl DiagnosticRecord {
    /// Stamp a diagnostic with the current UTC time.
    pub fn from_diagnostic(diagnostic: &Diagnostic, export: Option<&Path>) -> Self {
        Self {
            ts: format_utc_now(),
            record: RecordType::Diagnostic,
            code: diagnostic.kind.code().to_string(),
            severity: diagnostic.severity,
            kind: diagnostic.kind,
            export: export.map(|p| p.display().to_string()),
            line: diagnostic.line,
            path: diagnostic.path.clone(),
            message: diagnostic.message.clone(),
        }
    }
}

/// Where log lines currently go.
enum Sink {
    Primary(BufWriter<File>),
    Fallback(BufWriter<File>),
    Stderr,
    Discard,
}

/// Log file locations.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Preferred log file, appended to.
    pub path: PathBuf,
    /// Used when `path` cannot be opened or written.
    pub fallback_path: Option<PathBuf>,
}

impl JsonlConfig {
    /// A primary path, with the fallback in the system temp dir.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path: Some(std::env::temp_dir().join("iva-diagnostics.jsonl")),
        }
    }
}

/// Append-only JSONL diagnostics writer. One audit always lands in one file.
pub struct DiagnosticWriter {
    config: JsonlConfig,
    sink: Sink,
}

impl DiagnosticWriter {
    /// Open the log file, falling down the chain when it cannot be opened.
    pub fn open(config: JsonlConfig) -> Self {
        let sink = match open_append(&config.path) {
            Ok(file) => Sink::Primary(file),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[IVA-JSONL] {e}");
                open_fallback(&config)
            }
        };
        Self { config, sink }
    }

    /// Write every diagnostic of a pass, in order.
    pub fn write_all<'a, I>(&mut self, diagnostics: I, export: Option<&Path>)
    where
        I: IntoIterator<Item = &'a Diagnostic>,
    {
        for diagnostic in diagnostics {
            self.write_diagnostic(diagnostic, export);
        }
    }

    /// Write one diagnostic line.
    pub fn write_diagnostic(&mut self, diagnostic: &Diagnostic, export: Option<&Path>) {
        let record = DiagnosticRecord::from_diagnostic(diagnostic, export);
        self.write_serialized(&record);
    }

    /// Write the closing `summary` line of an audit.
    pub fn write_summary(&mut self, summary: &AuditSummary) {
        let record = SummaryRecord {
            ts: format_utc_now(),
            record: RecordType::Summary,
            summary,
        };
        self.write_serialized(&record);
    }

    /// Flush buffered lines. A failed flush moves to the next sink.
    pub fn flush(&mut self) {
        if let Sink::Primary(w) | Sink::Fallback(w) = &mut self.sink
            && w.flush().is_err()
        {
            self.step_down();
        }
    }

    /// Name of the active sink: `normal`, `fallback`, `stderr` or `discard`.
    pub fn state(&self) -> &str {
        match self.sink {
            Sink::Primary(_) => "normal",
            Sink::Fallback(_) => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    fn write_serialized<T: Serialize>(&mut self, record: &T) {
        match serde_json::to_string(record) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[IVA-JSONL] serialize error: {e}");
            }
        }
    }

    fn write_line(&mut self, line: &str) {
        loop {
            let written = match &mut self.sink {
                Sink::Primary(w) | Sink::Fallback(w) => w.write_all(line.as_bytes()).is_ok(),
                Sink::Stderr => write!(io::stderr(), "[IVA-JSONL] {line}").is_ok(),
                Sink::Discard => true,
            };
            if written {
                return;
            }
            self.step_down();
        }
    }

    /// Replace the failing sink with the next one in the chain.
    fn step_down(&mut self) {
        self.sink = match self.sink {
            Sink::Primary(_) => open_fallback(&self.config),
            Sink::Fallback(_) => {
                let _ = writeln!(io::stderr(), "[IVA-JSONL] fallback write failed, using stderr");
                Sink::Stderr
            }
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }
}

impl Drop for DiagnosticWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

fn open_fallback(config: &JsonlConfig) -> Sink {
    let Some(fallback) = &config.fallback_path else {
        let _ = writeln!(io::stderr(), "[IVA-JSONL] no fallback configured, using stderr");
        return Sink::Stderr;
    };
    match open_append(fallback) {
        Ok(file) => {
            let _ = writeln!(io::stderr(), "[IVA-JSONL] using fallback {}", fallback.display());
            Sink::Fallback(file)
        }
        Err(e) => {
            let _ = writeln!(io::stderr(), "[IVA-JSONL] {e}, using stderr");
            Sink::Stderr
        }
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| IvaError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| IvaError::io(path, source))?;
    Ok(BufWriter::new(file))
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
