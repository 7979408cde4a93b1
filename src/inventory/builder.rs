//! Tree builder: places decoded records into a [`Forest`] in one pass.
//!
//! Rows may arrive in any order. A node whose parent directory has not been
//! seen yet waits in a pending registry keyed by the parent path, and is
//! attached the moment that directory's own row is registered. Entries still
//! waiting when input ends are kept as unattached roots.
//!
//! Nothing in here returns an error: every structural or per-row problem is
//! recorded as a diagnostic and the builder always produces a best-effort
//! forest.

use std::collections::BTreeMap;
use std::mem;

use serde::Serialize;

use crate::core::config::{Config, DuplicatePolicy};
use crate::inventory::fields::{self, FieldPopulator, NodeFields};
use crate::inventory::paths;
use crate::inventory::record::{DecodedRecord, HeaderMap};
use crate::inventory::source::RawRow;
use crate::inventory::tree::{Forest, Node, NodeId};
use crate::logger::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Counters describing one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Data rows seen after the header.
    pub rows_read: usize,
    /// Rows that produced or updated a node.
    pub rows_placed: usize,
    /// Rows not placed for any reason.
    pub rows_skipped: usize,
    /// Rows whose path column was empty.
    pub empty_path_rows: usize,
    /// Roll-up rows (`rollup_type`) that were skipped.
    pub rollup_rows: usize,
    /// Rows skipped because the header lacks a required column.
    pub undecodable_rows: usize,
    /// Duplicate directories, files, or roots encountered.
    pub duplicates: usize,
}

/// Result of [`build_tree`] / [`TreeBuilder::finish`].
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The reconstructed forest.
    pub forest: Forest,
    /// Everything noticed while building, in row order.
    pub diagnostics: Diagnostics,
    /// Row counters.
    pub stats: BuildStats,
}

/// Children waiting for a parent directory row, keyed by name.
#[derive(Debug, Default)]
struct PendingChildren {
    directories: BTreeMap<String, NodeId>,
    files: BTreeMap<String, NodeId>,
}

impl PendingChildren {
    fn slot(&mut self, directory: bool) -> &mut BTreeMap<String, NodeId> {
        if directory {
            &mut self.directories
        } else {
            &mut self.files
        }
    }

    fn get(&self, name: &str, directory: bool) -> Option<NodeId> {
        let map = if directory {
            &self.directories
        } else {
            &self.files
        };
        map.get(name).copied()
    }
}

/// Where an incoming record would land.
enum Placement {
    Root,
    Under(NodeId),
    Pending,
}

type ProgressFn<'a> = Box<dyn FnMut(&BuildStats) + 'a>;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Incremental tree builder. Feed the header row first, then data rows.
pub struct TreeBuilder<'a> {
    config: &'a Config,
    populator: FieldPopulator<'a>,
    header: Option<HeaderMap>,
    forest: Forest,
    pending: BTreeMap<String, PendingChildren>,
    diagnostics: Diagnostics,
    stats: BuildStats,
    progress: Option<(usize, ProgressFn<'a>)>,
}

impl<'a> TreeBuilder<'a> {
    /// Empty builder waiting for the header row.
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            populator: FieldPopulator::new(&config.fields, &config.input),
            header: None,
            forest: Forest::new(),
            pending: BTreeMap::new(),
            diagnostics: Diagnostics::new(),
            stats: BuildStats::default(),
            progress: None,
        }
    }

    /// Call `callback` after every `every` data rows.
    #[must_use]
    pub fn with_progress<F>(mut self, every: usize, callback: F) -> Self
    where
        F: FnMut(&BuildStats) + 'a,
    {
        self.progress = Some((every.max(1), Box::new(callback)));
        self
    }

    /// Counters so far.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Consume one row. The first row is taken as the header.
    pub fn push_row(&mut self, row: &RawRow) {
        let Some(header) = &self.header else {
            let header = HeaderMap::from_header(row, &mut self.diagnostics);
            fields::report_unavailable(&header, &self.config.fields, &mut self.diagnostics);
            self.header = Some(header);
            return;
        };

        self.stats.rows_read += 1;
        match header.decode_row(row) {
            Some(record) => self.place(&record),
            None => {
                self.stats.undecodable_rows += 1;
                self.stats.rows_skipped += 1;
            }
        }

        if let Some((every, callback)) = &mut self.progress
            && self.stats.rows_read % *every == 0
        {
            callback(&self.stats);
        }
    }

    /// Resolve everything still pending and hand back the forest.
    pub fn finish(mut self) -> BuildOutcome {
        for (parent_path, waiting) in mem::take(&mut self.pending) {
            let severity = if waiting.files.is_empty() {
                Severity::Info
            } else {
                Severity::Warning
            };
            let count = waiting.directories.len() + waiting.files.len();
            self.diagnostics.push(
                Diagnostic::new(
                    severity,
                    DiagnosticKind::UnresolvedParent,
                    format!(
                        "parent {parent_path:?} never appeared; {count} entr{} kept as unattached root{}",
                        if count == 1 { "y" } else { "ies" },
                        if count == 1 { "" } else { "s" },
                    ),
                )
                .with_path(parent_path.clone()),
            );
            let ids = waiting
                .directories
                .into_values()
                .chain(waiting.files.into_values())
                .collect();
            self.forest.add_unattached(parent_path, ids);
        }

        if self.stats.empty_path_rows > 1 {
            self.diagnostics.info(
                DiagnosticKind::EmptyPath,
                format!("{} rows with an empty path skipped in total", self.stats.empty_path_rows),
            );
        }
        if self.stats.undecodable_rows > 0 {
            self.diagnostics.error(
                DiagnosticKind::RowSkipped,
                format!(
                    "{} rows skipped because the header lacks a required column",
                    self.stats.undecodable_rows
                ),
            );
        }

        BuildOutcome {
            forest: self.forest,
            diagnostics: self.diagnostics,
            stats: self.stats,
        }
    }

    fn place(&mut self, record: &DecodedRecord) {
        let raw_path = record.path.trim();
        if raw_path.is_empty() {
            self.stats.empty_path_rows += 1;
            self.stats.rows_skipped += 1;
            if self.stats.empty_path_rows == 1 {
                self.diagnostics.push(
                    Diagnostic::new(
                        Severity::Warning,
                        DiagnosticKind::EmptyPath,
                        "row has an empty path and was skipped; further occurrences are only counted",
                    )
                    .at_line(record.line),
                );
            }
            return;
        }

        if self.is_rollup_marker(record, raw_path) {
            self.stats.rollup_rows += 1;
            self.stats.rows_skipped += 1;
            if self.stats.rollup_rows == 1 {
                self.diagnostics.push(
                    Diagnostic::new(
                        Severity::Info,
                        DiagnosticKind::RowSkipped,
                        "skipping the scanner's aggregate placeholder rows",
                    )
                    .at_line(record.line)
                    .with_path(raw_path),
                );
            }
            return;
        }

        let directory = record
            .type_field
            .trim()
            .eq_ignore_ascii_case(&self.config.input.directory_type);
        let separator = self.separator_for(raw_path, record.line);
        let full_path = if directory {
            paths::normalize_directory(raw_path, separator)
        } else {
            raw_path.to_string()
        };
        let (parent_path, name) = paths::split_parent(&full_path);
        let parent_path = if parent_path.is_empty() {
            String::new()
        } else {
            paths::normalize_directory(parent_path, separator)
        };
        let name = name.to_string();

        let node_fields = self.populator.populate(record, &mut self.diagnostics);
        self.stats.rows_placed += 1;

        let placement = if parent_path.is_empty() {
            Placement::Root
        } else if let Some(parent) = self.forest.directory(&parent_path) {
            Placement::Under(parent)
        } else {
            Placement::Pending
        };

        if let Some((existing, kind)) =
            self.existing(&placement, &full_path, &parent_path, &name, directory)
        {
            self.resolve_duplicate(existing, kind, node_fields, record.line);
            return;
        }

        let id = self.forest.push(Node::new(
            directory,
            full_path.clone(),
            name.clone(),
            parent_path.clone(),
            record.line,
            node_fields,
        ));
        if directory {
            self.forest.register_directory(full_path.clone(), id);
        }

        match placement {
            Placement::Root => self.forest.add_root(id),
            Placement::Under(parent) => self.forest.attach(parent, id),
            Placement::Pending => {
                self.pending
                    .entry(parent_path)
                    .or_default()
                    .slot(directory)
                    .insert(name, id);
            }
        }

        if directory {
            self.drain_pending(id, &full_path);
        }
    }

    /// Node already occupying the slot this record wants, and how to report it.
    fn existing(
        &self,
        placement: &Placement,
        full_path: &str,
        parent_path: &str,
        name: &str,
        directory: bool,
    ) -> Option<(NodeId, DiagnosticKind)> {
        if directory && let Some(existing) = self.forest.directory(full_path) {
            let kind = if self.forest.node(existing).parent_path.is_empty() {
                DiagnosticKind::DuplicateRoot
            } else {
                DiagnosticKind::DuplicateDirectory
            };
            return Some((existing, kind));
        }
        let file_or_directory = if directory {
            DiagnosticKind::DuplicateDirectory
        } else {
            DiagnosticKind::DuplicateFile
        };
        match placement {
            Placement::Root => self
                .forest
                .root(full_path)
                .map(|id| (id, DiagnosticKind::DuplicateRoot)),
            Placement::Under(parent) => self
                .forest
                .child_named(*parent, name, directory)
                .map(|id| (id, file_or_directory)),
            Placement::Pending => self
                .pending
                .get(parent_path)
                .and_then(|waiting| waiting.get(name, directory))
                .map(|id| (id, file_or_directory)),
        }
    }

    fn resolve_duplicate(
        &mut self,
        existing: NodeId,
        kind: DiagnosticKind,
        incoming: NodeFields,
        line: usize,
    ) {
        self.stats.duplicates += 1;
        let policy = self.config.structure.duplicate_policy;
        let node = self.forest.node_mut(existing);
        let first_line = node.line;
        let (severity, outcome) = match policy {
            DuplicatePolicy::LastWins => {
                node.fields = incoming;
                node.line = line;
                (Severity::Warning, "newer entry replaces it")
            }
            DuplicatePolicy::FirstWins => (Severity::Warning, "first entry kept"),
            DuplicatePolicy::Reject => (Severity::Error, "duplicate rejected"),
        };
        let path = node.full_path.clone();
        self.diagnostics.push(
            Diagnostic::new(
                severity,
                kind,
                format!("{path} already seen at line {first_line}; {outcome}"),
            )
            .at_line(line)
            .with_path(path),
        );
    }

    /// Attach every child that was waiting for `path`.
    fn drain_pending(&mut self, id: NodeId, path: &str) {
        let Some(waiting) = self.pending.remove(path) else {
            return;
        };
        for child in waiting
            .directories
            .into_values()
            .chain(waiting.files.into_values())
        {
            self.forest.attach(id, child);
        }
    }

    fn is_rollup_marker(&self, record: &DecodedRecord, path: &str) -> bool {
        let input = &self.config.input;
        record.type_field.trim().eq_ignore_ascii_case(&input.rollup_type)
            || (!input.rollup_path_suffix.is_empty() && path.ends_with(&input.rollup_path_suffix))
    }

    /// Separator for normalizing `path`, detecting it from the data once.
    fn separator_for(&mut self, path: &str, line: usize) -> char {
        if let Some(separator) = self.forest.separator() {
            return separator;
        }
        if let Some(separator) = paths::detect_separator(path) {
            self.forest.set_separator(separator);
            self.diagnostics.push(
                Diagnostic::new(
                    Severity::Info,
                    DiagnosticKind::SeparatorDetected,
                    format!("path separator detected as {separator:?}"),
                )
                .at_line(line)
                .with_path(path),
            );
            return separator;
        }
        path.chars()
            .find(|&c| paths::is_separator(c))
            .unwrap_or(self.config.input.default_separator)
    }
}

/// Build a forest from a header row followed by data rows.
pub fn build_tree<'r, I>(rows: I, config: &Config) -> BuildOutcome
where
    I: IntoIterator<Item = &'r RawRow>,
{
    let mut builder = TreeBuilder::new(config);
    for row in rows {
        builder.push_row(row);
    }
    builder.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
