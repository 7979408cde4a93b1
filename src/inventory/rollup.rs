//! Rollup and reconciliation.
//!
//! Sums reported file sizes and allocations bottom-up into every directory,
//! then compares each directory's computed total with the value the scanner
//! reported for it. Totals are recomputed from scratch on every call.

#![allow(clippy::cast_precision_loss)]

use std::fmt;

use serde::Serialize;

use crate::core::config::{Config, DeviationSeverity};
use crate::inventory::tree::{Forest, NodeId};
use crate::logger::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};

/// Which reported figure a deviation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// The Size column.
    Size,
    /// The Allocated (on-disk) column.
    Allocated,
}

impl Metric {
    const fn diagnostic_kind(self) -> DiagnosticKind {
        match self {
            Self::Size => DiagnosticKind::SizeDeviation,
            Self::Allocated => DiagnosticKind::AllocationDeviation,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Size => "size",
            Self::Allocated => "allocation",
        })
    }
}

/// Which side of the tolerance band the computed total fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Computed < reported: the scan saw entries this export does not list.
    BelowReported,
    /// Computed > reported: the scanner under-counted its own folder.
    AboveReported,
}

impl Direction {
    const fn explanation(self) -> &'static str {
        match self {
            Self::BelowReported => {
                "likely an access restriction: the scanner counted items whose rows are missing or unreadable"
            }
            Self::AboveReported => "unusual: suspected scanner limitation in the folder total",
        }
    }
}

/// One directory whose computed total falls outside the tolerance band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deviation {
    /// The directory.
    pub node: NodeId,
    /// Its normalized full path.
    pub path: String,
    /// Which column was compared.
    pub metric: Metric,
    /// Bytes the scanner reported for the directory.
    pub reported: u64,
    /// Bytes summed from its descendants.
    pub computed: u64,
    /// `computed - reported`.
    pub difference: i128,
    /// Which side of the band `computed` fell on.
    pub direction: Direction,
    /// From the `[reconcile]` policy for `direction`.
    pub severity: Severity,
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Deviation warnings/errors and rollup notes.
    pub diagnostics: Diagnostics,
    /// Every out-of-band directory, in forest walk order.
    pub deviations: Vec<Deviation>,
    /// File nodes, attached or not.
    pub total_files: usize,
    /// Directory nodes, attached or not.
    pub total_directories: usize,
    /// Sum of every file's reported size across all roots.
    pub total_size_bytes: u64,
    /// Sum of every file's reported allocation across all roots.
    pub total_allocated_bytes: u64,
    /// Entries whose parent never appeared, counted among the roots.
    pub unattached_roots: usize,
    /// Files with no usable reported size; they count as zero in rollups.
    pub files_without_size: usize,
    /// Directories with a reported value that were compared.
    pub directories_checked: usize,
}

impl ReconcileReport {
    /// Error-severity diagnostics; non-zero fails the audit.
    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }
}

/// Whether `computed` lies in `[reported × (1 − tolerance), reported × (1 + tolerance)]`.
pub fn within_tolerance(reported: u64, computed: u64, tolerance: f64) -> bool {
    let reported = reported as f64;
    let computed = computed as f64;
    let low = reported * (1.0 - tolerance);
    let high = reported * (1.0 + tolerance);
    (low..=high).contains(&computed)
}

/// Roll up every directory and check it against its reported values.
pub fn reconcile(forest: &mut Forest, config: &Config) -> ReconcileReport {
    let policy = &config.reconcile;
    let mut report = ReconcileReport {
        total_files: forest.file_count(),
        total_directories: forest.directory_count(),
        unattached_roots: forest.unattached_count(),
        ..ReconcileReport::default()
    };

    for node in forest.nodes().filter(|n| !n.is_directory()) {
        match node.fields.size {
            Some(size) => report.total_size_bytes = report.total_size_bytes.saturating_add(size),
            None => report.files_without_size += 1,
        }
        if let Some(allocated) = node.fields.allocated {
            report.total_allocated_bytes = report.total_allocated_bytes.saturating_add(allocated);
        }
    }

    roll_up(forest, policy.rollup_size, policy.rollup_allocated);

    let mut unreported = 0_usize;
    for id in forest.walk() {
        let node = forest.node(id);
        let Some(dir) = node.directory() else {
            continue;
        };
        let checks = [
            (Metric::Size, node.fields.size, dir.rolled_up_size),
            (Metric::Allocated, node.fields.allocated, dir.rolled_up_allocated),
        ];
        let mut checked = false;
        for (metric, reported, computed) in checks {
            let Some(computed) = computed else {
                continue;
            };
            let Some(reported) = reported else {
                if metric == Metric::Size {
                    unreported += 1;
                }
                continue;
            };
            checked = true;
            if within_tolerance(reported, computed, policy.tolerance) {
                continue;
            }
            let direction = if computed < reported {
                Direction::BelowReported
            } else {
                Direction::AboveReported
            };
            let severity = match direction {
                Direction::BelowReported => policy.under_reported,
                Direction::AboveReported => policy.over_reported,
            };
            let severity = match severity {
                DeviationSeverity::Warning => Severity::Warning,
                DeviationSeverity::Error => Severity::Error,
            };
            let deviation = Deviation {
                node: id,
                path: node.full_path.clone(),
                metric,
                reported,
                computed,
                difference: i128::from(computed) - i128::from(reported),
                direction,
                severity,
            };
            report.diagnostics.push(
                Diagnostic::new(
                    severity,
                    metric.diagnostic_kind(),
                    format!(
                        "{}: reported {metric} {reported} B, computed {computed} B, difference {} B ({})",
                        deviation.path,
                        deviation.difference,
                        direction.explanation()
                    ),
                )
                .at_line(node.line)
                .with_path(deviation.path.clone()),
            );
            report.deviations.push(deviation);
        }
        if checked {
            report.directories_checked += 1;
        }
    }

    if unreported > 0 {
        report.diagnostics.info(
            DiagnosticKind::RollupSkipped,
            format!("{unreported} directories have no reported size and were not reconciled"),
        );
    }
    if report.files_without_size > 0 && policy.rollup_size {
        report.diagnostics.info(
            DiagnosticKind::RollupSkipped,
            format!(
                "{} files have no usable size and count as 0 in rollups",
                report.files_without_size
            ),
        );
    }

    report
}

/// Post-order fold: directories collected in pre-order, summed in reverse so
/// every child total is final before its parent reads it.
fn roll_up(forest: &mut Forest, size: bool, allocated: bool) {
    let order: Vec<NodeId> = forest
        .walk()
        .into_iter()
        .filter(|&id| forest.node(id).is_directory())
        .collect();

    for &id in order.iter().rev() {
        let mut size_sum = 0_u64;
        let mut allocated_sum = 0_u64;
        if let Some(dir) = forest.node(id).directory() {
            for &file in dir.child_files.values() {
                let fields = &forest.node(file).fields;
                size_sum = size_sum.saturating_add(fields.size.unwrap_or(0));
                allocated_sum = allocated_sum.saturating_add(fields.allocated.unwrap_or(0));
            }
            for &child in dir.child_directories.values() {
                if let Some(child_dir) = forest.node(child).directory() {
                    size_sum = size_sum.saturating_add(child_dir.rolled_up_size.unwrap_or(0));
                    allocated_sum =
                        allocated_sum.saturating_add(child_dir.rolled_up_allocated.unwrap_or(0));
                }
            }
        }
        if let Some(dir) = forest.node_mut(id).directory_mut() {
            dir.rolled_up_size = size.then_some(size_sum);
            dir.rolled_up_allocated = allocated.then_some(allocated_sum);
        }
    }
}
