//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use inventory_audit::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, DeviationSeverity, DuplicatePolicy};
pub use crate::core::errors::{IvaError, Result};

// Inventory
pub use crate::inventory::builder::{BuildOutcome, BuildStats, TreeBuilder, build_tree};
pub use crate::inventory::digest::{forest_digest, hash_hex};
pub use crate::inventory::permissions::PermissionCheck;
pub use crate::inventory::rollup::{Deviation, Direction, Metric, ReconcileReport, reconcile};
pub use crate::inventory::source::{Export, RawRow, read_export};
pub use crate::inventory::tree::{Forest, Node, NodeId, NodeKind};

// Diagnostics
pub use crate::logger::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use crate::logger::jsonl::{AuditSummary, DiagnosticWriter, JsonlConfig};
