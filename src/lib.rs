#![forbid(unsafe_code)]

//! Inventory Audit (iva): integrity checks for directory-tree inventory
//! exports.
//!
//! A file-server scanner exports one row per directory and file with sizes,
//! owners and permission strings. iva rebuilds the scanned hierarchy from
//! those rows in any order, validates every field, and recomputes each
//! folder's size from its contents to cross-check the figure the scanner
//! reported.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use inventory_audit::prelude::*;
//!
//! let config = Config::load(None)?;
//! let export = read_export(std::path::Path::new("scan.csv"), &config.input)?;
//! let mut outcome = build_tree(&export.rows, &config);
//! let report = reconcile(&mut outcome.forest, &config);
//! println!("{} files, {} bytes", report.total_files, report.total_size_bytes);
//! # Ok::<(), IvaError>(())
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use inventory_audit::inventory::permissions::validate;
//! use inventory_audit::inventory::units::parse_size;
//! ```

pub mod prelude;

pub mod core;
pub mod inventory;
pub mod logger;
