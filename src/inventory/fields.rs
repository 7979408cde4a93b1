//! Optional per-node fields: conversion, validation and degradation.
//!
//! Every field is handled independently. A field that fails to convert is
//! dropped with a warning; the node itself is always kept.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::core::config::{FieldsConfig, InputConfig};
use crate::inventory::permissions;
use crate::inventory::record::{ColumnKind, DecodedRecord, HeaderMap};
use crate::inventory::units;
use crate::logger::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};

/// Optional values carried by a node, selected by [`FieldsConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeFields {
    /// Reported size in bytes.
    pub size: Option<u64>,
    /// Reported allocation in bytes.
    pub allocated: Option<u64>,
    /// Last Modified, local time as exported.
    pub last_modified: Option<NaiveDateTime>,
    /// Last Accessed, local time as exported.
    pub last_accessed: Option<NaiveDateTime>,
    /// Creation Date, local time as exported.
    pub created: Option<NaiveDateTime>,
    /// Owner account, `DOMAIN\user`.
    pub owner: Option<String>,
    /// Effective permissions, kept even when they fail validation.
    pub permissions: Option<String>,
    /// Inherited permissions.
    pub inherited_permissions: Option<String>,
    /// Explicit (non-inherited) permissions.
    pub own_permissions: Option<String>,
    /// Raw Type column.
    pub type_label: Option<String>,
    /// Attribute letters such as `RHA`.
    pub attributes: Option<String>,
    /// The scanner could not read this item's security information.
    pub unreadable: bool,
}

/// Report, once per run, configured fields whose column the export lacks.
pub fn report_unavailable(
    header: &HeaderMap,
    fields: &FieldsConfig,
    diagnostics: &mut Diagnostics,
) {
    let wanted = [
        (fields.size, ColumnKind::Size),
        (fields.allocated, ColumnKind::Allocated),
        (fields.last_modified, ColumnKind::LastModified),
        (fields.last_accessed, ColumnKind::LastAccessed),
        (fields.creation_date, ColumnKind::CreationDate),
        (fields.owner, ColumnKind::Owner),
        (fields.permissions, ColumnKind::Permissions),
        (fields.inherited_permissions, ColumnKind::InheritedPermissions),
        (fields.own_permissions, ColumnKind::OwnPermissions),
        (fields.attributes, ColumnKind::Attributes),
    ];
    for (enabled, column) in wanted {
        if enabled && !header.has(column) {
            diagnostics.info(
                DiagnosticKind::UnavailableField,
                format!("column {:?} not in export; field left empty", column.header()),
            );
        }
    }
}

/// Parse a timestamp with the first matching format.
///
/// Date-only values are accepted for any format whose date part matches and
/// are placed at midnight.
pub fn parse_timestamp(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            formats.iter().find_map(|format| {
                let date_part = format.split_whitespace().next()?;
                NaiveDate::parse_from_str(raw, date_part)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
}

/// Builds [`NodeFields`] from decoded records.
#[derive(Debug, Clone)]
pub struct FieldPopulator<'a> {
    fields: &'a FieldsConfig,
    input: &'a InputConfig,
}

impl<'a> FieldPopulator<'a> {
    /// Populator for the retained `fields`.
    pub fn new(fields: &'a FieldsConfig, input: &'a InputConfig) -> Self {
        Self { fields, input }
    }

    /// Convert every retained optional field of `record`.
    pub fn populate(&self, record: &DecodedRecord, diagnostics: &mut Diagnostics) -> NodeFields {
        let mut out = NodeFields::default();
        let ctx = RowContext {
            line: record.line,
            path: &record.path,
        };

        if self.fields.size {
            out.size = self.size(record.size.as_deref(), ColumnKind::Size, &ctx, diagnostics);
        }
        if self.fields.allocated {
            out.allocated =
                self.size(record.allocated.as_deref(), ColumnKind::Allocated, &ctx, diagnostics);
        }
        if self.fields.last_modified {
            out.last_modified = self.timestamp(
                record.last_modified.as_deref(),
                ColumnKind::LastModified,
                &ctx,
                diagnostics,
            );
        }
        if self.fields.last_accessed {
            out.last_accessed = self.timestamp(
                record.last_accessed.as_deref(),
                ColumnKind::LastAccessed,
                &ctx,
                diagnostics,
            );
        }
        if self.fields.creation_date {
            out.created = self.timestamp(
                record.creation_date.as_deref(),
                ColumnKind::CreationDate,
                &ctx,
                diagnostics,
            );
        }
        if self.fields.owner {
            out.owner = non_empty(record.owner.as_deref());
            if out
                .owner
                .as_deref()
                .is_some_and(permissions::is_unreadable_placeholder)
            {
                out.unreadable = true;
            }
        }
        if self.fields.permissions {
            out.permissions = self.permissions(
                record.permissions.as_deref(),
                ColumnKind::Permissions,
                &ctx,
                &mut out.unreadable,
                diagnostics,
            );
        }
        if self.fields.inherited_permissions {
            out.inherited_permissions = self.permissions(
                record.inherited_permissions.as_deref(),
                ColumnKind::InheritedPermissions,
                &ctx,
                &mut out.unreadable,
                diagnostics,
            );
        }
        if self.fields.own_permissions {
            out.own_permissions = self.permissions(
                record.own_permissions.as_deref(),
                ColumnKind::OwnPermissions,
                &ctx,
                &mut out.unreadable,
                diagnostics,
            );
        }
        if self.fields.type_label {
            out.type_label = non_empty(Some(&record.type_field));
        }
        if self.fields.attributes {
            out.attributes = non_empty(record.attributes.as_deref());
        }

        if out.unreadable {
            diagnostics.push(ctx.diagnostic(
                Severity::Info,
                DiagnosticKind::UnreadableEntry,
                format!("scanner could not read security information for {}", ctx.path),
            ));
        }

        out
    }

    fn size(
        &self,
        raw: Option<&str>,
        column: ColumnKind,
        ctx: &RowContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Option<u64> {
        let raw = non_empty(raw)?;
        match units::parse_size(&raw) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                diagnostics.push(ctx.diagnostic(
                    Severity::Warning,
                    DiagnosticKind::InvalidSize,
                    format!("{} of {}: {err}; field left empty", column.header(), ctx.path),
                ));
                None
            }
        }
    }

    fn timestamp(
        &self,
        raw: Option<&str>,
        column: ColumnKind,
        ctx: &RowContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Option<NaiveDateTime> {
        let raw = non_empty(raw)?;
        let parsed = parse_timestamp(&raw, &self.input.timestamp_formats);
        if parsed.is_none() {
            diagnostics.push(ctx.diagnostic(
                Severity::Warning,
                DiagnosticKind::InvalidTimestamp,
                format!(
                    "{} of {}: unrecognized timestamp {raw:?}; field left empty",
                    column.header(),
                    ctx.path
                ),
            ));
        }
        parsed
    }

    fn permissions(
        &self,
        raw: Option<&str>,
        column: ColumnKind,
        ctx: &RowContext<'_>,
        unreadable: &mut bool,
        diagnostics: &mut Diagnostics,
    ) -> Option<String> {
        let raw = non_empty(raw)?;
        let check = permissions::validate(&raw);
        *unreadable |= check.unreadable;

        if check.trust_failures > 0 {
            diagnostics.push(ctx.diagnostic(
                Severity::Info,
                DiagnosticKind::TrustFailure,
                format!(
                    "{} of {}: {} account(s) unresolved due to a failed domain trust relationship",
                    column.header(),
                    ctx.path,
                    check.trust_failures
                ),
            ));
        }
        if let Some(message) = check.message() {
            diagnostics.push(ctx.diagnostic(
                Severity::Warning,
                DiagnosticKind::InvalidPermissions,
                format!("{} of {}: {message}", column.header(), ctx.path),
            ));
        }
        // The string is kept as reported; only its validity is judged here.
        Some(raw)
    }
}

struct RowContext<'a> {
    line: usize,
    path: &'a str,
}

impl RowContext<'_> {
    fn diagnostic(&self, severity: Severity, kind: DiagnosticKind, message: String) -> Diagnostic {
        Diagnostic::new(severity, kind, message)
            .at_line(self.line)
            .with_path(self.path)
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
