//! Record decoder: header mapping and per-row field decoding.
//!
//! Quoting follows the de-facto CSV convention only: one optional layer of
//! double quotes, with `""` inside meaning a literal quote. No multi-line
//! fields.

use std::collections::HashMap;
use std::fmt;

use crate::inventory::source::RawRow;
use crate::logger::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};

/// Recognized export columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnKind {
    /// `Full Path`, preferred path header.
    FullPath,
    /// `Path`, alternative path header.
    Path,
    /// `Size`
    Size,
    /// `Allocated`
    Allocated,
    /// `Last Modified`
    LastModified,
    /// `Last Accessed`
    LastAccessed,
    /// `Owner`
    Owner,
    /// `Permissions`
    Permissions,
    /// `Inherited Permissions`
    InheritedPermissions,
    /// `Own Permissions`
    OwnPermissions,
    /// `Type`, required.
    Type,
    /// `Creation Date`
    CreationDate,
    /// `Attributes`
    Attributes,
}

impl ColumnKind {
    pub const ALL: [Self; 13] = [
        Self::FullPath,
        Self::Path,
        Self::Size,
        Self::Allocated,
        Self::LastModified,
        Self::LastAccessed,
        Self::Owner,
        Self::Permissions,
        Self::InheritedPermissions,
        Self::OwnPermissions,
        Self::Type,
        Self::CreationDate,
        Self::Attributes,
    ];

    /// Header text as written by the exporter.
    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::FullPath => "Full Path",
            Self::Path => "Path",
            Self::Size => "Size",
            Self::Allocated => "Allocated",
            Self::LastModified => "Last Modified",
            Self::LastAccessed => "Last Accessed",
            Self::Owner => "Owner",
            Self::Permissions => "Permissions",
            Self::InheritedPermissions => "Inherited Permissions",
            Self::OwnPermissions => "Own Permissions",
            Self::Type => "Type",
            Self::CreationDate => "Creation Date",
            Self::Attributes => "Attributes",
        }
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn from_header(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.header().eq_ignore_ascii_case(name))
    }

    const fn is_path(self) -> bool {
        matches!(self, Self::FullPath | Self::Path)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Strip one optional layer of double quotes and un-escape `""`.
///
/// Missing fields decode to the empty string.
pub fn decode_field(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let trimmed = raw.trim();
    match trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => raw.to_string(),
    }
}

/// Header-name → column-index mapping built once from the header row.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    columns: HashMap<ColumnKind, usize>,
    path_column: Option<ColumnKind>,
}

impl HeaderMap {
    /// Map the header row, reporting schema problems once each.
    pub fn from_header(header: &RawRow, diagnostics: &mut Diagnostics) -> Self {
        let mut map = Self::default();

        for (index, raw) in header.fields.iter().enumerate() {
            let name = decode_field(Some(raw));
            let Some(kind) = ColumnKind::from_header(&name) else {
                diagnostics.push(
                    Diagnostic::new(
                        Severity::Warning,
                        DiagnosticKind::UnknownColumn,
                        format!("ignoring unrecognized column {name:?} at position {}", index + 1),
                    )
                    .at_line(header.line),
                );
                continue;
            };

            if kind.is_path() {
                if let Some(existing) = map.path_column {
                    diagnostics.push(
                        Diagnostic::new(
                            Severity::Warning,
                            DiagnosticKind::ConflictingPathColumns,
                            format!(
                                "both {:?} and {:?} columns present; using {:?}",
                                existing.header(),
                                kind.header(),
                                existing.header()
                            ),
                        )
                        .at_line(header.line),
                    );
                    continue;
                }
                map.path_column = Some(kind);
            }

            if map.columns.contains_key(&kind) {
                diagnostics.push(
                    Diagnostic::new(
                        Severity::Warning,
                        DiagnosticKind::UnknownColumn,
                        format!(
                            "column {:?} repeated at position {}; using the first one",
                            kind.header(),
                            index + 1
                        ),
                    )
                    .at_line(header.line),
                );
                continue;
            }
            map.columns.insert(kind, index);
        }

        if map.path_column.is_none() {
            diagnostics.push(
                Diagnostic::new(
                    Severity::Error,
                    DiagnosticKind::MissingRequiredColumn,
                    "header has neither a \"Full Path\" nor a \"Path\" column; rows cannot be placed",
                )
                .at_line(header.line),
            );
        }
        if !map.columns.contains_key(&ColumnKind::Type) {
            diagnostics.push(
                Diagnostic::new(
                    Severity::Error,
                    DiagnosticKind::MissingRequiredColumn,
                    "header has no \"Type\" column; rows cannot be classified",
                )
                .at_line(header.line),
            );
        }

        map
    }

    /// Both required columns (a path column and Type) are present.
    pub fn is_usable(&self) -> bool {
        self.path_column.is_some() && self.columns.contains_key(&ColumnKind::Type)
    }

    /// Field index of `kind` in each row.
    pub fn index(&self, kind: ColumnKind) -> Option<usize> {
        self.columns.get(&kind).copied()
    }

    /// Whether the header lists `kind`.
    pub fn has(&self, kind: ColumnKind) -> bool {
        self.columns.contains_key(&kind)
    }

    /// Which of the two path headers is in use.
    pub fn path_column(&self) -> Option<ColumnKind> {
        self.path_column
    }

    /// Decode `kind` from `row`; `None` when the column is absent from the header.
    pub fn decode(&self, row: &RawRow, kind: ColumnKind) -> Option<String> {
        self.index(kind).map(|index| decode_field(row.field(index)))
    }

    /// Decode one data row. `None` when the header lacks a required column.
    pub fn decode_row(&self, row: &RawRow) -> Option<DecodedRecord> {
        let path_kind = self.path_column?;
        let path = self.decode(row, path_kind)?;
        let type_field = self.decode(row, ColumnKind::Type)?;

        Some(DecodedRecord {
            line: row.line,
            path,
            type_field,
            size: self.decode(row, ColumnKind::Size),
            allocated: self.decode(row, ColumnKind::Allocated),
            last_modified: self.decode(row, ColumnKind::LastModified),
            last_accessed: self.decode(row, ColumnKind::LastAccessed),
            creation_date: self.decode(row, ColumnKind::CreationDate),
            owner: self.decode(row, ColumnKind::Owner),
            permissions: self.decode(row, ColumnKind::Permissions),
            inherited_permissions: self.decode(row, ColumnKind::InheritedPermissions),
            own_permissions: self.decode(row, ColumnKind::OwnPermissions),
            attributes: self.decode(row, ColumnKind::Attributes),
        })
    }
}

/// One data row with every field unquoted.
///
/// Optional columns are `None` when the header lacks them and `Some("")`
/// when the row leaves them empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedRecord {
    /// Physical line in the export.
    pub line: usize,
    /// Path column as written, not yet normalized.
    pub path: String,
    /// Type column; selects directory or file.
    pub type_field: String,
    /// `Size`
    pub size: Option<String>,
    /// `Allocated`
    pub allocated: Option<String>,
    /// `Last Modified`
    pub last_modified: Option<String>,
    /// `Last Accessed`
    pub last_accessed: Option<String>,
    /// `Creation Date`
    pub creation_date: Option<String>,
    /// `Owner`
    pub owner: Option<String>,
    /// `Permissions`
    pub permissions: Option<String>,
    /// `Inherited Permissions`
    pub inherited_permissions: Option<String>,
    /// `Own Permissions`
    pub own_permissions: Option<String>,
    /// `Attributes`
    pub attributes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(fields: &[&str]) -> RawRow {
        RawRow::new(1, fields.iter().copied())
    }

    #[test]
    fn decode_strips_one_quote_layer_and_unescapes() {
        assert_eq!(decode_field(Some(r#""C:\A\""#)), r"C:\A\");
        assert_eq!(decode_field(Some(r#""say ""hi""""#)), r#"say "hi""#);
        assert_eq!(decode_field(Some(r#"""x"""#)), r#""x""#);
        assert_eq!(decode_field(Some("plain")), "plain");
        assert_eq!(decode_field(Some("")), "");
        assert_eq!(decode_field(None), "");
    }

    #[test]
    fn decode_leaves_unbalanced_quotes_alone() {
        assert_eq!(decode_field(Some(r#""open"#)), r#""open"#);
        assert_eq!(decode_field(Some(r#"""#)), r#"""#);
    }

    #[test]
    fn header_maps_known_columns_case_insensitively() {
        let mut diags = Diagnostics::new();
        let map = HeaderMap::from_header(
            &header(&["\"Full Path\"", "size", "Type", "Last Modified"]),
            &mut diags,
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert!(map.is_usable());
        assert_eq!(map.path_column(), Some(ColumnKind::FullPath));
        assert_eq!(map.index(ColumnKind::Size), Some(1));
        assert_eq!(map.index(ColumnKind::LastModified), Some(3));
        assert!(!map.has(ColumnKind::Owner));
    }

    #[test]
    fn both_path_headers_first_wins_with_warning() {
        let mut diags = Diagnostics::new();
        let map = HeaderMap::from_header(&header(&["Path", "Type", "Full Path"]), &mut diags);
        assert_eq!(map.path_column(), Some(ColumnKind::Path));
        assert_eq!(map.index(ColumnKind::Path), Some(0));
        assert!(!map.has(ColumnKind::FullPath));
        assert_eq!(diags.of_kind(DiagnosticKind::ConflictingPathColumns).len(), 1);
        assert_eq!(diags.error_count(), 0);
    }

    #[test]
    fn missing_required_columns_are_errors() {
        let mut diags = Diagnostics::new();
        let map = HeaderMap::from_header(&header(&["Size", "Owner"]), &mut diags);
        assert!(!map.is_usable());
        assert_eq!(diags.of_kind(DiagnosticKind::MissingRequiredColumn).len(), 2);
        assert!(map.decode_row(&RawRow::new(2, ["1 KB", "me"])).is_none());
    }

    #[test]
    fn unknown_column_is_reported_once() {
        let mut diags = Diagnostics::new();
        let map = HeaderMap::from_header(&header(&["Full Path", "Type", "Colour"]), &mut diags);
        assert!(map.is_usable());
        let unknown = diags.of_kind(DiagnosticKind::UnknownColumn);
        assert_eq!(unknown.len(), 1);
        assert!(unknown[0].message.contains("Colour"));
    }

    #[test]
    fn decode_row_distinguishes_absent_from_empty() {
        let mut diags = Diagnostics::new();
        let map = HeaderMap::from_header(&header(&["Full Path", "Type", "Size"]), &mut diags);
        let record = map
            .decode_row(&RawRow::new(9, [r#""C:\A\f.txt""#, "txt"]))
            .expect("decodes");
        assert_eq!(record.line, 9);
        assert_eq!(record.path, r"C:\A\f.txt");
        assert_eq!(record.type_field, "txt");
        assert_eq!(record.size.as_deref(), Some(""));
        assert_eq!(record.owner, None);
    }
}
