//! Record source: turns an export file into raw delimited rows.
//!
//! The exporter writes a fixed-size preamble (report title, scanned drive,
//! scan date) before the header row. The preamble is dropped here, each
//! remaining line is split on the delimiter outside of double quotes, and
//! the quoting itself is left for the record decoder to strip.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use memchr::memchr2;

use crate::core::config::InputConfig;
use crate::core::errors::{IvaError, Result};

const UTF8_BOM: &str = "\u{feff}";

/// One physical line of the export, split into raw (still quoted) fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number in the export file.
    pub line: usize,
    /// Fields in column order.
    pub fields: Vec<String>,
}

impl RawRow {
    /// Row at `line` with the given fields.
    pub fn new<I, S>(line: usize, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            line,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Field at `index`, or `None` when the row is shorter than the header.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// A loaded export: header row first, data rows after.
#[derive(Debug, Clone)]
pub struct Export {
    /// File the rows were read from.
    pub path: PathBuf,
    /// Header row first.
    pub rows: Vec<RawRow>,
}

/// Read and split an export file.
///
/// A missing file is the one fatal input condition; everything else about
/// the content is left for the decoder and builder to diagnose.
pub fn read_export(path: &Path, input: &InputConfig) -> Result<Export> {
    let bytes = fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => IvaError::MissingInput {
            path: path.to_path_buf(),
        },
        _ => IvaError::io(path, source),
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let rows = parse_rows(&text, input);
    if rows.is_empty() {
        return Err(IvaError::EmptyInput {
            path: path.to_path_buf(),
            preamble_lines: input.preamble_lines,
        });
    }
    Ok(Export {
        path: path.to_path_buf(),
        rows,
    })
}

/// Split export text into rows, skipping the preamble and blank lines.
pub fn parse_rows(text: &str, input: &InputConfig) -> Vec<RawRow> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    // Delimiter is validated as ASCII by the config loader.
    let delimiter = u8::try_from(u32::from(input.delimiter)).unwrap_or(b',');

    text.split('\n')
        .enumerate()
        .skip(input.preamble_lines)
        .filter_map(|(index, line)| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                None
            } else {
                Some(RawRow {
                    line: index + 1,
                    fields: split_line(line, delimiter),
                })
            }
        })
        .collect()
}

/// Split one line on `delimiter`, ignoring delimiters inside double quotes.
///
/// Fields are returned verbatim, quotes included.
pub fn split_line(line: &str, delimiter: u8) -> Vec<String> {
    let bytes = line.as_bytes();
    let mut fields = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    let mut in_quotes = false;

    while let Some(offset) = memchr2(delimiter, b'"', &bytes[pos..]) {
        let at = pos + offset;
        if bytes[at] == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            fields.push(line[start..at].to_string());
            start = at + 1;
        }
        pos = at + 1;
    }
    fields.push(line[start..].to_string());
    fields
}
