//! String-level path handling for inventory paths.
//!
//! Exports come from Windows file servers and Unix hosts alike, so paths are
//! treated as plain strings with `\` or `/` separators rather than as host
//! `Path`s.

/// Both separators the exporter may use.
pub const SEPARATORS: [char; 2] = ['\\', '/'];

/// Length of a bare drive root such as `C:\`.
const DRIVE_ROOT_LEN: usize = 3;

/// Whether `c` is `\\` or `/`.
pub fn is_separator(c: char) -> bool {
    SEPARATORS.contains(&c)
}

/// Strip every trailing separator.
pub fn trim_trailing_separators(path: &str) -> &str {
    path.trim_end_matches(SEPARATORS)
}

/// Canonical directory key: the path without trailing separators, followed
/// by exactly one `separator`. A bare root such as `/` keeps its own
/// separator.
pub fn normalize_directory(path: &str, separator: char) -> String {
    let trimmed = trim_trailing_separators(path);
    if trimmed.is_empty() {
        return path.chars().next().map_or_else(|| separator.to_string(), String::from);
    }
    let mut normalized = String::with_capacity(trimmed.len() + 1);
    normalized.push_str(trimmed);
    normalized.push(separator);
    normalized
}

/// Split into `(parent_path, name)`.
///
/// The parent keeps its trailing separator so it matches the key a
/// directory record registers under. A path with a single segment has an
/// empty parent and is its own name.
pub fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = trim_trailing_separators(path);
    match trimmed.rfind(SEPARATORS) {
        Some(index) => (&trimmed[..=index], &trimmed[index + 1..]),
        None if trimmed.is_empty() => ("", path),
        None => ("", trimmed),
    }
}

/// Detect the separator from a path whose parent is longer than a bare
/// drive root. Shorter paths say nothing reliable and yield `None`.
pub fn detect_separator(path: &str) -> Option<char> {
    let trimmed = trim_trailing_separators(path);
    let index = trimmed.rfind(SEPARATORS)?;
    if index + 1 > DRIVE_ROOT_LEN {
        trimmed[index..].chars().next()
    } else {
        None
    }
}
