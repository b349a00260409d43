//! Utility functions for file naming and directory scanning

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Replace path separators so a value can be used as part of a bare file name
///
/// Both `/` and `\` become `_`, and a value made only of dots (`.`, `..`) is
/// replaced entirely so it can never address a parent directory.
///
/// # Examples
///
/// ```
/// use distdfe::utils::sanitize_file_component;
///
/// assert_eq!(sanitize_file_component("procNFe_v4.00"), "procNFe_v4.00");
/// assert_eq!(sanitize_file_component("a/b\\c"), "a_b_c");
/// assert_eq!(sanitize_file_component(".."), "__");
/// ```
#[must_use]
pub fn sanitize_file_component(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c == '.') {
        return "_".repeat(value.len());
    }
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// Truncate a string to at most `limit` characters, respecting char boundaries
#[must_use]
pub fn truncate_chars(value: &str, limit: usize) -> &str {
    match value.char_indices().nth(limit) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Check if a path has an `.xml` extension (case-insensitive)
#[must_use]
pub fn is_xml_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}

/// List the `.xml` files directly inside a directory, sorted by file name
///
/// Subdirectories are not descended into.
pub fn list_xml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read directory {}: {}", dir.display(), e),
        ))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_xml_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
