//! Custom test assertions for integration tests

use std::path::Path;

/// Assert the cursor record holds exactly `expected`, in its on-disk shape
pub fn assert_cursor_file(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cursor record {} unreadable: {}", path.display(), e));
    let value: serde_json::Value = serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("cursor record {} is not JSON: {}", path.display(), e));
    assert_eq!(
        value,
        serde_json::json!({ "ultNSU": expected }),
        "unexpected cursor record at {}",
        path.display()
    );
}

/// Sorted file names in a directory (empty when it does not exist)
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Assert a directory holds exactly `expected` files
pub fn assert_dir_files(dir: &Path, expected: &[&str]) {
    let actual = file_names(dir);
    assert_eq!(
        actual, expected,
        "unexpected files in {}",
        dir.display()
    );
}

/// Assert a file's content equals `expected`
pub fn assert_file_content(path: &Path, expected: &str) {
    let actual = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("{} unreadable: {}", path.display(), e));
    assert_eq!(actual, expected, "unexpected content in {}", path.display());
}
