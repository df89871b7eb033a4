//! Helpers for game-relative paths.
//!
//! Mod content is addressed by paths relative to the mod root (for example
//! `common/buildings/00_buildings.txt`). Mods authored on Windows use `\`
//! separators, so every comparison in this crate goes through
//! [`normalize_path`] first.

use regex::Regex;
use std::sync::LazyLock;

/// Characters that cannot appear in a file name on any supported platform.
static INVALID_FILE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("Invalid file name regex"));

/// Normalize separators to `/` and strip leading separators.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim().trim_start_matches('/').to_string()
}

/// Case-insensitive grouping key for a path.
pub fn file_ci(path: &str) -> String {
    normalize_path(path).to_lowercase()
}

/// Directory portion of a relative path, normalized. Empty for root files.
pub fn parent_directory(path: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.rfind('/') {
        Some(index) => normalized[..index].to_string(),
        None => String::new(),
    }
}

/// Final path component.
pub fn file_name(path: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.rfind('/') {
        Some(index) => normalized[index + 1..].to_string(),
        None => normalized,
    }
}

/// File name without its extension.
pub fn file_stem(path: &str) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(index) => name[..index].to_string(),
    }
}

/// Extension including the leading dot, or an empty string.
pub fn extension(path: &str) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(index) => name[index..].to_string(),
    }
}

/// Join a directory and a relative path using `/`.
pub fn join(directory: &str, path: &str) -> String {
    let directory = normalize_path(directory);
    let path = normalize_path(path);
    if directory.is_empty() {
        path
    } else {
        format!("{}/{}", directory.trim_end_matches('/'), path)
    }
}

/// Strip characters that are not allowed in file names.
pub fn generate_valid_file_name(name: &str) -> String {
    INVALID_FILE_NAME_CHARS
        .replace_all(name.trim(), "")
        .trim_end_matches(['.', ' '])
        .to_string()
}
