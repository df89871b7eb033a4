use crate::models::hash_bytes;
use crate::paths;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::borrow::Cow;
use std::fs;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Extensions the games read as script text. Everything else is binary.
pub const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".asset", ".gui", ".gfx", ".yml", ".csv", ".shader", ".fxh", ".lua",
];

/// One file read from a mod directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFile {
    /// Path relative to the mod root, `/` separated.
    pub path: String,
    pub content: Vec<u8>,
    pub content_sha: String,
    pub last_modified: Option<SystemTime>,
    /// `utf-8`, `utf-8-bom` or `binary`.
    pub encoding: String,
    pub is_binary: bool,
}

impl ModFile {
    /// Build a file entry, classifying it by extension.
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        let path = paths::normalize_path(&path.into());
        let is_binary = !is_text_file(&path);
        let encoding = if is_binary {
            "binary"
        } else if content.starts_with(&[0xEF, 0xBB, 0xBF]) {
            "utf-8-bom"
        } else {
            "utf-8"
        };
        Self {
            content_sha: hash_bytes(&content),
            encoding: encoding.to_string(),
            path,
            content,
            last_modified: None,
            is_binary,
        }
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Content as text with any byte order mark removed.
    pub fn text(&self) -> Cow<'_, str> {
        let bytes = self
            .content
            .strip_prefix(&[0xEF, 0xBB, 0xBF])
            .unwrap_or(&self.content);
        String::from_utf8_lossy(bytes)
    }
}

pub fn is_text_file(path: &str) -> bool {
    let extension = paths::extension(path).to_lowercase();
    TEXT_EXTENSIONS.contains(&extension.as_str())
}

/// Source of mod file contents.
pub trait ModReader: Send + Sync {
    /// Read every content file under `root`.
    fn read(&self, root: &Utf8Path) -> Result<Vec<ModFile>>;
}

/// Reads mods from the local file system.
///
/// Walks the mod root in file name order. Hidden entries and the root level
/// `.mod` descriptor are skipped.
#[derive(Debug, Clone, Default)]
pub struct FsModReader;

impl FsModReader {
    pub fn new() -> Self {
        Self
    }
}

impl ModReader for FsModReader {
    fn read(&self, root: &Utf8Path) -> Result<Vec<ModFile>> {
        if !root.is_dir() {
            anyhow::bail!("Mod directory not found: {}", root);
        }

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e
                        .file_name()
                        .to_str()
                        .map(|name| name.starts_with('.'))
                        .unwrap_or(false)
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk mod directory: {}", root))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root.as_std_path())
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            let relative = paths::normalize_path(&relative);

            if entry.depth() == 1 && paths::extension(&relative).eq_ignore_ascii_case(".mod") {
                continue;
            }

            let content = fs::read(entry.path())
                .with_context(|| format!("Failed to read mod file: {}", entry.path().display()))?;
            let mut file = ModFile::new(relative, content);
            if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                file = file.with_last_modified(modified);
            }
            files.push(file);
        }

        tracing::debug!("Read {} files from {}", files.len(), root);
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_mod_file_classification() {
        let text = ModFile::new("common\\buildings\\a.txt", b"a = {}".to_vec());
        assert_eq!(text.path, "common/buildings/a.txt");
        assert!(!text.is_binary);
        assert_eq!(text.encoding, "utf-8");

        let binary = ModFile::new("gfx/icon.dds", vec![0, 1, 2]);
        assert!(binary.is_binary);
        assert_eq!(binary.encoding, "binary");
    }

    #[test]
    fn test_text_strips_bom() {
        let file = ModFile::new("events/a.txt", b"\xEF\xBB\xBFnamespace = a".to_vec());
        assert_eq!(file.encoding, "utf-8-bom");
        assert_eq!(file.text(), "namespace = a");
    }

    #[test]
    fn test_fs_reader_walks_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("events")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("events/b.txt"), "b").unwrap();
        fs::write(root.join("events/a.txt"), "a").unwrap();
        fs::write(root.join(".git/config"), "x").unwrap();
        fs::write(root.join("descriptor.mod"), "name=\"x\"").unwrap();

        let files = FsModReader::new().read(&root).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(names, vec!["events/a.txt", "events/b.txt"]);
        assert!(files[0].last_modified.is_some());
    }

    #[test]
    fn test_fs_reader_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().join("missing")).unwrap();
        assert!(FsModReader::new().read(&root).is_err());
    }
}
