use crate::models::ModEntry;
use crate::services::retry::RetryPolicy;
use anyhow::{Context, Result};
use camino::Utf8Path;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Load order document in the game's user directory.
pub const LOAD_ORDER_FILE: &str = "dlc_load.json";

const ENABLED_MODS_KEY: &str = "enabled_mods";

/// Serializes every write into the user's mod directory.
///
/// Created once when the services are wired and cloned into the exporter
/// and the mod writer; clones share the same mutex.
#[derive(Debug, Clone, Default)]
pub struct WriteLock(Arc<Mutex<()>>);

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock. A poisoned lock is recovered since it guards no data.
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writes mod descriptors, directories and the load order.
#[cfg_attr(test, mockall::automock)]
pub trait ModWriter: Send + Sync {
    /// Create `root/path`. Returns `false` when it already existed.
    fn create_mod_directory(&self, root: &Utf8Path, path: &str) -> Result<bool>;

    /// Write `root/<descriptor_file>` for `entry`.
    fn write_descriptor(&self, root: &Utf8Path, entry: &ModEntry) -> Result<bool>;

    /// Delete `root/<descriptor_file>`. Returns `false` when there was nothing to delete.
    fn delete_descriptor(&self, root: &Utf8Path, descriptor_file: &str) -> Result<bool>;

    /// Delete `file` inside `directory`, or the whole directory when `file` is `None`.
    fn purge_mod_directory(&self, directory: &Utf8Path, file: Option<String>) -> Result<bool>;

    /// Update the load order so `top_priority` loads last.
    ///
    /// With `append_only` the existing enabled list is kept and `enabled`
    /// entries missing from it are appended; otherwise `enabled` replaces it.
    fn apply_mods(
        &self,
        root: &Utf8Path,
        enabled: &[ModEntry],
        top_priority: &[ModEntry],
        append_only: bool,
    ) -> Result<bool>;
}

/// [`ModWriter`] backed by the local file system.
#[derive(Debug, Clone)]
pub struct FsModWriter {
    lock: WriteLock,
    retry: RetryPolicy,
}

impl FsModWriter {
    pub fn new(lock: WriteLock, retry: RetryPolicy) -> Self {
        Self { lock, retry }
    }
}

impl ModWriter for FsModWriter {
    fn create_mod_directory(&self, root: &Utf8Path, path: &str) -> Result<bool> {
        let directory = root.join(path);
        if directory.is_dir() {
            return Ok(false);
        }
        let _guard = self.lock.acquire();
        self.retry
            .run(&format!("Create directory {}", directory), || {
                fs::create_dir_all(&directory)
            })?;
        tracing::debug!("Created mod directory {}", directory);
        Ok(true)
    }

    fn write_descriptor(&self, root: &Utf8Path, entry: &ModEntry) -> Result<bool> {
        let path = root.join(&entry.descriptor_file);
        let content = render_descriptor(entry);
        let _guard = self.lock.acquire();
        let written = self
            .retry
            .run(&format!("Write descriptor {}", path), || {
                write_if_changed(&path, content.as_bytes())
            })?;
        if written {
            tracing::info!("Wrote descriptor for {} to {}", entry.name, path);
        }
        Ok(written)
    }

    fn delete_descriptor(&self, root: &Utf8Path, descriptor_file: &str) -> Result<bool> {
        let path = root.join(descriptor_file);
        if !path.is_file() {
            return Ok(false);
        }
        let _guard = self.lock.acquire();
        self.retry
            .run(&format!("Delete descriptor {}", path), || fs::remove_file(&path))?;
        tracing::info!("Deleted descriptor {}", path);
        Ok(true)
    }

    fn purge_mod_directory(&self, directory: &Utf8Path, file: Option<String>) -> Result<bool> {
        let _guard = self.lock.acquire();
        match file {
            Some(file) => {
                let path = directory.join(file);
                if !path.is_file() {
                    return Ok(false);
                }
                self.retry
                    .run(&format!("Purge {}", path), || fs::remove_file(&path))?;
                tracing::debug!("Purged {}", path);
                Ok(true)
            }
            None => {
                if !directory.is_dir() {
                    return Ok(false);
                }
                self.retry
                    .run(&format!("Purge {}", directory), || fs::remove_dir_all(directory))?;
                tracing::info!("Purged mod directory {}", directory);
                Ok(true)
            }
        }
    }

    fn apply_mods(
        &self,
        root: &Utf8Path,
        enabled: &[ModEntry],
        top_priority: &[ModEntry],
        append_only: bool,
    ) -> Result<bool> {
        let path = root.join(LOAD_ORDER_FILE);
        let _guard = self.lock.acquire();

        let mut document = read_load_order(&path)?;
        let mut enabled_mods: Vec<String> = if append_only {
            document
                .get(ENABLED_MODS_KEY)
                .and_then(Value::as_array)
                .map(|mods| {
                    mods.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        for entry in enabled {
            if !enabled_mods.contains(&entry.descriptor_file) {
                enabled_mods.push(entry.descriptor_file.clone());
            }
        }
        for entry in top_priority {
            enabled_mods.retain(|m| m != &entry.descriptor_file);
            enabled_mods.push(entry.descriptor_file.clone());
        }

        document.insert(
            ENABLED_MODS_KEY.to_string(),
            Value::Array(enabled_mods.into_iter().map(Value::String).collect()),
        );
        let content = serde_json::to_string_pretty(&Value::Object(document))
            .context("Failed to serialize load order")?;

        let written = self
            .retry
            .run(&format!("Write load order {}", path), || {
                write_if_changed(&path, content.as_bytes())
            })?;
        if written {
            tracing::info!("Updated load order {}", path);
        }
        Ok(written)
    }
}

/// `key="value"` descriptor text for `entry`.
pub fn render_descriptor(entry: &ModEntry) -> String {
    let mut lines = vec![
        format!("name=\"{}\"", entry.name),
        format!("path=\"{}\"", entry.file_name),
    ];
    if !entry.version.is_empty() {
        lines.push(format!("version=\"{}\"", entry.version));
    }
    if !entry.dependencies.is_empty() {
        lines.push("dependencies={".to_string());
        for dependency in &entry.dependencies {
            lines.push(format!("\t\"{}\"", dependency));
        }
        lines.push("}".to_string());
    }
    let mut content = lines.join("\n");
    content.push('\n');
    content
}

fn read_load_order(path: &Utf8Path) -> Result<Map<String, Value>> {
    if !path.is_file() {
        return Ok(Map::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read load order: {}", path))?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => {
            tracing::warn!("Load order {} is not a JSON object, rewriting it", path);
            Ok(Map::new())
        }
    }
}

/// Write `content` to `path` unless the file already holds exactly that.
///
/// Creates missing parent directories. Returns whether a write happened.
pub(crate) fn write_if_changed(path: &Utf8Path, content: &[u8]) -> io::Result<bool> {
    if let Ok(existing) = fs::read(path) {
        if existing == content {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(true)
}
