use crate::metrics::Metrics;
use crate::models::{Definition, ModEntry, PatchState, ValueType};
use crate::paths;
use crate::services::retry::{RetryError, RetryPolicy};
use crate::services::rules::{RulesRegistry, object_file_name};
use crate::services::writer::{WriteLock, write_if_changed};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use walkdir::WalkDir;

/// Name of the persisted state document inside a patch directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Errors that can occur while writing a patch
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    RetriesExhausted(#[from] RetryError),

    #[error("Failed to serialize patch state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to copy patch {from} to {to}: {message}")]
    Copy {
        from: String,
        to: String,
        message: String,
    },
}

/// Definitions to write into one patch.
#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    pub game_type: &'a str,
    /// `<user_dir>/mod`
    pub root_path: &'a Utf8Path,
    pub patch_name: &'a str,
    pub definitions: &'a [Definition],
    /// Installed mods, used to locate the source of binary definitions.
    pub mods: &'a [ModEntry],
}

/// State document to persist for one patch.
#[derive(Debug, Clone)]
pub struct SaveStateRequest<'a> {
    pub root_path: &'a Utf8Path,
    pub patch_name: &'a str,
    /// Conflict buckets and decisions; its history is replaced by the stored one.
    pub state: PatchState,
    /// Definitions exported by this operation, recorded in the history.
    pub exported: &'a [Definition],
}

/// Writes resolved definitions into a patch directory and persists its state.
///
/// File writes go through the shared [`WriteLock`] and are retried by the
/// configured [`RetryPolicy`]. A file that already holds the exported code is
/// left untouched.
pub struct PatchExporter {
    rules: RulesRegistry,
    lock: WriteLock,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
    cache: Mutex<HashMap<Utf8PathBuf, PatchState>>,
}

impl PatchExporter {
    pub fn new(rules: RulesRegistry, lock: WriteLock, retry: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            rules,
            lock,
            retry,
            metrics,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Path `definition` occupies inside a patch directory.
    ///
    /// Whole files and synthesized overwritten objects keep their file;
    /// object definitions go where the game's rules provider names them.
    pub fn export_path(&self, game_type: &str, definition: &Definition) -> String {
        match definition.value_type {
            ValueType::WholeTextFile | ValueType::Binary | ValueType::OverwrittenObject => {
                paths::normalize_path(&definition.file)
            }
            _ => match self.rules.provider_for(game_type) {
                Some(provider) => paths::normalize_path(&provider.get_file_name(definition)),
                None => object_file_name(definition, ""),
            },
        }
    }

    /// Write every definition of `request` into the patch directory.
    ///
    /// # Returns
    /// `Ok(false)` when there was nothing to export
    pub fn export_definitions(&self, request: &ExportRequest<'_>) -> Result<bool, ExportError> {
        if request.definitions.is_empty() {
            return Ok(false);
        }

        let patch_directory = request.root_path.join(request.patch_name);
        let _guard = self.lock.acquire();

        for definition in request.definitions {
            let relative = self.export_path(request.game_type, definition);
            let target = patch_directory.join(&relative);

            let content = match definition.value_type {
                ValueType::Binary => match self.read_binary_source(definition, request.mods) {
                    Some(content) => content,
                    None => continue,
                },
                _ => definition.code.clone().into_bytes(),
            };

            let written = self
                .retry
                .run(&format!("Export {}", target), || write_if_changed(&target, &content))?;
            if written {
                tracing::debug!("Exported {} from {} to {}", definition.type_and_id(), definition.mod_name, target);
                self.metrics.record_file_exported();
            } else {
                tracing::debug!("Skipped unchanged export {}", target);
                self.metrics.record_export_unchanged();
            }
        }

        Ok(true)
    }

    fn read_binary_source(&self, definition: &Definition, mods: &[ModEntry]) -> Option<Vec<u8>> {
        let source = mods
            .iter()
            .find(|m| m.name == definition.mod_name)
            .map(|m| m.full_path.join(paths::normalize_path(&definition.file)));
        match source.as_deref().map(fs::read) {
            Some(Ok(content)) => Some(content),
            Some(Err(e)) => {
                tracing::warn!("Cannot read binary source for {}: {}", definition.file, e);
                None
            }
            None => {
                tracing::warn!("Mod {} not installed, skipping binary {}", definition.mod_name, definition.file);
                None
            }
        }
    }

    /// Persist `request.state`, carrying the stored conflict history forward.
    pub fn save_state(&self, request: SaveStateRequest<'_>) -> Result<bool, ExportError> {
        let state_path = state_path(request.root_path, request.patch_name);
        let mut state = request.state;
        state.conflict_history = self
            .get_patch_state(request.root_path, request.patch_name)
            .map(|previous| previous.conflict_history)
            .unwrap_or_default();
        state.record_history(request.exported);

        let json = serde_json::to_string_pretty(&state)?;
        let written = {
            let _guard = self.lock.acquire();
            self.retry
                .run(&format!("Save state {}", state_path), || {
                    write_if_changed(&state_path, json.as_bytes())
                })?
        };
        if written {
            tracing::info!("Saved patch state {}", state_path);
            self.metrics.record_state_save();
        }

        self.cache_lock().insert(state_path, state);
        Ok(true)
    }

    /// Previously saved state of `patch_name`.
    ///
    /// Returns `None` when there is no state or it cannot be read; a corrupt
    /// document is logged and treated as absent.
    pub fn get_patch_state(&self, root_path: &Utf8Path, patch_name: &str) -> Option<PatchState> {
        let state_path = state_path(root_path, patch_name);
        if let Some(state) = self.cache_lock().get(&state_path) {
            return Some(state.clone());
        }
        if !state_path.is_file() {
            return None;
        }

        let content = match fs::read_to_string(&state_path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read patch state {}: {}", state_path, e);
                return None;
            }
        };
        match serde_json::from_str::<PatchState>(&content) {
            Ok(state) => {
                self.cache_lock().insert(state_path, state.clone());
                Some(state)
            }
            Err(e) => {
                tracing::warn!("Patch state {} is corrupt, ignoring it: {}", state_path, e);
                None
            }
        }
    }

    pub fn reset_cache(&self) {
        self.cache_lock().clear();
    }

    /// Copy patch directory `from` to `to` under `root_path`.
    ///
    /// # Returns
    /// `Ok(false)` when `from` does not exist
    pub fn copy_patch_mod(&self, root_path: &Utf8Path, from: &str, to: &str) -> Result<bool, ExportError> {
        let source = root_path.join(from);
        let target = root_path.join(to);
        if !source.is_dir() {
            return Ok(false);
        }

        let _guard = self.lock.acquire();
        for entry in WalkDir::new(&source).sort_by_file_name() {
            let entry = entry.map_err(|e| ExportError::Copy {
                from: source.to_string(),
                to: target.to_string(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source.as_std_path())
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            let destination = target.join(paths::normalize_path(&relative));
            let content = fs::read(entry.path()).map_err(|e| ExportError::Copy {
                from: source.to_string(),
                to: target.to_string(),
                message: e.to_string(),
            })?;
            self.retry
                .run(&format!("Copy {}", destination), || write_if_changed(&destination, &content))?;
        }

        tracing::info!("Copied patch {} to {}", source, target);
        self.cache_lock().remove(&state_path(root_path, to));
        Ok(true)
    }

    /// Rename patch directory `from` to `to` under `root_path`.
    pub fn rename_patch_mod(&self, root_path: &Utf8Path, from: &str, to: &str) -> Result<bool, ExportError> {
        let source = root_path.join(from);
        let target = root_path.join(to);
        if !source.is_dir() {
            return Ok(false);
        }

        {
            let _guard = self.lock.acquire();
            self.retry
                .run(&format!("Rename {}", source), || fs::rename(&source, &target))?;
        }

        tracing::info!("Renamed patch {} to {}", source, target);
        let mut cache = self.cache_lock();
        cache.remove(&state_path(root_path, from));
        cache.remove(&state_path(root_path, to));
        Ok(true)
    }

    fn cache_lock(&self) -> std::sync::MutexGuard<'_, HashMap<Utf8PathBuf, PatchState>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `<root>/<patch>/state.json`
pub fn state_path(root_path: &Utf8Path, patch_name: &str) -> Utf8PathBuf {
    root_path.join(patch_name).join(STATE_FILE_NAME)
}
