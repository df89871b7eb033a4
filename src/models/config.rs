use super::{GameContext, ModEntry};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration from `ModPatch Config.yaml`
///
/// Every section has defaults so that a partial file (or none at all) still
/// produces a usable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub game: GameSettings,

    #[serde(default)]
    pub collection: CollectionSettings,

    #[serde(default)]
    pub patch: PatchSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default = "default_game_type")]
    pub game_type: String,

    /// Game user directory holding `mod/` and the load order documents.
    #[serde(default)]
    pub user_directory: String,

    /// Type path prefixes that use first-in-order-wins rules.
    #[serde(default)]
    pub fios_paths: Vec<String>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            game_type: default_game_type(),
            user_directory: String::new(),
            fios_paths: Vec::new(),
        }
    }
}

/// The active collection, mods listed in load order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSettings {
    #[serde(default = "default_collection_name")]
    pub name: String,

    #[serde(default)]
    pub mods: Vec<ModSettings>,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            name: default_collection_name(),
            mods: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModSettings {
    pub name: String,
    pub path: String,

    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSettings {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Concurrent mod parsing tasks.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            worker_threads: default_worker_threads(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_true")]
    pub console_output: bool,

    /// Write the log file as JSON lines instead of plain text
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            debug_mode: false,
            console_output: true,
            json_format: false,
        }
    }
}

fn default_game_type() -> String {
    "Stellaris".to_string()
}

fn default_collection_name() -> String {
    "Default".to_string()
}

fn default_name_prefix() -> String {
    "ModPatch_".to_string()
}

fn default_worker_threads() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    100
}

fn default_backoff() -> Backoff {
    Backoff::Exponential
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "modpatch".to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// The selected game as a [`GameContext`].
    pub fn game_context(&self) -> GameContext {
        GameContext::new(
            self.game.game_type.clone(),
            Utf8PathBuf::from(&self.game.user_directory),
        )
    }

    /// The collection's mods in load order.
    pub fn mod_entries(&self) -> Vec<ModEntry> {
        self.collection
            .mods
            .iter()
            .map(|m| ModEntry::new(m.name.clone(), Utf8PathBuf::from(&m.path)).with_dependencies(m.dependencies.clone()))
            .collect()
    }

    /// Check whether a type path uses first-in-order-wins rules
    pub fn uses_fios(&self, type_name: &str) -> bool {
        let normalized = crate::paths::file_ci(type_name);
        self.game
            .fios_paths
            .iter()
            .any(|p| normalized.starts_with(&crate::paths::file_ci(p)))
    }
}
