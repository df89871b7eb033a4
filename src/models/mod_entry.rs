use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Directory under the game's user directory that holds mods and patches.
pub const MOD_DIRECTORY: &str = "mod";

/// The selected game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameContext {
    pub game_type: String,
    pub user_directory: Utf8PathBuf,
}

impl GameContext {
    pub fn new(game_type: impl Into<String>, user_directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            game_type: game_type.into(),
            user_directory: user_directory.into(),
        }
    }

    /// `<user_dir>/mod`
    pub fn mod_root(&self) -> Utf8PathBuf {
        self.user_directory.join(MOD_DIRECTORY)
    }

    /// `<user_dir>/mod/<patch_name>`
    pub fn patch_directory(&self, patch_name: &str) -> Utf8PathBuf {
        self.mod_root().join(patch_name)
    }
}

/// An installed mod taking part in the active collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModEntry {
    pub name: String,
    /// Absolute path of the mod's content root.
    pub full_path: Utf8PathBuf,
    /// Descriptor path relative to the user directory (`mod/<name>.mod`).
    pub descriptor_file: String,
    /// Content folder relative to the user directory.
    pub file_name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub version: String,
}

impl ModEntry {
    pub fn new(name: impl Into<String>, full_path: impl AsRef<Utf8Path>) -> Self {
        let name = name.into();
        let full_path = full_path.as_ref().to_path_buf();
        let folder = full_path.file_name().unwrap_or(name.as_str()).to_string();
        Self {
            descriptor_file: format!("{}/{}.mod", MOD_DIRECTORY, folder),
            file_name: format!("{}/{}", MOD_DIRECTORY, folder),
            name,
            full_path,
            dependencies: Vec::new(),
            version: String::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}
