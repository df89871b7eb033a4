use crate::paths;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of content a [`Definition`] carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[default]
    Object,
    Variable,
    Namespace,
    OverwrittenObject,
    WholeTextFile,
    Binary,
    Invalid,
}

impl ValueType {
    /// Whether definitions of this kind compete in conflict detection.
    ///
    /// Variables, namespaces and invalid records are merged into the objects
    /// that use them and never compete on their own.
    pub fn is_conflict_candidate(self) -> bool {
        !matches!(self, Self::Variable | Self::Namespace | Self::Invalid)
    }
}

/// One parsed unit of mod content.
///
/// Produced by a [`DefinitionParser`](crate::services::DefinitionParser) and
/// treated as a value afterwards: indexes and conflict sets hold clones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Definition {
    pub id: String,
    pub type_name: String,
    pub file: String,
    pub file_names: Vec<String>,
    pub parent_directory: String,
    pub mod_name: String,
    pub code: String,
    pub content_sha: String,
    pub definition_sha: String,
    pub dependencies: Vec<String>,
    pub value_type: ValueType,
    pub is_first_level: bool,
    pub error_line: Option<usize>,
    pub error_column: Option<usize>,
    pub error_message: Option<String>,
    pub used_parser: Option<String>,
}

/// Identity of a definition inside sets and accumulators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionKey {
    pub mod_name: String,
    pub file_ci: String,
    pub type_and_id: String,
    pub definition_sha: String,
}

impl Definition {
    /// Create a first-level object definition for `file` owned by `mod_name`.
    pub fn new(
        type_name: impl Into<String>,
        id: impl Into<String>,
        mod_name: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        let file = file.into();
        Self {
            id: id.into(),
            type_name: type_name.into(),
            parent_directory: paths::parent_directory(&file),
            file_names: vec![file.clone()],
            file,
            mod_name: mod_name.into(),
            is_first_level: true,
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.set_code(code);
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_content_sha(mut self, content_sha: impl Into<String>) -> Self {
        self.content_sha = content_sha.into();
        self
    }

    /// Replace the code and recompute `definition_sha`.
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.definition_sha = hash_code(&self.code);
    }

    /// Conflict grouping key: `type-id`.
    pub fn type_and_id(&self) -> String {
        format!("{}-{}", self.type_name, self.id)
    }

    /// Case-insensitive file grouping key.
    pub fn file_ci(&self) -> String {
        paths::file_ci(&self.file)
    }

    pub fn key(&self) -> DefinitionKey {
        DefinitionKey {
            mod_name: self.mod_name.clone(),
            file_ci: self.file_ci(),
            type_and_id: self.type_and_id(),
            definition_sha: self.definition_sha.clone(),
        }
    }

    pub fn is_conflict_candidate(&self) -> bool {
        self.value_type.is_conflict_candidate()
    }

    pub fn has_error(&self) -> bool {
        self.error_message.is_some()
    }

    /// Add a contributing file unless it's already listed (case-insensitive).
    pub fn add_file_name(&mut self, file: &str) {
        let key = paths::file_ci(file);
        if !self.file_names.iter().any(|f| paths::file_ci(f) == key) {
            self.file_names.push(file.to_string());
        }
    }

    /// Whether this definition's mod declares a dependency on `mod_name`.
    pub fn depends_on(&self, mod_name: &str) -> bool {
        self.dependencies.iter().any(|d| d == mod_name)
    }
}

/// SHA-256 of a code block as lowercase hex.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of raw bytes as lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
