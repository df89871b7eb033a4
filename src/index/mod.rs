//! Multi-key index over parsed definitions.
//!
//! [`IndexedDefinitions`] is the working structure of every other component:
//! the loader produces one, the detector walks one and each bucket of a
//! [`ConflictResult`](crate::models::ConflictResult) is one.
//!
//! Keys are kept in insertion order (via [`IndexMap`]), so iterating file
//! keys or type+id keys is deterministic for a given input order. Lookups on
//! unknown keys return empty results.

use crate::models::{Definition, DefinitionKey, ValueType};
use crate::paths;
use indexmap::IndexMap;

/// One node of the parent-directory tree view.
///
/// Top-level nodes are directories (`name` and `key` are the normalized
/// parent directory); their children are definitions keyed by type+id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalDefinition {
    pub name: String,
    pub key: String,
    pub file_names: Vec<String>,
    pub children: Vec<HierarchicalDefinition>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexedDefinitions {
    slots: Vec<Option<Definition>>,
    by_file: IndexMap<String, Vec<usize>>,
    by_type_and_id: IndexMap<String, Vec<usize>>,
    by_value_type: IndexMap<ValueType, Vec<usize>>,
    /// Occupied slots; removed definitions leave an empty slot behind.
    live: usize,
    allow_duplicates: bool,
}

impl IndexedDefinitions {
    /// Empty index that permits several definitions per type+id.
    pub fn new() -> Self {
        Self {
            allow_duplicates: true,
            ..Default::default()
        }
    }

    /// Build an index from `definitions`.
    pub fn with_definitions<I>(definitions: I, allow_duplicate_keys: bool) -> Self
    where
        I: IntoIterator<Item = Definition>,
    {
        let mut index = Self::default();
        index.init_map(definitions, allow_duplicate_keys);
        index
    }

    /// Replace the contents of this index.
    ///
    /// With `allow_duplicate_keys == false` at most one definition is kept
    /// per type+id; a later definition replaces an earlier one.
    pub fn init_map<I>(&mut self, definitions: I, allow_duplicate_keys: bool)
    where
        I: IntoIterator<Item = Definition>,
    {
        self.slots.clear();
        self.by_file.clear();
        self.by_type_and_id.clear();
        self.by_value_type.clear();
        self.live = 0;
        self.allow_duplicates = allow_duplicate_keys;
        for definition in definitions {
            self.add_to_map(definition);
        }
    }

    pub fn add_to_map(&mut self, definition: Definition) {
        let type_and_id = definition.type_and_id();
        if !self.allow_duplicates && self.by_type_and_id.contains_key(&type_and_id) {
            tracing::debug!("Replacing indexed definition {}", type_and_id);
            self.remove_by_type_and_id(&type_and_id);
        }

        let slot = self.slots.len();
        self.by_file.entry(definition.file_ci()).or_default().push(slot);
        self.by_type_and_id.entry(type_and_id).or_default().push(slot);
        self.by_value_type
            .entry(definition.value_type)
            .or_default()
            .push(slot);
        self.slots.push(Some(definition));
        self.live += 1;
    }

    /// Remove every definition stored under `type_and_id`.
    pub fn remove_by_type_and_id(&mut self, type_and_id: &str) -> Vec<Definition> {
        let Some(slots) = self.by_type_and_id.shift_remove(type_and_id) else {
            return Vec::new();
        };

        let mut removed = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(definition) = self.slots[slot].take() {
                remove_slot(&mut self.by_file, &definition.file_ci(), slot);
                remove_slot(&mut self.by_value_type, &definition.value_type, slot);
                removed.push(definition);
            }
        }
        self.live -= removed.len();
        removed
    }

    pub fn allows_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All definitions in insertion order.
    pub fn get_all(&self) -> Vec<&Definition> {
        self.slots.iter().flatten().collect()
    }

    /// Owned copies of all definitions, for persistence.
    pub fn to_vec(&self) -> Vec<Definition> {
        self.slots.iter().flatten().cloned().collect()
    }

    pub fn all_file_keys(&self) -> Vec<String> {
        self.by_file.keys().cloned().collect()
    }

    pub fn all_type_and_id_keys(&self) -> Vec<String> {
        self.by_type_and_id.keys().cloned().collect()
    }

    /// Definitions sharing `file` (case-insensitive, either separator).
    pub fn get_by_file(&self, file: &str) -> Vec<&Definition> {
        self.resolve(self.by_file.get(&paths::file_ci(file)))
    }

    pub fn get_by_type_and_id(&self, type_name: &str, id: &str) -> Vec<&Definition> {
        self.get_by_type_and_id_key(&format!("{}-{}", type_name, id))
    }

    pub fn get_by_type_and_id_key(&self, type_and_id: &str) -> Vec<&Definition> {
        self.resolve(self.by_type_and_id.get(type_and_id))
    }

    pub fn get_by_value_type(&self, value_type: ValueType) -> Vec<&Definition> {
        self.resolve(self.by_value_type.get(&value_type))
    }

    pub fn contains_type_and_id(&self, type_and_id: &str) -> bool {
        self.by_type_and_id.contains_key(type_and_id)
    }

    pub fn contains(&self, key: &DefinitionKey) -> bool {
        self.get_by_type_and_id_key(&key.type_and_id)
            .iter()
            .any(|d| &d.key() == key)
    }

    /// Parent-directory tree view of the indexed definitions.
    pub fn hierarchical_definitions(&self) -> Vec<HierarchicalDefinition> {
        let mut groups: IndexMap<String, HierarchicalDefinition> = IndexMap::new();

        for definition in self.slots.iter().flatten() {
            let directory = paths::normalize_path(&definition.parent_directory);
            let group = groups
                .entry(directory.to_lowercase())
                .or_insert_with(|| HierarchicalDefinition {
                    name: directory.clone(),
                    key: directory.clone(),
                    file_names: Vec::new(),
                    children: Vec::new(),
                });

            let type_and_id = definition.type_and_id();
            let child = match group.children.iter_mut().position(|c| c.key == type_and_id) {
                Some(position) => &mut group.children[position],
                None => {
                    group.children.push(HierarchicalDefinition {
                        name: definition.id.clone(),
                        key: type_and_id,
                        file_names: Vec::new(),
                        children: Vec::new(),
                    });
                    let last = group.children.len() - 1;
                    &mut group.children[last]
                }
            };

            for file in definition.file_names.iter().chain(std::iter::once(&definition.file)) {
                push_unique_file(&mut child.file_names, file);
                push_unique_file(&mut group.file_names, file);
            }
        }

        groups.into_values().collect()
    }

    fn resolve(&self, slots: Option<&Vec<usize>>) -> Vec<&Definition> {
        slots
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|slot| self.slots[*slot].as_ref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn remove_slot<K>(map: &mut IndexMap<K, Vec<usize>>, key: &K, slot: usize)
where
    K: std::hash::Hash + Eq,
{
    let now_empty = match map.get_mut(key) {
        Some(slots) => {
            slots.retain(|s| *s != slot);
            slots.is_empty()
        }
        None => false,
    };
    if now_empty {
        map.shift_remove(key);
    }
}

fn push_unique_file(files: &mut Vec<String>, file: &str) {
    if file.is_empty() {
        return;
    }
    let key = paths::file_ci(file);
    if !files.iter().any(|f| paths::file_ci(f) == key) {
        files.push(file.to_string());
    }
}
