use super::Definition;
use serde::{Deserialize, Serialize};

/// Persisted resolution decisions for one patch collection.
///
/// Stored as `state.json` inside the patch directory. Every collection
/// defaults to empty so that older or partial documents still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchState {
    pub conflicts: Vec<Definition>,
    pub orphan_conflicts: Vec<Definition>,
    pub overwritten_conflicts: Vec<Definition>,
    pub resolved_conflicts: Vec<Definition>,
    pub ignored_conflicts: Vec<Definition>,
    /// Snapshot of path-rule exclusions at save time. Recomputed from
    /// `ignore_conflict_paths` on load, never read back as decisions.
    pub rule_ignored_conflicts: Vec<Definition>,
    pub ignore_conflict_paths: String,
    /// Last exported code per type+id.
    pub conflict_history: Vec<Definition>,
}

impl PatchState {
    /// Last exported definition for `type_and_id`, if any.
    pub fn history_for(&self, type_and_id: &str) -> Option<&Definition> {
        self.conflict_history
            .iter()
            .find(|d| d.type_and_id() == type_and_id)
    }

    /// Insert or replace history entries by type+id.
    pub fn record_history<'a, I>(&mut self, definitions: I)
    where
        I: IntoIterator<Item = &'a Definition>,
    {
        for definition in definitions {
            let key = definition.type_and_id();
            match self
                .conflict_history
                .iter_mut()
                .find(|d| d.type_and_id() == key)
            {
                Some(existing) => *existing = definition.clone(),
                None => self.conflict_history.push(definition.clone()),
            }
        }
    }

    pub fn resolved_for<'a>(&'a self, type_and_id: &'a str) -> impl Iterator<Item = &'a Definition> {
        self.resolved_conflicts
            .iter()
            .filter(move |d| d.type_and_id() == type_and_id)
    }

    pub fn ignored_for<'a>(&'a self, type_and_id: &'a str) -> impl Iterator<Item = &'a Definition> {
        self.ignored_conflicts
            .iter()
            .filter(move |d| d.type_and_id() == type_and_id)
    }
}
