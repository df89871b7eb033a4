use super::PatchState;
use crate::index::IndexedDefinitions;

/// Output of one conflict detection pass plus the decisions layered on top.
#[derive(Debug, Clone, Default)]
pub struct ConflictResult {
    /// Everything that was analyzed.
    pub all_conflicts: IndexedDefinitions,
    /// Keys with two or more competing definitions.
    pub conflicts: IndexedDefinitions,
    /// Keys flagged only because their file is shared by several mods.
    pub orphan_conflicts: IndexedDefinitions,
    /// Synthesized winners of overwritten-object clusters.
    pub overwritten_conflicts: IndexedDefinitions,
    pub resolved_conflicts: IndexedDefinitions,
    pub ignored_conflicts: IndexedDefinitions,
    /// Definitions excluded by `ignored_paths` rules.
    pub rule_ignored_conflicts: IndexedDefinitions,
    /// Raw newline-delimited path rules.
    pub ignored_paths: String,
}

impl ConflictResult {
    /// Whether `type_and_id` has been resolved, ignored or rule-ignored.
    pub fn is_handled(&self, type_and_id: &str) -> bool {
        self.resolved_conflicts.contains_type_and_id(type_and_id)
            || self.ignored_conflicts.contains_type_and_id(type_and_id)
            || self.rule_ignored_conflicts.contains_type_and_id(type_and_id)
    }

    /// Snapshot of every bucket for persistence. History is left empty.
    pub fn to_patch_state(&self) -> PatchState {
        PatchState {
            conflicts: self.conflicts.to_vec(),
            orphan_conflicts: self.orphan_conflicts.to_vec(),
            overwritten_conflicts: self.overwritten_conflicts.to_vec(),
            resolved_conflicts: self.resolved_conflicts.to_vec(),
            ignored_conflicts: self.ignored_conflicts.to_vec(),
            rule_ignored_conflicts: self.rule_ignored_conflicts.to_vec(),
            ignore_conflict_paths: self.ignored_paths.clone(),
            conflict_history: Vec::new(),
        }
    }

    /// Conflict keys that still need a decision.
    pub fn pending_type_and_id_keys(&self) -> Vec<String> {
        self.conflicts
            .all_type_and_id_keys()
            .into_iter()
            .filter(|key| !self.is_handled(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Definition;

    #[test]
    fn test_pending_keys_skip_handled() {
        let a = Definition::new("events", "e1", "ModA", "events/a.txt").with_code("a");
        let b = Definition::new("events", "e1", "ModB", "events/b.txt").with_code("b");
        let c = Definition::new("events", "e2", "ModA", "events/a.txt").with_code("c");
        let d = Definition::new("events", "e2", "ModB", "events/b.txt").with_code("d");

        let mut result = ConflictResult {
            conflicts: IndexedDefinitions::with_definitions(vec![a.clone(), b, c, d], true),
            resolved_conflicts: IndexedDefinitions::new(),
            ..Default::default()
        };
        result.resolved_conflicts.add_to_map(a);

        assert_eq!(result.pending_type_and_id_keys(), vec!["events-e2".to_string()]);
    }
}
