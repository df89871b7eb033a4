//! Path rules that hide conflicts from the resolution workflow.
//!
//! Rule text is newline separated. Blank lines and lines starting with `#`
//! are skipped, a leading `!` turns a rule into an include rule. Matching is
//! a case-insensitive prefix test against `/`-normalized paths.
//!
//! ```text
//! # hide every event conflict
//! common/events
//! # except this file
//! !common/events/special.txt
//! ```

use crate::index::IndexedDefinitions;
use crate::models::ConflictResult;
use crate::paths;

/// Parsed ignore and include rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    ignore: Vec<String>,
    include: Vec<String>,
}

impl IgnoreRules {
    pub fn parse(text: &str) -> Self {
        let mut rules = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.strip_prefix('!') {
                Some(include) => {
                    let include = paths::file_ci(include.trim_start_matches('!'));
                    if !include.is_empty() {
                        rules.include.push(include);
                    }
                }
                None => rules.ignore.push(paths::file_ci(line)),
            }
        }
        rules
    }

    pub fn is_empty(&self) -> bool {
        self.ignore.is_empty()
    }

    /// Whether a definition under `group_path` spanning `files` is ignored.
    pub fn is_ignored<'a, I>(&self, group_path: &str, files: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut group = paths::file_ci(group_path);
        if !group.ends_with('/') {
            group.push('/');
        }
        let files: Vec<String> = files.into_iter().map(|f| paths::file_ci(f)).collect();

        let matches = |rule: &String| {
            group.starts_with(rule.as_str()) || files.iter().any(|f| f.starts_with(rule.as_str()))
        };

        self.ignore.iter().any(&matches) && !self.include.iter().any(&matches)
    }
}

/// Recompute `rule_ignored_conflicts` from `result.ignored_paths`.
///
/// Walks the parent-directory view of `conflicts`; every definition of a
/// child matched by the rules is placed in the rule-ignored bucket.
pub fn evaluate_ignore_rules(result: &mut ConflictResult) {
    let rules = IgnoreRules::parse(&result.ignored_paths);
    let mut rule_ignored = IndexedDefinitions::new();

    if !rules.is_empty() {
        for group in result.conflicts.hierarchical_definitions() {
            for child in &group.children {
                if rules.is_ignored(&group.name, &child.file_names) {
                    for definition in result.conflicts.get_by_type_and_id_key(&child.key) {
                        rule_ignored.add_to_map(definition.clone());
                    }
                }
            }
        }
    }

    tracing::debug!("Path rules ignore {} conflict definitions", rule_ignored.len());
    result.rule_ignored_conflicts = rule_ignored;
}
