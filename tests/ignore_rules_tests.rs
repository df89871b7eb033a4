//! Integration tests for path rules
//!
//! These tests verify:
//! - Ignore and include rules over the hierarchical conflict view
//! - Rule text is the only persisted decision
//! - Saving ignored paths through the collection service

use camino::Utf8PathBuf;
use modpatch::models::{AppConfig, ConflictResult, Definition};
use modpatch::services::{IgnoreRules, evaluate_ignore_rules};
use modpatch::{IndexedDefinitions, Metrics, PatchCollectionService};
use std::sync::Arc;
use tempfile::TempDir;

fn conflicts() -> ConflictResult {
    let definitions = vec![
        Definition::new("common/events", "e1", "ModA", "common/events/a.txt").with_code("a"),
        Definition::new("common/events", "e1", "ModB", "common/events/b.txt").with_code("b"),
        Definition::new("common/events", "special", "ModA", "common/events/special.txt").with_code("a"),
        Definition::new("common/events", "special", "ModB", "common/events/special.txt").with_code("b"),
        Definition::new("common/buildings", "farm", "ModA", "common/buildings/a.txt").with_code("a"),
        Definition::new("common/buildings", "farm", "ModB", "common/buildings/b.txt").with_code("b"),
    ];
    ConflictResult {
        conflicts: IndexedDefinitions::with_definitions(definitions, true),
        ..Default::default()
    }
}

#[test]
fn test_ignore_with_include_exception() {
    let mut result = conflicts();
    result.ignored_paths = "common/events\n!common/events/special.txt".to_string();

    evaluate_ignore_rules(&mut result);

    assert!(result.rule_ignored_conflicts.contains_type_and_id("common/events-e1"));
    assert!(!result.rule_ignored_conflicts.contains_type_and_id("common/events-special"));
    assert!(!result.rule_ignored_conflicts.contains_type_and_id("common/buildings-farm"));
    assert_eq!(result.rule_ignored_conflicts.len(), 2);

    let pending = result.pending_type_and_id_keys();
    assert!(pending.contains(&"common/events-special".to_string()));
    assert!(pending.contains(&"common/buildings-farm".to_string()));
    assert!(!pending.contains(&"common/events-e1".to_string()));
}

#[test]
fn test_rule_normalization() {
    let rules = IgnoreRules::parse("  # buildings are fine\n\n\\Common\\Buildings\\  \n");
    let files = vec!["common/buildings/a.txt".to_string()];

    assert!(!rules.is_empty());
    assert!(rules.is_ignored("common/buildings", &files));
    assert!(!rules.is_ignored("common/events", &Vec::new()));
}

#[test]
fn test_include_only_rules_ignore_nothing() {
    let mut result = conflicts();
    result.ignored_paths = "!common/events".to_string();

    evaluate_ignore_rules(&mut result);

    assert!(result.rule_ignored_conflicts.is_empty());
}

#[test]
fn test_save_ignored_paths_persists_text() {
    let temp_dir = TempDir::new().unwrap();
    let user_directory = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let mut config = AppConfig::default();
    config.game.user_directory = user_directory.to_string();
    let service = PatchCollectionService::from_config(&config, Arc::new(Metrics::new()));

    let mut result = conflicts();
    result.ignored_paths = "common/buildings".to_string();
    assert!(service.save_ignored_paths(&mut result).unwrap());
    assert_eq!(result.rule_ignored_conflicts.len(), 2);

    // Rule-ignored definitions are recomputed from the text on load
    let reloaded = service.load_patch_state(conflicts()).unwrap();
    assert_eq!(reloaded.ignored_paths, "common/buildings");
    assert!(reloaded.rule_ignored_conflicts.contains_type_and_id("common/buildings-farm"));
    assert!(!reloaded.rule_ignored_conflicts.contains_type_and_id("common/events-e1"));
}
