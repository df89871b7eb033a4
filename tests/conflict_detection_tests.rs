//! Integration tests for ConflictDetector
//!
//! These tests verify:
//! - Identical content never conflicts
//! - One representative per distinct code hash
//! - Orphan conflicts from shared files
//! - Dependencies explaining overrides
//! - Overwritten object synthesis

use modpatch::IndexedDefinitions;
use modpatch::models::{Definition, ValueType};
use modpatch::services::{ConflictDetector, PathRulesProvider, PriorityResolver, RulesRegistry};
use proptest::prelude::*;
use std::sync::Arc;

fn detector(load_order: &[&str]) -> ConflictDetector {
    let rules = RulesRegistry::new().with_provider(Arc::new(PathRulesProvider::new(
        "Stellaris",
        ["common/on_actions"],
    )));
    ConflictDetector::new(PriorityResolver::new(rules, "Stellaris", load_order.iter().copied()))
}

fn object(type_name: &str, id: &str, mod_name: &str, file: &str, code: &str) -> Definition {
    Definition::new(type_name, id, mod_name, file).with_code(code)
}

#[test]
fn test_identical_content_is_not_a_conflict() {
    let index = IndexedDefinitions::with_definitions(
        vec![
            object("events", "e1", "ModA", "events/a.txt", "e1 = { x }"),
            object("events", "e1", "ModB", "events/b.txt", "e1 = { x }"),
        ],
        true,
    );

    let result = detector(&["ModA", "ModB"]).find_conflicts(index).unwrap();

    assert!(result.conflicts.is_empty());
    assert!(result.orphan_conflicts.is_empty());
    assert_eq!(result.all_conflicts.len(), 2);
}

#[test]
fn test_one_representative_per_distinct_hash() {
    let index = IndexedDefinitions::with_definitions(
        vec![
            object("events", "e1", "ModA", "events/a.txt", "e1 = { x }"),
            object("events", "e1", "ModB", "events/b.txt", "e1 = { y }"),
            object("events", "e1", "ModC", "events/c.txt", "e1 = { x }"),
        ],
        true,
    );

    let result = detector(&["ModA", "ModB", "ModC"]).find_conflicts(index).unwrap();

    let flagged = result.conflicts.get_by_type_and_id_key("events-e1");
    assert_eq!(flagged.len(), 2);
    let mut mods: Vec<_> = flagged.iter().map(|d| d.mod_name.as_str()).collect();
    mods.sort_unstable();
    // LIOS between a.txt and c.txt keeps c.txt
    assert_eq!(mods, vec!["ModB", "ModC"]);
}

#[test]
fn test_shared_file_yields_orphan_conflicts() {
    let index = IndexedDefinitions::with_definitions(
        vec![
            object("events", "e1", "ModA", "events/shared.txt", "e1 = { }"),
            object("events", "e2", "ModB", "events/shared.txt", "e2 = { }"),
        ],
        true,
    );

    let result = detector(&["ModA", "ModB"]).find_conflicts(index).unwrap();

    assert!(result.conflicts.is_empty());
    assert_eq!(result.orphan_conflicts.len(), 2);
    assert!(result.orphan_conflicts.contains_type_and_id("events-e1"));
    assert!(result.orphan_conflicts.contains_type_and_id("events-e2"));
}

#[test]
fn test_dependency_explains_shared_file() {
    // The verdict is cached per file: the first definition evaluated decides
    let index = IndexedDefinitions::with_definitions(
        vec![
            object("events", "e2", "ModB", "events/shared.txt", "e2 = { }").with_dependencies(["ModA"]),
            object("events", "e1", "ModA", "events/shared.txt", "e1 = { }"),
        ],
        true,
    );

    let result = detector(&["ModA", "ModB"]).find_conflicts(index).unwrap();

    assert!(result.orphan_conflicts.is_empty());
    assert!(result.conflicts.is_empty());
}

#[test]
fn test_dependency_explains_competing_definition() {
    let index = IndexedDefinitions::with_definitions(
        vec![
            object("events", "e1", "ModA", "events/a.txt", "e1 = { x }"),
            object("events", "e1", "ModB", "events/b.txt", "e1 = { y }").with_dependencies(["ModA"]),
        ],
        true,
    );

    let result = detector(&["ModA", "ModB"]).find_conflicts(index).unwrap();

    assert!(result.conflicts.is_empty());
}

#[test]
fn test_variables_do_not_compete() {
    let index = IndexedDefinitions::with_definitions(
        vec![
            object("events", "@cost", "ModA", "events/a.txt", "@cost = 1").with_value_type(ValueType::Variable),
            object("events", "@cost", "ModB", "events/b.txt", "@cost = 2").with_value_type(ValueType::Variable),
        ],
        true,
    );

    let result = detector(&["ModA", "ModB"]).find_conflicts(index).unwrap();

    assert!(result.conflicts.is_empty());
    assert!(result.orphan_conflicts.is_empty());
}

#[test]
fn test_overwritten_objects_are_merged() {
    let index = IndexedDefinitions::with_definitions(
        vec![
            object("gfx", "icon", "ModA", "gfx/a.gfx", "icon = { a }").with_value_type(ValueType::OverwrittenObject),
            object("gfx", "icon", "ModB", "gfx/b.gfx", "icon = { b }").with_value_type(ValueType::OverwrittenObject),
        ],
        true,
    );

    let result = detector(&["ModA", "ModB"]).find_conflicts(index).unwrap();

    let overwritten = result.overwritten_conflicts.get_by_type_and_id_key("gfx-icon");
    assert_eq!(overwritten.len(), 1);
    let merged = overwritten[0];
    // LIOS keeps b.gfx; the exported file is named after the id with the LIOS prefix
    assert_eq!(merged.mod_name, "ModB");
    assert_eq!(merged.file, "gfx/zzz_icon.gfx");
    assert!(merged.file_names.iter().any(|f| f == "gfx/a.gfx"));
    assert!(merged.file_names.iter().any(|f| f == "gfx/b.gfx"));
}

#[test]
fn test_empty_index() {
    let result = detector(&[]).find_conflicts(IndexedDefinitions::new()).unwrap();

    assert!(result.all_conflicts.is_empty());
    assert!(result.conflicts.is_empty());
    assert!(result.overwritten_conflicts.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_same_code_never_conflicts(mod_count in 2usize..8, code in "[a-z ]{0,24}") {
        let mods: Vec<String> = (0..mod_count).map(|i| format!("Mod{}", i)).collect();
        let definitions: Vec<Definition> = mods
            .iter()
            .enumerate()
            .map(|(i, m)| object("events", "e1", m, &format!("events/{}.txt", i), &code))
            .collect();
        let load_order: Vec<&str> = mods.iter().map(String::as_str).collect();

        let result = detector(&load_order)
            .find_conflicts(IndexedDefinitions::with_definitions(definitions, true))
            .unwrap();

        prop_assert!(result.conflicts.is_empty());
        prop_assert!(result.orphan_conflicts.is_empty());
    }

    #[test]
    fn prop_detection_is_deterministic(codes in prop::collection::vec(0u8..3, 2..6)) {
        let definitions: Vec<Definition> = codes
            .iter()
            .enumerate()
            .map(|(i, c)| object("events", "e1", &format!("Mod{}", i), &format!("events/{}.txt", i), &format!("e1 = {{ {} }}", c)))
            .collect();
        let load_order: Vec<String> = (0..codes.len()).map(|i| format!("Mod{}", i)).collect();
        let load_order: Vec<&str> = load_order.iter().map(String::as_str).collect();
        let detector = detector(&load_order);

        let first = detector
            .find_conflicts(IndexedDefinitions::with_definitions(definitions.clone(), true))
            .unwrap();
        let second = detector
            .find_conflicts(IndexedDefinitions::with_definitions(definitions, true))
            .unwrap();

        prop_assert_eq!(first.conflicts.to_vec(), second.conflicts.to_vec());

        let mut distinct = codes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        let expected = if distinct.len() > 1 { distinct.len() } else { 0 };
        prop_assert_eq!(first.conflicts.len(), expected);
    }
}
