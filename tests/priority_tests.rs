//! Integration tests for PriorityResolver
//!
//! These tests verify:
//! - Mod order wins when every candidate shares one file
//! - FIOS and LIOS selection by file name
//! - Fallback to mod order without a rules provider
//! - Determinism of the selection

use modpatch::models::Definition;
use modpatch::services::{PathRulesProvider, PriorityPolicy, PriorityResolver, RulesRegistry};
use proptest::prelude::*;
use std::sync::Arc;

fn rules() -> RulesRegistry {
    RulesRegistry::new().with_provider(Arc::new(PathRulesProvider::new("Stellaris", ["common/on_actions"])))
}

fn resolver<'a>(load_order: impl IntoIterator<Item = &'a str>) -> PriorityResolver {
    PriorityResolver::new(rules(), "Stellaris", load_order)
}

#[test]
fn test_mod_order_same_file() {
    let load_order = ["Base", "Other", "ModX", "Filler", "Late", "ModY"];
    let x = Definition::new("events", "e1", "ModX", "events/shared.txt").with_code("x");
    let y = Definition::new("events", "e1", "ModY", "events/shared.txt").with_code("y");

    let result = resolver(load_order).evaluate([&y, &x]);

    assert_eq!(result.policy, PriorityPolicy::ModOrder);
    assert_eq!(result.definition.unwrap().mod_name, "ModY");
}

#[test]
fn test_fios_picks_first_file_name() {
    let b = Definition::new("common/on_actions", "on_startup", "ModB", "common/on_actions/b.txt").with_code("b");
    let a = Definition::new("common/on_actions", "on_startup", "ModA", "common/on_actions/a.txt").with_code("a");

    let result = resolver(["ModA", "ModB"]).evaluate([&b, &a]);

    assert_eq!(result.policy, PriorityPolicy::Fios);
    assert_eq!(result.definition.unwrap().file, "common/on_actions/a.txt");
}

#[test]
fn test_lios_picks_last_file_name() {
    let b = Definition::new("events", "e1", "ModB", "events/b.txt").with_code("b");
    let a = Definition::new("events", "e1", "ModA", "events/a.txt").with_code("a");

    let result = resolver(["ModB", "ModA"]).evaluate([&b, &a]);

    assert_eq!(result.policy, PriorityPolicy::Lios);
    assert_eq!(result.definition.unwrap().file, "events/b.txt");
}

#[test]
fn test_single_candidate() {
    let a = Definition::new("events", "e1", "ModA", "events/a.txt");
    let result = resolver(["ModA"]).evaluate([&a]);

    assert_eq!(result.policy, PriorityPolicy::None);
    assert_eq!(result.definition.unwrap().mod_name, "ModA");
    assert!(resolver(["ModA"]).evaluate(std::iter::empty()).definition.is_none());
}

#[test]
fn test_unknown_game_falls_back_to_mod_order() {
    let resolver = PriorityResolver::new(rules(), "Hearts of Iron IV", ["ModA", "ModB"]);
    let b = Definition::new("events", "e1", "ModB", "events/a.txt");
    let a = Definition::new("events", "e1", "ModA", "events/b.txt");

    let result = resolver.evaluate([&b, &a]);

    assert_eq!(result.policy, PriorityPolicy::ModOrder);
    assert_eq!(result.definition.unwrap().mod_name, "ModB");
}

#[test]
fn test_unlisted_mod_loses_to_listed_mod() {
    let listed = Definition::new("events", "e1", "Listed", "events/shared.txt");
    let unlisted = Definition::new("events", "e1", "Unlisted", "events/shared.txt");

    let result = resolver(["Listed"]).evaluate([&listed, &unlisted]);

    assert_eq!(result.definition.unwrap().mod_name, "Listed");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_file_rules_ignore_candidate_order(
        stems in prop::collection::btree_set("[a-z]{1,8}", 2..6),
        fios in any::<bool>(),
    ) {
        let type_name = if fios { "common/on_actions" } else { "events" };
        let stems: Vec<String> = stems.into_iter().collect();
        let definitions: Vec<Definition> = stems
            .iter()
            .enumerate()
            .map(|(i, stem)| {
                Definition::new(type_name, "e1", format!("Mod{}", i), format!("{}/{}.txt", type_name, stem))
            })
            .collect();
        let names: Vec<String> = (0..definitions.len()).map(|i| format!("Mod{}", i)).collect();
        let resolver = resolver(names.iter().map(String::as_str));

        let forward = resolver.evaluate(definitions.iter());
        let backward = resolver.evaluate(definitions.iter().rev());

        let winner = forward.definition.clone().unwrap();
        prop_assert_eq!(forward.definition, backward.definition);

        let expected = if fios { stems.first() } else { stems.last() };
        prop_assert_eq!(winner.file, format!("{}/{}.txt", type_name, expected.unwrap()));
    }

    #[test]
    fn prop_mod_order_ignores_candidate_order(positions in prop::collection::btree_set(0usize..20, 2..6)) {
        let load_order: Vec<String> = (0..20).map(|i| format!("Mod{}", i)).collect();
        let resolver = resolver(load_order.iter().map(String::as_str));
        let definitions: Vec<Definition> = positions
            .iter()
            .map(|p| Definition::new("events", "e1", format!("Mod{}", p), "events/shared.txt"))
            .collect();

        let forward = resolver.evaluate(definitions.iter());
        let backward = resolver.evaluate(definitions.iter().rev());

        let last = positions.iter().next_back().copied().unwrap();
        prop_assert_eq!(forward.definition.unwrap().mod_name, format!("Mod{}", last));
        prop_assert_eq!(backward.definition.unwrap().mod_name, format!("Mod{}", last));
    }
}
