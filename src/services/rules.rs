use crate::models::{Definition, ValueType};
use crate::paths;
use std::sync::Arc;

/// File name prefix that sorts first in load order.
pub const FIOS_FILE_PREFIX: &str = "!!!_";

/// File name prefix that sorts last in load order.
pub const LIOS_FILE_PREFIX: &str = "zzz_";

/// Game specific rules used by priority resolution and export.
#[cfg_attr(test, mockall::automock)]
pub trait GameRulesProvider: Send + Sync {
    /// Whether this provider handles `game_type`.
    fn can_process(&self, game_type: &str) -> bool;

    /// Whether the game loads `definition`'s type first-in-order-wins.
    fn definition_uses_fios_rules(&self, definition: &Definition) -> bool;

    /// Relative path the definition is exported to inside a patch.
    fn get_file_name(&self, definition: &Definition) -> String;
}

/// Ordered set of rules providers. The first one that can process a game wins.
#[derive(Clone, Default)]
pub struct RulesRegistry {
    providers: Vec<Arc<dyn GameRulesProvider>>,
}

impl RulesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn GameRulesProvider>) {
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn GameRulesProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn provider_for(&self, game_type: &str) -> Option<Arc<dyn GameRulesProvider>> {
        self.providers
            .iter()
            .find(|p| p.can_process(game_type))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for RulesRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}

/// Rules provider driven by a list of FIOS type paths.
///
/// Types under one of `fios_paths` are first-in-order-wins, everything else
/// is last-in-order-wins. Exported object files are named after the id with a
/// prefix that makes the game load them first (`!!!_`) or last (`zzz_`).
#[derive(Debug, Clone)]
pub struct PathRulesProvider {
    game_type: String,
    fios_paths: Vec<String>,
}

impl PathRulesProvider {
    pub fn new<I, S>(game_type: impl Into<String>, fios_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            game_type: game_type.into(),
            fios_paths: fios_paths
                .into_iter()
                .map(|p| paths::file_ci(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl GameRulesProvider for PathRulesProvider {
    fn can_process(&self, game_type: &str) -> bool {
        self.game_type.eq_ignore_ascii_case(game_type)
    }

    fn definition_uses_fios_rules(&self, definition: &Definition) -> bool {
        let type_path = paths::file_ci(&definition.type_name);
        let parent = paths::file_ci(&definition.parent_directory);
        self.fios_paths
            .iter()
            .any(|p| type_path.starts_with(p.as_str()) || parent.starts_with(p.as_str()))
    }

    fn get_file_name(&self, definition: &Definition) -> String {
        if matches!(
            definition.value_type,
            ValueType::WholeTextFile | ValueType::Binary
        ) {
            return paths::normalize_path(&definition.file);
        }

        let prefix = if self.definition_uses_fios_rules(definition) {
            FIOS_FILE_PREFIX
        } else {
            LIOS_FILE_PREFIX
        };
        object_file_name(definition, prefix)
    }
}

/// `<parent directory>/<prefix><id><source extension>`.
///
/// Objects are exported one file per id, so two ids parsed from the same
/// source file never share a patch file.
pub fn object_file_name(definition: &Definition, prefix: &str) -> String {
    paths::join(
        &definition.parent_directory,
        &format!(
            "{}{}{}",
            prefix,
            paths::generate_valid_file_name(&definition.id),
            paths::extension(&definition.file)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> PathRulesProvider {
        PathRulesProvider::new("Stellaris", ["common/scripted_effects"])
    }

    #[test]
    fn test_can_process_ignores_case() {
        assert!(provider().can_process("stellaris"));
        assert!(!provider().can_process("HOI4"));
    }

    #[test]
    fn test_fios_classification() {
        let fios = Definition::new("common/scripted_effects", "x", "ModA", "common/scripted_effects/a.txt");
        let lios = Definition::new("events", "x", "ModA", "events/a.txt");
        assert!(provider().definition_uses_fios_rules(&fios));
        assert!(!provider().definition_uses_fios_rules(&lios));
    }

    #[test]
    fn test_get_file_name_prefixes_objects() {
        let fios = Definition::new("common/scripted_effects", "x", "ModA", "common/scripted_effects/a.txt");
        let lios = Definition::new("events", "x", "ModA", "events\\b.txt");
        assert_eq!(provider().get_file_name(&fios), "common/scripted_effects/!!!_x.txt");
        assert_eq!(provider().get_file_name(&lios), "events/zzz_x.txt");
    }

    #[test]
    fn test_get_file_name_is_per_id() {
        let e1 = Definition::new("events", "e1", "ModA", "events/a.txt");
        let e2 = Definition::new("events", "e2", "ModA", "events/a.txt");
        assert_eq!(provider().get_file_name(&e1), "events/zzz_e1.txt");
        assert_eq!(provider().get_file_name(&e2), "events/zzz_e2.txt");
    }

    #[test]
    fn test_get_file_name_is_stable() {
        let def = Definition::new("events", "x", "ModA", "events/zzz_x.txt");
        let renamed = Definition {
            file: provider().get_file_name(&def),
            ..def.clone()
        };
        assert_eq!(provider().get_file_name(&renamed), "events/zzz_x.txt");
    }

    #[test]
    fn test_object_file_name_sanitizes_id() {
        let def = Definition::new("common/buildings", "a:b/c", "ModA", "common/buildings/x.txt");
        assert_eq!(object_file_name(&def, ""), "common/buildings/abc.txt");
    }

    #[test]
    fn test_whole_files_keep_their_path() {
        let def = Definition::new("gfx", "a.dds", "ModA", "gfx/a.dds").with_value_type(ValueType::Binary);
        assert_eq!(provider().get_file_name(&def), "gfx/a.dds");
    }

    #[test]
    fn test_registry_first_match_wins() {
        let mut first = MockGameRulesProvider::new();
        first.expect_can_process().returning(|g| g == "Stellaris");
        first.expect_get_file_name().returning(|_| "first.txt".to_string());

        let registry = RulesRegistry::new()
            .with_provider(Arc::new(first))
            .with_provider(Arc::new(provider()));

        let found = registry.provider_for("Stellaris").unwrap();
        let def = Definition::new("events", "x", "ModA", "events/a.txt");
        assert_eq!(found.get_file_name(&def), "first.txt");
        assert!(registry.provider_for("HOI4").is_none());
    }
}
