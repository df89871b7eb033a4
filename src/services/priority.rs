use crate::models::Definition;
use crate::paths;
use crate::services::rules::RulesRegistry;
use std::collections::HashMap;
use std::fmt;

/// Which rule picked the winner of a [`PriorityResult`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PriorityPolicy {
    /// Zero or one candidate; nothing to decide.
    #[default]
    None,
    /// Same file in every mod: the mod loaded last wins.
    ModOrder,
    /// First in order (by file name) wins.
    Fios,
    /// Last in order (by file name) wins.
    Lios,
}

impl fmt::Display for PriorityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::ModOrder => "ModOrder",
            Self::Fios => "FIOS",
            Self::Lios => "LIOS",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityResult {
    pub definition: Option<Definition>,
    pub policy: PriorityPolicy,
}

/// Picks which of several competing definitions the game would load.
///
/// Deterministic for a given candidate order, load order and rules registry.
#[derive(Debug, Clone)]
pub struct PriorityResolver {
    rules: RulesRegistry,
    game_type: String,
    positions: HashMap<String, usize>,
}

impl PriorityResolver {
    /// # Arguments
    /// * `rules` - Registered game rules providers
    /// * `game_type` - The selected game
    /// * `load_order` - Mod names of the active collection, first loaded first
    pub fn new<I, S>(rules: RulesRegistry, game_type: impl Into<String>, load_order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut positions = HashMap::new();
        for (position, name) in load_order.into_iter().enumerate() {
            positions.insert(name.into(), position);
        }
        Self {
            rules,
            game_type: game_type.into(),
            positions,
        }
    }

    pub fn game_type(&self) -> &str {
        &self.game_type
    }

    pub fn rules(&self) -> &RulesRegistry {
        &self.rules
    }

    /// Load order position of `mod_name`; unknown mods sort before every listed mod.
    fn rank(&self, mod_name: &str) -> i64 {
        self.positions
            .get(mod_name)
            .map(|p| *p as i64)
            .unwrap_or(-1)
    }

    /// Pick the winner among `definitions`.
    pub fn evaluate<'a, I>(&self, definitions: I) -> PriorityResult
    where
        I: IntoIterator<Item = &'a Definition>,
    {
        let mut unique: Vec<&Definition> = Vec::new();
        for definition in definitions {
            if !unique.iter().any(|d| d.mod_name == definition.mod_name) {
                unique.push(definition);
            }
        }

        if unique.len() <= 1 {
            return PriorityResult {
                definition: unique.first().map(|d| (*d).clone()),
                policy: PriorityPolicy::None,
            };
        }

        let first_file = unique[0].file_ci();
        if unique.iter().all(|d| d.file_ci() == first_file) {
            return self.by_mod_order(&unique);
        }

        let Some(provider) = self.rules.provider_for(&self.game_type) else {
            tracing::warn!(
                "No rules provider for game {}, using mod order for {}",
                self.game_type,
                unique[0].type_and_id()
            );
            return self.by_mod_order(&unique);
        };

        let mut ordered = unique.clone();
        ordered.sort_by(|a, b| paths::file_stem(&a.file).cmp(&paths::file_stem(&b.file)));

        let (winner, policy) = if provider.definition_uses_fios_rules(unique[0]) {
            (ordered.first(), PriorityPolicy::Fios)
        } else {
            (ordered.last(), PriorityPolicy::Lios)
        };

        tracing::debug!(
            "{} resolved by {} to {}",
            unique[0].type_and_id(),
            policy,
            winner.map(|d| d.mod_name.as_str()).unwrap_or_default()
        );
        PriorityResult {
            definition: winner.map(|d| (*d).clone()),
            policy,
        }
    }

    fn by_mod_order(&self, unique: &[&Definition]) -> PriorityResult {
        // max_by_key keeps the last of equally ranked candidates
        let winner = unique.iter().max_by_key(|d| self.rank(&d.mod_name));
        PriorityResult {
            definition: winner.map(|d| (*d).clone()),
            policy: PriorityPolicy::ModOrder,
        }
    }
}
