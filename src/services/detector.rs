use crate::index::IndexedDefinitions;
use crate::metrics::Metrics;
use crate::models::{ConflictResult, Definition, DefinitionKey, ValueType};
use crate::progress::{DETECTION_MAX_PERCENTAGE, ProgressReporter, progress_percentage};
use crate::services::priority::PriorityResolver;
use crate::services::rules::object_file_name;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur during conflict detection
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Priority resolution returned no winner for {type_and_id} ({candidates} candidates)")]
    InvariantViolation {
        type_and_id: String,
        candidates: usize,
    },
}

/// Definitions flagged during one detection pass, keyed by identity.
type Accumulator = IndexMap<DefinitionKey, Definition>;

/// Whether a file key is overridden by several mods without a dependency.
type FileConflictCache = HashMap<String, bool>;

/// Classifies an index of definitions into conflict buckets.
///
/// A pass walks the index three times:
/// 1. every file key, evaluating the definitions stored under it
/// 2. every type+id key, evaluating the definitions stored under it
/// 3. every type+id of `OverwrittenObject` definitions, synthesizing one
///    merged definition per group
///
/// Definitions are flagged when two or more mods supply different code for
/// the same type+id (one representative per distinct code hash), or when a
/// definition is alone under its type+id but its file is shared with other
/// mods it does not depend on.
pub struct ConflictDetector {
    resolver: PriorityResolver,
    progress: ProgressReporter,
    metrics: Option<Arc<Metrics>>,
}

impl ConflictDetector {
    pub fn new(resolver: PriorityResolver) -> Self {
        Self {
            resolver,
            progress: ProgressReporter::noop(),
            metrics: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn resolver(&self) -> &PriorityResolver {
        &self.resolver
    }

    /// Run a full detection pass over `indexed`.
    ///
    /// # Returns
    /// A [`ConflictResult`] whose `all_conflicts` is `indexed` and whose
    /// decision buckets are empty
    pub fn find_conflicts(&self, indexed: IndexedDefinitions) -> Result<ConflictResult, DetectionError> {
        let started = Instant::now();
        let file_keys = indexed.all_file_keys();
        let type_and_id_keys = indexed.all_type_and_id_keys();
        let overwritten_groups = group_by_type_and_id(indexed.get_by_value_type(ValueType::OverwrittenObject));

        let total = file_keys.len() + type_and_id_keys.len() + overwritten_groups.len();
        let mut processed = 0;
        self.progress.reset();
        tracing::info!(
            "Analyzing {} definitions ({} files, {} keys, {} overwritten groups)",
            indexed.len(),
            file_keys.len(),
            type_and_id_keys.len(),
            overwritten_groups.len()
        );

        let mut accumulator = Accumulator::new();
        let mut file_cache = FileConflictCache::new();

        for file_key in &file_keys {
            let definitions = indexed.get_by_file(file_key);
            self.eval_definitions(&indexed, &mut accumulator, &definitions, &mut file_cache)?;
            processed += 1;
            self.progress
                .report(progress_percentage(total, processed, DETECTION_MAX_PERCENTAGE));
        }

        for type_and_id in &type_and_id_keys {
            let definitions = indexed.get_by_type_and_id_key(type_and_id);
            self.eval_definitions(&indexed, &mut accumulator, &definitions, &mut file_cache)?;
            processed += 1;
            self.progress
                .report(progress_percentage(total, processed, DETECTION_MAX_PERCENTAGE));
        }

        let mut overwritten: IndexMap<String, Definition> = IndexMap::new();
        for (type_and_id, group) in &overwritten_groups {
            let merged = self.merge_overwritten(type_and_id, group, &accumulator)?;
            overwritten.insert(type_and_id.clone(), merged);
            processed += 1;
            self.progress
                .report(progress_percentage(total, processed, DETECTION_MAX_PERCENTAGE));
        }

        drop(overwritten_groups);
        self.progress.report(99);

        let mut grouped: IndexMap<String, Vec<Definition>> = IndexMap::new();
        for definition in accumulator.into_values() {
            grouped.entry(definition.type_and_id()).or_default().push(definition);
        }
        let (conflicting, orphans): (Vec<_>, Vec<_>) = grouped.into_values().partition(|g| g.len() > 1);

        let result = ConflictResult {
            all_conflicts: indexed,
            conflicts: IndexedDefinitions::with_definitions(conflicting.into_iter().flatten(), true),
            orphan_conflicts: IndexedDefinitions::with_definitions(orphans.into_iter().flatten(), false),
            overwritten_conflicts: IndexedDefinitions::with_definitions(overwritten.into_values(), true),
            resolved_conflicts: IndexedDefinitions::new(),
            ignored_conflicts: IndexedDefinitions::new(),
            rule_ignored_conflicts: IndexedDefinitions::new(),
            ignored_paths: String::new(),
        };

        tracing::info!(
            "Detection finished: {} conflicts, {} orphan conflicts, {} overwritten in {:.2}s",
            result.conflicts.len(),
            result.orphan_conflicts.len(),
            result.overwritten_conflicts.len(),
            started.elapsed().as_secs_f64()
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_detection(
                result.conflicts.len(),
                result.orphan_conflicts.len(),
                result.overwritten_conflicts.len(),
                started.elapsed(),
            );
        }
        self.progress.report(100);

        Ok(result)
    }

    fn eval_definitions(
        &self,
        indexed: &IndexedDefinitions,
        accumulator: &mut Accumulator,
        definitions: &[&Definition],
        file_cache: &mut FileConflictCache,
    ) -> Result<(), DetectionError> {
        let mut processed: HashSet<DefinitionKey> = HashSet::new();

        for definition in definitions.iter().filter(|d| d.is_conflict_candidate()) {
            let key = definition.key();
            if processed.contains(&key) || accumulator.contains_key(&key) {
                continue;
            }

            let all: Vec<&Definition> = indexed
                .get_by_type_and_id_key(&key.type_and_id)
                .into_iter()
                .filter(|d| d.is_conflict_candidate())
                .collect();
            processed.extend(all.iter().map(|d| d.key()));

            if all.len() > 1 {
                if all.iter().all(|d| d.definition_sha == definition.definition_sha) {
                    continue;
                }
                self.accumulate_competing(&key.type_and_id, &all, accumulator)?;
            } else if all.len() == 1 {
                let file_ci = definition.file_ci();
                let flagged = match file_cache.get(&file_ci) {
                    Some(flagged) => *flagged,
                    None => {
                        let flagged = is_unexplained_file_override(indexed, definition, &file_ci);
                        file_cache.insert(file_ci, flagged);
                        flagged
                    }
                };
                if flagged {
                    accumulator.entry(key).or_insert_with(|| (*definition).clone());
                }
            }
        }

        Ok(())
    }

    /// Accumulate one representative per distinct code hash of `all`.
    fn accumulate_competing(
        &self,
        type_and_id: &str,
        all: &[&Definition],
        accumulator: &mut Accumulator,
    ) -> Result<(), DetectionError> {
        let mut seen: HashSet<DefinitionKey> = HashSet::new();
        let mut by_sha: IndexMap<&str, Vec<&Definition>> = IndexMap::new();

        for candidate in all {
            let key = candidate.key();
            if accumulator.contains_key(&key) || !seen.insert(key) {
                continue;
            }
            // A mod that another candidate depends on is overridden on purpose
            if all.iter().any(|other| other.depends_on(&candidate.mod_name)) {
                continue;
            }
            by_sha.entry(candidate.definition_sha.as_str()).or_default().push(candidate);
        }

        if by_sha.len() <= 1 {
            return Ok(());
        }

        for group in by_sha.values() {
            let winner = self
                .resolver
                .evaluate(group.iter().copied())
                .definition
                .ok_or_else(|| DetectionError::InvariantViolation {
                    type_and_id: type_and_id.to_string(),
                    candidates: group.len(),
                })?;
            if winner.is_conflict_candidate() {
                tracing::debug!("Conflict {} from {}", type_and_id, winner.mod_name);
                accumulator.entry(winner.key()).or_insert(winner);
            }
        }

        Ok(())
    }

    /// Build the single exported definition for an overwritten-object group.
    fn merge_overwritten(
        &self,
        type_and_id: &str,
        group: &[&Definition],
        accumulator: &Accumulator,
    ) -> Result<Definition, DetectionError> {
        let conflicted: Vec<&Definition> = accumulator
            .values()
            .filter(|d| d.type_and_id() == type_and_id)
            .collect();
        let members: &[&Definition] = if conflicted.is_empty() { group } else { &conflicted };

        let representative = self
            .resolver
            .evaluate(members.iter().copied())
            .definition
            .ok_or_else(|| DetectionError::InvariantViolation {
                type_and_id: type_and_id.to_string(),
                candidates: members.len(),
            })?;

        let mut merged = representative.clone();
        merged.file = object_file_name(&representative, "");
        for file in members.iter().flat_map(|d| d.file_names.iter()) {
            merged.add_file_name(file);
        }
        if let Some(provider) = self.resolver.rules().provider_for(self.resolver.game_type()) {
            merged.file = provider.get_file_name(&merged);
        }

        tracing::debug!("Overwritten {} exported as {}", type_and_id, merged.file);
        Ok(merged)
    }
}

/// Whether `definition`'s file is supplied by several mods and its own mod
/// does not depend on any of them.
fn is_unexplained_file_override(indexed: &IndexedDefinitions, definition: &Definition, file_ci: &str) -> bool {
    let file_definitions = indexed.get_by_file(file_ci);
    let mut mods: Vec<&str> = file_definitions.iter().map(|d| d.mod_name.as_str()).collect();
    mods.sort_unstable();
    mods.dedup();
    if mods.len() <= 1 {
        return false;
    }
    !definition
        .dependencies
        .iter()
        .any(|dependency| mods.contains(&dependency.as_str()))
}

fn group_by_type_and_id(definitions: Vec<&Definition>) -> IndexMap<String, Vec<&Definition>> {
    let mut groups: IndexMap<String, Vec<&Definition>> = IndexMap::new();
    for definition in definitions {
        groups.entry(definition.type_and_id()).or_default().push(definition);
    }
    groups
}
