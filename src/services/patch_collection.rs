//! Patch collection service.
//!
//! Wires the loader, detector, synchronizer, exporter and writer for one
//! game and one mod collection, and exposes the user-facing resolution
//! actions on top of them.

use crate::index::IndexedDefinitions;
use crate::metrics::Metrics;
use crate::models::{AppConfig, ConflictResult, Definition, GameContext, MOD_DIRECTORY, ModEntry};
use crate::paths;
use crate::progress::ProgressReporter;
use crate::services::detector::{ConflictDetector, DetectionError};
use crate::services::exporter::{ExportRequest, PatchExporter, SaveStateRequest};
use crate::services::ignore_rules::evaluate_ignore_rules;
use crate::services::loader::ModObjectLoader;
use crate::services::parser::{DefinitionParser, WholeFileParser};
use crate::services::priority::{PriorityResolver, PriorityResult};
use crate::services::reader::{FsModReader, ModReader};
use crate::services::retry::RetryPolicy;
use crate::services::rules::{PathRulesProvider, RulesRegistry};
use crate::services::sync::{PatchStateSynchronizer, SyncTarget};
use crate::services::writer::{FsModWriter, ModWriter, WriteLock};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Pluggable parts of a [`PatchCollectionService`].
///
/// `lock` must be the lock `writer` was built with so that the exporter
/// and the writer serialize against each other.
pub struct ServiceComponents {
    pub reader: Arc<dyn ModReader>,
    pub parser: Arc<dyn DefinitionParser>,
    pub writer: Arc<dyn ModWriter>,
    pub rules: RulesRegistry,
    pub lock: WriteLock,
    pub retry: RetryPolicy,
}

impl ServiceComponents {
    /// File system reader and writer, whole-file parser and the configured
    /// path rules provider.
    pub fn from_config(config: &AppConfig, metrics: &Arc<Metrics>) -> Self {
        let lock = WriteLock::new();
        let retry = RetryPolicy::from_settings(&config.retry).with_metrics(Arc::clone(metrics));
        let rules = RulesRegistry::new().with_provider(Arc::new(PathRulesProvider::new(
            config.game.game_type.clone(),
            &config.game.fios_paths,
        )));
        Self {
            reader: Arc::new(FsModReader::new()),
            parser: Arc::new(WholeFileParser::new()),
            writer: Arc::new(FsModWriter::new(lock.clone(), retry.clone())),
            rules,
            lock,
            retry,
        }
    }
}

/// Conflict workflow for one collection of the selected game.
pub struct PatchCollectionService {
    game: GameContext,
    collection_name: String,
    name_prefix: String,
    mods: Vec<ModEntry>,
    loader: ModObjectLoader,
    detector: ConflictDetector,
    synchronizer: PatchStateSynchronizer,
    exporter: Arc<PatchExporter>,
    writer: Arc<dyn ModWriter>,
    metrics: Arc<Metrics>,
}

impl PatchCollectionService {
    pub fn from_config(config: &AppConfig, metrics: Arc<Metrics>) -> Self {
        let components = ServiceComponents::from_config(config, &metrics);
        Self::with_components(config, metrics, components)
    }

    pub fn with_components(config: &AppConfig, metrics: Arc<Metrics>, components: ServiceComponents) -> Self {
        let game = config.game_context();
        let mods = config.mod_entries();

        let exporter = Arc::new(PatchExporter::new(
            components.rules.clone(),
            components.lock,
            components.retry,
            Arc::clone(&metrics),
        ));
        let resolver = PriorityResolver::new(
            components.rules,
            game.game_type.clone(),
            mods.iter().map(|m| m.name.clone()),
        );
        let loader = ModObjectLoader::new(
            components.reader,
            components.parser,
            config.patch.worker_threads,
            Arc::clone(&metrics),
        );
        let detector = ConflictDetector::new(resolver).with_metrics(Arc::clone(&metrics));
        let synchronizer = PatchStateSynchronizer::new(
            Arc::clone(&exporter),
            Arc::clone(&components.writer),
            Arc::clone(&metrics),
        );

        Self {
            game,
            collection_name: config.collection.name.clone(),
            name_prefix: config.patch.name_prefix.clone(),
            mods,
            loader,
            detector,
            synchronizer,
            exporter,
            writer: components.writer,
            metrics,
        }
    }

    /// Route loader, detector and synchronizer progress to `progress`.
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.loader = self.loader.with_progress(progress.clone());
        self.detector = self.detector.with_progress(progress.clone());
        self.synchronizer = self.synchronizer.with_progress(progress);
        self
    }

    pub fn game(&self) -> &GameContext {
        &self.game
    }

    pub fn mods(&self) -> &[ModEntry] {
        &self.mods
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Name of the patch mod of the active collection.
    pub fn patch_name(&self) -> String {
        self.generate_collection_patch_name(&self.collection_name)
    }

    /// `<prefix><collection name without invalid file name characters>`
    pub fn generate_collection_patch_name(&self, collection_name: &str) -> String {
        format!("{}{}", self.name_prefix, paths::generate_valid_file_name(collection_name))
    }

    pub fn is_patch_mod(&self, mod_name: &str) -> bool {
        !mod_name.is_empty() && mod_name.starts_with(&self.name_prefix)
    }

    /// Parse every mod of the collection.
    pub async fn load_mod_objects(&self) -> Result<IndexedDefinitions> {
        self.loader
            .load(&self.mods)
            .await
            .with_context(|| format!("Failed to load mods of collection {}", self.collection_name))
    }

    pub fn find_conflicts(&self, indexed: IndexedDefinitions) -> Result<ConflictResult, DetectionError> {
        self.detector.find_conflicts(indexed)
    }

    /// Winner among `definitions` under the collection's load order and game rules.
    pub fn eval_definition_priority(&self, definitions: &[Definition]) -> PriorityResult {
        self.detector.resolver().evaluate(definitions)
    }

    /// Reconcile `result` with the collection's persisted patch state.
    pub fn load_patch_state(&self, result: ConflictResult) -> Result<ConflictResult> {
        let patch_name = self.patch_name();
        self.synchronizer.load_patch_state(
            SyncTarget {
                game: &self.game,
                patch_name: &patch_name,
                mods: &self.mods,
            },
            result,
        )
    }

    /// Resolve a conflict in favor of `definition` and export it to the patch.
    ///
    /// # Returns
    /// `true` when both the export and the state save succeeded; `false`
    /// when `definition` does not belong to an installed mod
    pub fn apply_mod_patch(&self, result: &mut ConflictResult, definition: &Definition) -> Result<bool> {
        self.export_mod_patch_definition(result, definition, true)
    }

    /// Mark a conflict as ignored. Nothing is exported.
    pub fn ignore_mod_patch(&self, result: &mut ConflictResult, definition: &Definition) -> Result<bool> {
        self.export_mod_patch_definition(result, definition, false)
    }

    /// Re-evaluate `result.ignored_paths` and persist the state.
    pub fn save_ignored_paths(&self, result: &mut ConflictResult) -> Result<bool> {
        evaluate_ignore_rules(result);
        let patch_name = self.patch_name();
        let mod_root = self.game.mod_root();
        self.exporter
            .save_state(SaveStateRequest {
                root_path: &mod_root,
                patch_name: &patch_name,
                state: result.to_patch_state(),
                exported: &[],
            })
            .with_context(|| format!("Failed to save ignored paths for {}", patch_name))
    }

    /// Copy of `definition` owned by the patch mod.
    ///
    /// The code is seeded from the last exported version of the same
    /// type+id when the patch has one.
    pub fn create_patch_definition(&self, definition: &Definition) -> Definition {
        let patch_name = self.patch_name();
        let mut patch = definition.clone();
        patch.mod_name = patch_name.clone();

        let history = self
            .exporter
            .get_patch_state(&self.game.mod_root(), &patch_name)
            .and_then(|state| state.history_for(&definition.type_and_id()).cloned());
        if let Some(history) = history {
            tracing::debug!("Seeding {} from patch history", definition.type_and_id());
            patch.set_code(history.code);
        }
        patch
    }

    /// Delete the patch mod's descriptor and directory.
    pub fn clean_patch_collection(&self) -> Result<bool> {
        let patch = self.patch_mod_entry();
        if self.is_patch_installed(&patch) {
            self.writer
                .delete_descriptor(&self.game.user_directory, &patch.descriptor_file)
                .with_context(|| format!("Failed to delete descriptor of {}", patch.name))?;
        }
        self.writer
            .purge_mod_directory(&self.game.patch_directory(&patch.name), None)
            .with_context(|| format!("Failed to purge patch directory of {}", patch.name))?;
        self.exporter.reset_cache();
        tracing::info!("Cleaned patch {}", patch.name);
        Ok(true)
    }

    /// Copy the active collection's patch to the patch of `new_collection_name`.
    pub fn copy_patch_collection(&self, new_collection_name: &str) -> Result<bool> {
        let from = self.patch_name();
        let to = self.generate_collection_patch_name(new_collection_name);
        self.exporter
            .copy_patch_mod(&self.game.mod_root(), &from, &to)
            .with_context(|| format!("Failed to copy patch {} to {}", from, to))
    }

    /// Move the active collection's patch to the patch of `new_collection_name`.
    pub fn rename_patch_collection(&self, new_collection_name: &str) -> Result<bool> {
        let from = self.patch_name();
        let to = self.generate_collection_patch_name(new_collection_name);
        self.exporter
            .rename_patch_mod(&self.game.mod_root(), &from, &to)
            .with_context(|| format!("Failed to rename patch {} to {}", from, to))
    }

    fn export_mod_patch_definition(
        &self,
        result: &mut ConflictResult,
        definition: &Definition,
        resolve: bool,
    ) -> Result<bool> {
        let patch = self.patch_mod_entry();
        let user_directory = &self.game.user_directory;

        if !self.is_patch_installed(&patch) {
            self.writer
                .create_mod_directory(user_directory, MOD_DIRECTORY)
                .context("Failed to create mod directory")?;
            self.writer
                .write_descriptor(user_directory, &patch)
                .with_context(|| format!("Failed to write descriptor of {}", patch.name))?;
        }

        let installed = definition.mod_name == patch.name || self.mods.iter().any(|m| m.name == definition.mod_name);
        if !installed {
            tracing::warn!(
                "Cannot {} {}: mod {} is not installed",
                if resolve { "resolve" } else { "ignore" },
                definition.type_and_id(),
                definition.mod_name
            );
            return Ok(false);
        }

        if resolve {
            result.resolved_conflicts.add_to_map(definition.clone());
        } else {
            result.ignored_conflicts.add_to_map(definition.clone());
        }

        self.writer
            .create_mod_directory(user_directory, &patch.file_name)
            .with_context(|| format!("Failed to create patch directory of {}", patch.name))?;
        self.writer
            .apply_mods(user_directory, &[], std::slice::from_ref(&patch), true)
            .context("Failed to register patch in the load order")?;

        let mod_root = self.game.mod_root();
        let exported: Vec<Definition> = if resolve { vec![definition.clone()] } else { Vec::new() };
        let export_result = if exported.is_empty() {
            false
        } else {
            self.exporter
                .export_definitions(&ExportRequest {
                    game_type: &self.game.game_type,
                    root_path: &mod_root,
                    patch_name: &patch.name,
                    definitions: &exported,
                    mods: &self.mods,
                })
                .with_context(|| format!("Failed to export {} to {}", definition.type_and_id(), patch.name))?
        };

        let state_result = self
            .exporter
            .save_state(SaveStateRequest {
                root_path: &mod_root,
                patch_name: &patch.name,
                state: result.to_patch_state(),
                exported: &exported,
            })
            .with_context(|| format!("Failed to save patch state for {}", patch.name))?;

        tracing::info!(
            "{} {} from {} in {}",
            if resolve { "Resolved" } else { "Ignored" },
            definition.type_and_id(),
            definition.mod_name,
            patch.name
        );
        Ok(if resolve { export_result && state_result } else { state_result })
    }

    /// Descriptor of the patch mod; it depends on every mod of the collection.
    fn patch_mod_entry(&self) -> ModEntry {
        let patch_name = self.patch_name();
        ModEntry::new(patch_name.clone(), self.game.patch_directory(&patch_name))
            .with_dependencies(self.mods.iter().map(|m| m.name.clone()))
    }

    fn is_patch_installed(&self, patch: &ModEntry) -> bool {
        self.game.user_directory.join(&patch.descriptor_file).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModSettings, ValueType};
    use crate::services::writer::MockModWriter;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn config(user_directory: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.game.user_directory = user_directory.to_string();
        config.collection.name = "Main: List".to_string();
        config.collection.mods = vec![
            ModSettings {
                name: "ModA".to_string(),
                path: format!("{}/mod/a", user_directory),
                dependencies: Vec::new(),
            },
            ModSettings {
                name: "ModB".to_string(),
                path: format!("{}/mod/b", user_directory),
                dependencies: Vec::new(),
            },
        ];
        config
    }

    fn service_with_writer(config: &AppConfig, writer: MockModWriter) -> PatchCollectionService {
        let metrics = Arc::new(Metrics::new());
        let mut components = ServiceComponents::from_config(config, &metrics);
        components.writer = Arc::new(writer);
        PatchCollectionService::with_components(config, metrics, components)
    }

    #[test]
    fn test_patch_names() {
        let service = PatchCollectionService::from_config(&config("/tmp/game"), Arc::new(Metrics::new()));
        assert_eq!(service.patch_name(), "ModPatch_Main List");
        assert_eq!(service.generate_collection_patch_name("Other"), "ModPatch_Other");
        assert!(service.is_patch_mod("ModPatch_Other"));
        assert!(!service.is_patch_mod("ModA"));
    }

    #[test]
    fn test_unknown_mod_is_not_resolved() {
        let temp_dir = TempDir::new().unwrap();
        let user_directory = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = config(user_directory.as_str());

        let mut writer = MockModWriter::new();
        writer.expect_create_mod_directory().times(1).returning(|_, _| Ok(true));
        writer.expect_write_descriptor().times(1).returning(|_, _| Ok(true));
        writer.expect_apply_mods().never();

        let service = service_with_writer(&config, writer);
        let mut result = ConflictResult::default();
        let definition = Definition::new("events", "e1", "Stranger", "events/a.txt").with_code("a");

        assert!(!service.apply_mod_patch(&mut result, &definition).unwrap());
        assert!(result.resolved_conflicts.is_empty());
    }

    #[test]
    fn test_ignore_registers_patch_and_saves_state() {
        let temp_dir = TempDir::new().unwrap();
        let user_directory = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = config(user_directory.as_str());

        let mut writer = MockModWriter::new();
        writer.expect_create_mod_directory().times(2).returning(|_, _| Ok(true));
        writer.expect_write_descriptor().times(1).returning(|_, _| Ok(true));
        writer
            .expect_apply_mods()
            .withf(|_, enabled, top, append_only| enabled.is_empty() && top.len() == 1 && *append_only)
            .times(1)
            .returning(|_, _, _, _| Ok(true));

        let service = service_with_writer(&config, writer);
        let mut result = ConflictResult::default();
        let definition = Definition::new("events", "e1", "ModA", "events/a.txt")
            .with_code("a")
            .with_value_type(ValueType::Object);

        assert!(service.ignore_mod_patch(&mut result, &definition).unwrap());
        assert!(result.ignored_conflicts.contains_type_and_id("events-e1"));

        let state = service
            .exporter
            .get_patch_state(&service.game().mod_root(), &service.patch_name())
            .unwrap();
        assert_eq!(state.ignored_conflicts.len(), 1);
        assert!(state.conflict_history.is_empty());
    }

    #[test]
    fn test_create_patch_definition_uses_history() {
        let temp_dir = TempDir::new().unwrap();
        let user_directory = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let service = PatchCollectionService::from_config(&config(user_directory.as_str()), Arc::new(Metrics::new()));

        let definition = Definition::new("events", "e1", "ModA", "events/a.txt").with_code("original");
        let fresh = service.create_patch_definition(&definition);
        assert_eq!(fresh.mod_name, service.patch_name());
        assert_eq!(fresh.code, "original");

        let edited = Definition::new("events", "e1", "ModB", "events/b.txt").with_code("edited");
        service
            .exporter
            .save_state(SaveStateRequest {
                root_path: &service.game().mod_root(),
                patch_name: &service.patch_name(),
                state: Default::default(),
                exported: std::slice::from_ref(&edited),
            })
            .unwrap();

        let seeded = service.create_patch_definition(&definition);
        assert_eq!(seeded.code, "edited");
        assert_eq!(seeded.file, "events/a.txt");
    }
}
