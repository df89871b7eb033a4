//! Patch state synchronization.
//!
//! A detection pass only knows about the current mod content. The patch on
//! disk reflects decisions made against older content. The synchronizer
//! compares the persisted [`PatchState`] with a fresh [`ConflictResult`],
//! purges exported files whose inputs changed, carries surviving decisions
//! forward and writes the reconciled state back.

use crate::index::IndexedDefinitions;
use crate::metrics::Metrics;
use crate::models::{ConflictResult, Definition, GameContext, ModEntry, PatchState};
use crate::paths;
use crate::progress::{PATCH_LOAD_MAX_PERCENTAGE, ProgressReporter, progress_percentage};
use crate::services::exporter::{ExportRequest, PatchExporter, SaveStateRequest};
use crate::services::ignore_rules::evaluate_ignore_rules;
use crate::services::writer::ModWriter;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use std::sync::Arc;

/// Where a synchronization pass reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct SyncTarget<'a> {
    pub game: &'a GameContext,
    pub patch_name: &'a str,
    /// Installed mods of the collection, for binary exports.
    pub mods: &'a [ModEntry],
}

impl SyncTarget<'_> {
    fn mod_root(&self) -> Utf8PathBuf {
        self.game.mod_root()
    }

    fn patch_directory(&self) -> Utf8PathBuf {
        self.game.patch_directory(self.patch_name)
    }
}

/// Which persisted bucket a group comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Orphan,
    Conflict,
    Overwritten,
}

pub struct PatchStateSynchronizer {
    exporter: Arc<PatchExporter>,
    writer: Arc<dyn ModWriter>,
    metrics: Arc<Metrics>,
    progress: ProgressReporter,
}

impl PatchStateSynchronizer {
    pub fn new(exporter: Arc<PatchExporter>, writer: Arc<dyn ModWriter>, metrics: Arc<Metrics>) -> Self {
        Self {
            exporter,
            writer,
            metrics,
            progress: ProgressReporter::noop(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Reconcile `result` with the state persisted for `target`.
    ///
    /// # Returns
    /// `result` with resolved and ignored decisions restored, path rules
    /// evaluated and orphan exports recorded as resolved
    pub fn load_patch_state(&self, target: SyncTarget<'_>, mut result: ConflictResult) -> Result<ConflictResult> {
        self.progress.reset();
        self.exporter.reset_cache();
        let mod_root = target.mod_root();

        let Some(state) = self.exporter.get_patch_state(&mod_root, target.patch_name) else {
            tracing::info!("No patch state for {}, exporting a fresh patch", target.patch_name);
            self.export_orphans(target, &mut result)?;
            self.export_overwritten(target, &result)?;
            evaluate_ignore_rules(&mut result);
            self.save(target, &result)?;
            self.progress.report(100);
            return Ok(result);
        };

        tracing::info!(
            "Synchronizing patch {} ({} conflicts, {} orphans, {} overwritten cached)",
            target.patch_name,
            state.conflicts.len(),
            state.orphan_conflicts.len(),
            state.overwritten_conflicts.len()
        );

        let total = state.conflicts.len() + state.orphan_conflicts.len() + state.overwritten_conflicts.len();
        let mut processed = 0;
        let mut resolved: Vec<Definition> = state.resolved_conflicts.clone();
        let mut ignored: Vec<Definition> = Vec::new();

        let groups = [
            (GroupKind::Orphan, &state.orphan_conflicts, &result.orphan_conflicts),
            (GroupKind::Conflict, &state.conflicts, &result.conflicts),
            (GroupKind::Overwritten, &state.overwritten_conflicts, &result.overwritten_conflicts),
        ];

        for (kind, cached_bucket, current_bucket) in groups {
            for (type_and_id, cached) in group_by_type_and_id(cached_bucket) {
                processed += cached.len();
                let current = current_bucket.get_by_type_and_id_key(&type_and_id);
                let different = is_cached_definition_different(&current, &cached);

                if kind != GroupKind::Overwritten && !different {
                    ignored.extend(state.ignored_for(&type_and_id).cloned());
                }

                if different {
                    let files = self.stale_files(target, &state, kind, &type_and_id, &cached);
                    tracing::debug!("{} changed, purging {} exported files", type_and_id, files.len());
                    self.purge(target, &files)?;
                    if kind != GroupKind::Overwritten {
                        resolved.retain(|d| d.type_and_id() != type_and_id);
                    }
                }

                self.progress
                    .report(progress_percentage(total, processed, PATCH_LOAD_MAX_PERCENTAGE));
            }
        }

        result.resolved_conflicts = IndexedDefinitions::with_definitions(resolved, true);
        result.ignored_conflicts = IndexedDefinitions::with_definitions(ignored, true);
        result.ignored_paths = state.ignore_conflict_paths.clone();

        self.export_orphans(target, &mut result)?;
        self.export_overwritten(target, &result)?;

        self.progress.report(99);
        evaluate_ignore_rules(&mut result);
        self.save(target, &result)?;
        self.progress.report(100);

        Ok(result)
    }

    /// Export orphan conflicts that have no resolution yet and record them as resolved.
    fn export_orphans(&self, target: SyncTarget<'_>, result: &mut ConflictResult) -> Result<()> {
        let pending: Vec<Definition> = result
            .orphan_conflicts
            .get_all()
            .into_iter()
            .filter(|d| !result.resolved_conflicts.contains_type_and_id(&d.type_and_id()))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        self.progress.report(97);
        let mod_root = target.mod_root();
        let exported = self
            .exporter
            .export_definitions(&ExportRequest {
                game_type: &target.game.game_type,
                root_path: &mod_root,
                patch_name: target.patch_name,
                definitions: &pending,
                mods: target.mods,
            })
            .with_context(|| format!("Failed to export orphan conflicts to {}", target.patch_name))?;

        if exported {
            tracing::info!("Exported {} orphan conflicts to {}", pending.len(), target.patch_name);
            for definition in pending {
                if !result.resolved_conflicts.contains_type_and_id(&definition.type_and_id()) {
                    result.resolved_conflicts.add_to_map(definition);
                }
            }
        }
        Ok(())
    }

    fn export_overwritten(&self, target: SyncTarget<'_>, result: &ConflictResult) -> Result<()> {
        let overwritten = result.overwritten_conflicts.to_vec();
        if overwritten.is_empty() {
            return Ok(());
        }

        self.progress.report(98);
        let mod_root = target.mod_root();
        self.exporter
            .export_definitions(&ExportRequest {
                game_type: &target.game.game_type,
                root_path: &mod_root,
                patch_name: target.patch_name,
                definitions: &overwritten,
                mods: target.mods,
            })
            .with_context(|| format!("Failed to export overwritten objects to {}", target.patch_name))?;
        Ok(())
    }

    fn save(&self, target: SyncTarget<'_>, result: &ConflictResult) -> Result<()> {
        let mod_root = target.mod_root();
        self.exporter
            .save_state(SaveStateRequest {
                root_path: &mod_root,
                patch_name: target.patch_name,
                state: result.to_patch_state(),
                exported: &[],
            })
            .with_context(|| format!("Failed to save patch state for {}", target.patch_name))?;
        Ok(())
    }

    /// Files of the patch directory produced from a changed group.
    fn stale_files(
        &self,
        target: SyncTarget<'_>,
        state: &PatchState,
        kind: GroupKind,
        type_and_id: &str,
        cached: &[&Definition],
    ) -> Vec<String> {
        let resolved_paths: Vec<String> = state
            .resolved_for(type_and_id)
            .map(|d| self.exporter.export_path(&target.game.game_type, d))
            .collect();

        if kind != GroupKind::Overwritten {
            return dedupe_ci(resolved_paths);
        }

        let mut files = Vec::new();
        for definition in cached {
            files.push(paths::normalize_path(&definition.file));
            files.extend(definition.file_names.iter().map(|f| paths::normalize_path(f)));
        }
        files.retain(|f| !resolved_paths.iter().any(|r| r.eq_ignore_ascii_case(f)));
        dedupe_ci(files)
    }

    fn purge(&self, target: SyncTarget<'_>, files: &[String]) -> Result<()> {
        let patch_directory = target.patch_directory();
        for file in files {
            let purged = self
                .writer
                .purge_mod_directory(&patch_directory, Some(file.clone()))
                .with_context(|| format!("Failed to purge {} from {}", file, patch_directory))?;
            if purged {
                self.metrics.record_file_purged();
            }
        }
        Ok(())
    }
}

/// Whether any cached definition lacks a current counterpart with the same
/// mod, file and code hash.
pub fn is_cached_definition_different(current: &[&Definition], cached: &[&Definition]) -> bool {
    !cached.iter().all(|c| {
        current.iter().any(|d| {
            d.mod_name == c.mod_name && d.file_ci() == c.file_ci() && d.definition_sha == c.definition_sha
        })
    })
}

fn group_by_type_and_id(definitions: &[Definition]) -> IndexMap<String, Vec<&Definition>> {
    let mut groups: IndexMap<String, Vec<&Definition>> = IndexMap::new();
    for definition in definitions {
        groups.entry(definition.type_and_id()).or_default().push(definition);
    }
    groups
}

fn dedupe_ci(files: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(files.len());
    for file in files {
        if !unique.iter().any(|f| f.eq_ignore_ascii_case(&file)) {
            unique.push(file);
        }
    }
    unique
}
