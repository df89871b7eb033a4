//! ModPatch - conflict detection and patch generation for overlapping game mods
//!
//! Main entry point for the command line application.
//!
//! # Execution Flow
//!
//! 1. Load `ModPatch Config.yaml` from the configuration directory (first
//!    argument, `ModPatch Data` by default) layered with `MODPATCH__*`
//!    environment variables
//! 2. Initialize logging → `<log_dir>/<log_prefix>.<date>`
//! 3. Create a tokio runtime for parallel mod parsing
//! 4. Load and index every mod of the collection
//! 5. Detect conflicts and reconcile them with the saved patch state
//! 6. With `--resolve`, resolve every pending conflict in favor of the
//!    priority winner and export it to the patch mod
//! 7. Log a metrics summary
//!
//! # Usage
//!
//! ```text
//! modpatch [CONFIG_DIR] [--resolve]
//! ```

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use modpatch::models::ConflictResult;
use modpatch::{APP_NAME, ConfigManager, Metrics, PatchCollectionService, ProgressReporter, VERSION};
use std::sync::Arc;

const DEFAULT_CONFIG_DIR: &str = "ModPatch Data";

/// Detect conflicts between the mods of a collection and maintain its patch mod
#[derive(Parser, Debug)]
#[command(name = "modpatch")]
#[command(version, about)]
struct Cli {
    /// Directory holding `ModPatch Config.yaml`
    #[arg(default_value = DEFAULT_CONFIG_DIR)]
    config_dir: Utf8PathBuf,

    /// Resolve every pending conflict in favor of its priority winner
    #[arg(long)]
    resolve: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(cli.config_dir.as_str())?;
    let config = config_manager.load_config()?;

    // Held until exit so buffered log lines are flushed
    let _guard = modpatch::logging::setup_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("modpatch-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let progress = ProgressReporter::new(|percentage| {
        tracing::debug!("Progress: {}%", percentage);
    });
    let service = PatchCollectionService::from_config(&config, Arc::clone(&metrics)).with_progress(progress);

    tracing::info!(
        "Collection {} ({} mods) for {} at {}",
        config.collection.name,
        service.mods().len(),
        service.game().game_type,
        service.game().user_directory
    );

    let indexed = runtime.block_on(service.load_mod_objects())?;
    let conflicts = service.find_conflicts(indexed).context("Conflict detection failed")?;
    let mut conflicts = service.load_patch_state(conflicts)?;

    if cli.resolve {
        resolve_pending(&service, &mut conflicts)?;
    }

    let pending = conflicts.pending_type_and_id_keys();
    tracing::info!(
        "Patch {}: {} conflicts pending, {} resolved, {} ignored, {} ignored by path rules",
        service.patch_name(),
        pending.len(),
        conflicts.resolved_conflicts.all_type_and_id_keys().len(),
        conflicts.ignored_conflicts.all_type_and_id_keys().len(),
        conflicts.rule_ignored_conflicts.all_type_and_id_keys().len()
    );
    for key in &pending {
        tracing::info!("Pending: {}", key);
    }

    metrics.log_summary();
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Run complete");
    Ok(())
}

/// Apply the priority winner of every pending conflict.
fn resolve_pending(service: &PatchCollectionService, conflicts: &mut ConflictResult) -> Result<()> {
    for key in conflicts.pending_type_and_id_keys() {
        let candidates: Vec<_> = conflicts
            .conflicts
            .get_by_type_and_id_key(&key)
            .into_iter()
            .cloned()
            .collect();
        let priority = service.eval_definition_priority(&candidates);
        let Some(winner) = priority.definition else {
            tracing::warn!("No winner for {}", key);
            continue;
        };

        if service.apply_mod_patch(conflicts, &winner)? {
            tracing::info!("Resolved {} with {} ({})", key, winner.mod_name, priority.policy);
        } else {
            tracing::warn!("Could not resolve {} with {}", key, winner.mod_name);
        }
    }
    Ok(())
}
