use crate::index::IndexedDefinitions;
use crate::metrics::Metrics;
use crate::models::{Definition, ModEntry};
use crate::progress::{DETECTION_MAX_PERCENTAGE, ProgressReporter, progress_percentage};
use crate::services::merge::merge_definitions;
use crate::services::parser::{DefinitionParser, ParseArgs};
use crate::services::reader::ModReader;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Parses every mod of a collection into one index.
///
/// Mods are read and parsed on the blocking pool, at most `worker_threads`
/// at a time. Each task appends its definitions to a shared collector as a
/// chunk tagged with the mod's load order position; chunks are sorted by that
/// position before indexing, so the resulting index does not depend on which
/// task finished first.
pub struct ModObjectLoader {
    reader: Arc<dyn ModReader>,
    parser: Arc<dyn DefinitionParser>,
    worker_threads: usize,
    progress: ProgressReporter,
    metrics: Arc<Metrics>,
}

impl ModObjectLoader {
    pub fn new(
        reader: Arc<dyn ModReader>,
        parser: Arc<dyn DefinitionParser>,
        worker_threads: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            reader,
            parser,
            worker_threads: worker_threads.max(1),
            progress: ProgressReporter::noop(),
            metrics,
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Read, parse and index `mods` (in load order).
    ///
    /// A mod that cannot be read is logged and contributes no definitions.
    pub async fn load(&self, mods: &[ModEntry]) -> Result<IndexedDefinitions> {
        if mods.is_empty() {
            tracing::info!("No mods to load");
            return Ok(IndexedDefinitions::new());
        }

        self.progress.reset();
        tracing::info!(
            "Loading {} mods with {} workers",
            mods.len(),
            self.worker_threads
        );

        let total = mods.len();
        let semaphore = Arc::new(Semaphore::new(self.worker_threads));
        let collector: Arc<Mutex<Vec<(usize, Vec<Definition>)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(total)));
        let processed = Arc::new(Mutex::new(0usize));
        let mut tasks = JoinSet::new();

        for (position, entry) in mods.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let collector = Arc::clone(&collector);
            let processed = Arc::clone(&processed);
            let reader = Arc::clone(&self.reader);
            let parser = Arc::clone(&self.parser);
            let metrics = Arc::clone(&self.metrics);
            let progress = self.progress.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .context("Loader semaphore closed")?;

                tokio::task::spawn_blocking(move || {
                    let definitions = parse_mod(reader.as_ref(), parser.as_ref(), &entry, &metrics);
                    collector
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push((position, definitions));

                    let mut done = processed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    *done += 1;
                    progress.report(progress_percentage(total, *done, DETECTION_MAX_PERCENTAGE));
                })
                .await
                .context("Mod parsing task failed")
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.context("Mod loading task panicked")??;
        }

        self.progress.report(99);

        let mut chunks = std::mem::take(
            &mut *collector
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        chunks.sort_by_key(|(position, _)| *position);
        let index = IndexedDefinitions::with_definitions(
            chunks.into_iter().flat_map(|(_, definitions)| definitions),
            true,
        );

        tracing::info!("Indexed {} definitions from {} mods", index.len(), total);
        self.progress.report(100);
        Ok(index)
    }
}

/// Parse every file of one mod and merge its variables.
fn parse_mod(
    reader: &dyn ModReader,
    parser: &dyn DefinitionParser,
    entry: &ModEntry,
    metrics: &Metrics,
) -> Vec<Definition> {
    let files = match reader.read(&entry.full_path) {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!("Skipping mod {}: {:#}", entry.name, e);
            metrics.record_mod_failed();
            return Vec::new();
        }
    };

    let mut definitions = Vec::new();
    for file in &files {
        let parsed = parser.parse(&ParseArgs::new(&entry.name, &entry.dependencies, file));
        let invalid = parsed.iter().filter(|d| d.has_error()).count();
        if invalid > 0 {
            tracing::warn!(
                "{} of {} definitions in {}/{} have parse errors",
                invalid,
                parsed.len(),
                entry.name,
                file.path
            );
        }
        definitions.extend(merge_definitions(parsed));
    }

    tracing::debug!(
        "Parsed {} definitions from {} files of {}",
        definitions.len(),
        files.len(),
        entry.name
    );
    metrics.record_mod_loaded(definitions.len());
    definitions
}
