// Pipeline metrics module
//
// Counts what the loader, detector, synchronizer and exporter did during a run

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Run metrics shared by every pipeline component.
///
/// Uses atomic operations so the loader's worker tasks can record without
/// locks. Wrap in an `Arc` and hand the same instance to each service.
#[derive(Debug)]
pub struct Metrics {
    /// Mods read and parsed successfully
    pub mods_loaded: AtomicUsize,

    /// Mods skipped because they could not be read
    pub mods_failed: AtomicUsize,

    /// Definitions produced by the parsers (after variable merging)
    pub definitions_loaded: AtomicUsize,

    /// Definitions placed in `conflicts`
    pub conflicts_found: AtomicUsize,

    /// Definitions placed in `orphan_conflicts`
    pub orphan_conflicts_found: AtomicUsize,

    /// Synthesized overwritten-object definitions
    pub overwritten_conflicts_found: AtomicUsize,

    /// Files written into a patch directory
    pub files_exported: AtomicU64,

    /// Export writes skipped because the file already had the same content
    pub exports_unchanged: AtomicU64,

    /// Files removed from a patch directory
    pub files_purged: AtomicU64,

    /// `state.json` documents written
    pub state_saves: AtomicU64,

    /// Write attempts that failed and were retried
    pub write_retries: AtomicU64,

    /// Time spent in conflict detection in milliseconds
    pub detection_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            mods_loaded: AtomicUsize::new(0),
            mods_failed: AtomicUsize::new(0),
            definitions_loaded: AtomicUsize::new(0),
            conflicts_found: AtomicUsize::new(0),
            orphan_conflicts_found: AtomicUsize::new(0),
            overwritten_conflicts_found: AtomicUsize::new(0),
            files_exported: AtomicU64::new(0),
            exports_unchanged: AtomicU64::new(0),
            files_purged: AtomicU64::new(0),
            state_saves: AtomicU64::new(0),
            write_retries: AtomicU64::new(0),
            detection_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a mod parsed into `definitions` definitions
    pub fn record_mod_loaded(&self, definitions: usize) {
        self.mods_loaded.fetch_add(1, Ordering::Relaxed);
        self.definitions_loaded
            .fetch_add(definitions, Ordering::Relaxed);
    }

    pub fn record_mod_failed(&self) {
        self.mods_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the bucket sizes of a detection pass
    pub fn record_detection(
        &self,
        conflicts: usize,
        orphans: usize,
        overwritten: usize,
        duration: Duration,
    ) {
        self.conflicts_found.fetch_add(conflicts, Ordering::Relaxed);
        self.orphan_conflicts_found
            .fetch_add(orphans, Ordering::Relaxed);
        self.overwritten_conflicts_found
            .fetch_add(overwritten, Ordering::Relaxed);
        self.detection_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_file_exported(&self) {
        self.files_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export_unchanged(&self) {
        self.exports_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_purged(&self) {
        self.files_purged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_save(&self) {
        self.state_saves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Files written so far. Used to assert idempotent re-runs.
    pub fn files_exported(&self) -> u64 {
        self.files_exported.load(Ordering::Relaxed)
    }

    pub fn files_purged(&self) -> u64 {
        self.files_purged.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Run Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Mods: {} loaded, {} failed, {} definitions",
            self.mods_loaded.load(Ordering::Relaxed),
            self.mods_failed.load(Ordering::Relaxed),
            self.definitions_loaded.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Conflicts: {} conflicting, {} orphan, {} overwritten (detection {:.2}s)",
            self.conflicts_found.load(Ordering::Relaxed),
            self.orphan_conflicts_found.load(Ordering::Relaxed),
            self.overwritten_conflicts_found.load(Ordering::Relaxed),
            self.detection_time_ms.load(Ordering::Relaxed) as f64 / 1000.0
        );
        tracing::info!(
            "Patch files: {} exported, {} unchanged, {} purged",
            self.files_exported.load(Ordering::Relaxed),
            self.exports_unchanged.load(Ordering::Relaxed),
            self.files_purged.load(Ordering::Relaxed)
        );
        tracing::info!(
            "State saves: {}, write retries: {}",
            self.state_saves.load(Ordering::Relaxed),
            self.write_retries.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.mods_loaded.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.files_exported(), 0);
    }

    #[test]
    fn test_record_mod_loaded() {
        let metrics = Metrics::new();

        metrics.record_mod_loaded(10);
        metrics.record_mod_loaded(5);
        metrics.record_mod_failed();

        assert_eq!(metrics.mods_loaded.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.definitions_loaded.load(Ordering::Relaxed), 15);
        assert_eq!(metrics.mods_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_record_detection() {
        let metrics = Metrics::new();
        metrics.record_detection(4, 2, 1, Duration::from_millis(250));

        assert_eq!(metrics.conflicts_found.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.orphan_conflicts_found.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.overwritten_conflicts_found.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.detection_time_ms.load(Ordering::Relaxed), 250);
    }

    #[test]
    fn test_patch_file_counters() {
        let metrics = Metrics::new();

        metrics.record_file_exported();
        metrics.record_file_exported();
        metrics.record_export_unchanged();
        metrics.record_file_purged();
        metrics.record_state_save();
        metrics.record_write_retry();

        assert_eq!(metrics.files_exported(), 2);
        assert_eq!(metrics.exports_unchanged.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.files_purged(), 1);
        assert_eq!(metrics.state_saves.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.write_retries.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
