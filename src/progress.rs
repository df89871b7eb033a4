//! Progress reporting for long-running passes.
//!
//! Components receive a [`ProgressReporter`] and report whole percentages.
//! The reporter drops any value lower than one already reported, so a sink
//! only ever sees a non-decreasing sequence within one pass.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Highest percentage reported while detection phases run.
pub const DETECTION_MAX_PERCENTAGE: u8 = 98;

/// Highest percentage reported while patch state groups are synchronized.
pub const PATCH_LOAD_MAX_PERCENTAGE: u8 = 96;

type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Monotonic progress sink.
///
/// Cheap to clone; clones share the same high-water mark. Call
/// [`ProgressReporter::reset`] before starting a new pass.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: ProgressSink,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Reporter that discards every update.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report `percentage` (capped at 100) unless a higher value was already reported.
    pub fn report(&self, percentage: u8) {
        let percentage = percentage.min(100);
        let previous = self.last.fetch_max(percentage, Ordering::AcqRel);
        if percentage > previous || (percentage == 0 && previous == 0) {
            (self.sink)(percentage);
        }
    }

    /// Start a new pass at 0.
    pub fn reset(&self) {
        self.last.store(0, Ordering::Release);
        (self.sink)(0);
    }

    /// Last value forwarded to the sink.
    pub fn current(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &self.current())
            .finish()
    }
}

/// `clamp(round(processed / total * 100) - 2, 1, max)`
///
/// Returns 1 when `total` is zero.
pub fn progress_percentage(total: usize, processed: usize, max: u8) -> u8 {
    if total == 0 {
        return 1;
    }
    let raw = (processed as f64 / total as f64 * 100.0).round() - 2.0;
    raw.clamp(1.0, f64::from(max.max(1))) as u8
}
