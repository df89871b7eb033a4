// ModPatch - Conflict detection and patch generation for overlapping game mods
//
// This is the library crate containing the conflict engine and its data structures.
// The binary crate (main.rs) runs the detection pipeline for the configured collection.

pub mod config;
pub mod index;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod paths;
pub mod progress;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use index::IndexedDefinitions;
pub use metrics::Metrics;
pub use models::{AppConfig, ConflictResult, Definition, GameContext, ModEntry, PatchState, ValueType};
pub use progress::ProgressReporter;
pub use services::PatchCollectionService;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
