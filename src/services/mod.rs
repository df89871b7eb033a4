//! Services module - conflict detection and patch generation.
//!
//! The services are independent of any front end. They are wired once by
//! [`PatchCollectionService`] (or by hand in tests) and share nothing but
//! the explicit objects passed to their constructors: the [`WriteLock`],
//! the [`RulesRegistry`], [`Metrics`](crate::metrics::Metrics) and a
//! [`ProgressReporter`](crate::progress::ProgressReporter).
//!
//! # Components
//!
//! - [`ModObjectLoader`]: reads and parses every mod of a collection in
//!   parallel and indexes the definitions in load order
//! - [`ConflictDetector`]: classifies an index into conflicts, orphan
//!   conflicts and overwritten objects
//! - [`PriorityResolver`]: picks the winner of a group (mod order, FIOS, LIOS)
//! - [`PatchStateSynchronizer`]: reconciles a detection pass with the
//!   persisted patch state, purging stale exports
//! - [`PatchExporter`]: writes winners into the patch directory and saves
//!   `state.json`
//! - [`ModWriter`] / [`ModReader`] / [`DefinitionParser`] /
//!   [`GameRulesProvider`]: seams to the file system and game specific rules
//!
//! # Usage Example
//!
//! ```ignore
//! use modpatch::services::PatchCollectionService;
//!
//! let service = PatchCollectionService::from_config(&config, metrics);
//! let indexed = service.load_mod_objects().await?;
//! let conflicts = service.find_conflicts(indexed)?;
//! let mut conflicts = service.load_patch_state(conflicts)?;
//!
//! for key in conflicts.pending_type_and_id_keys() {
//!     let candidates: Vec<_> = conflicts.conflicts.get_by_type_and_id_key(&key).into_iter().cloned().collect();
//!     if let Some(winner) = service.eval_definition_priority(&candidates).definition {
//!         service.apply_mod_patch(&mut conflicts, &winner)?;
//!     }
//! }
//! ```

pub mod detector;
pub mod exporter;
pub mod ignore_rules;
pub mod loader;
pub mod merge;
pub mod parser;
pub mod patch_collection;
pub mod priority;
pub mod reader;
pub mod retry;
pub mod rules;
pub mod sync;
pub mod writer;

pub use detector::{ConflictDetector, DetectionError};
pub use exporter::{ExportError, ExportRequest, PatchExporter, SaveStateRequest, STATE_FILE_NAME};
pub use ignore_rules::{evaluate_ignore_rules, IgnoreRules};
pub use loader::ModObjectLoader;
pub use merge::merge_definitions;
pub use parser::{DefinitionParser, ParseArgs, WholeFileParser};
pub use patch_collection::{PatchCollectionService, ServiceComponents};
pub use priority::{PriorityPolicy, PriorityResolver, PriorityResult};
pub use reader::{FsModReader, ModFile, ModReader};
pub use retry::{RetryError, RetryPolicy};
pub use rules::{GameRulesProvider, PathRulesProvider, RulesRegistry};
pub use sync::{is_cached_definition_different, PatchStateSynchronizer, SyncTarget};
pub use writer::{FsModWriter, ModWriter, WriteLock, LOAD_ORDER_FILE};
