//! Data models for ModPatch.
//!
//! - [`Definition`]: one parsed unit of mod content and its grouping keys
//! - [`ConflictResult`]: the buckets produced by a conflict detection pass
//! - [`PatchState`]: resolution decisions persisted between runs
//! - [`ModEntry`] / [`GameContext`]: the active collection and selected game
//! - [`AppConfig`]: settings loaded from `ModPatch Config.yaml`
//!
//! Persisted structs derive `Serialize`/`Deserialize`; everything else is a
//! plain value owned by the operation that built it.

pub mod config;
pub mod conflict_result;
pub mod definition;
pub mod mod_entry;
pub mod patch_state;

pub use config::{
    AppConfig, Backoff, CollectionSettings, GameSettings, LoggingSettings, ModSettings,
    PatchSettings, RetrySettings,
};
pub use conflict_result::ConflictResult;
pub use definition::{hash_bytes, hash_code, Definition, DefinitionKey, ValueType};
pub use mod_entry::{GameContext, ModEntry, MOD_DIRECTORY};
pub use patch_state::PatchState;
