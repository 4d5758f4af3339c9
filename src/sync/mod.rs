//! Discovery, merge and sync orchestration (§4.5, C3).

pub mod merge;
pub mod pipeline;
pub mod plugin;

pub use merge::{merge, MergePolicy};
pub use pipeline::{apply_discovery, SyncSummary};
pub use plugin::{DiscoveryResult, Plugin, PluginMeta};
