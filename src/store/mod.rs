//! The relational store layer (§4.2, §5): a thin typed wrapper per
//! entity group over a shared connection pool, with no caching of its
//! own — the search index and membership reconcile queue are kept in
//! sync by Postgres triggers defined in `migrations/`, not by
//! application-level cache invalidation.

pub mod assets;
pub mod lease;
pub mod lineage;
pub mod memberships;
pub mod pipelines;
pub mod pool;
pub mod rules;
pub mod search_index;

pub use assets::AssetStore;
pub use lease::LeaseStore;
pub use lineage::LineageStore;
pub use memberships::MembershipStore;
pub use pipelines::PipelineStore;
pub use pool::Pools;
pub use rules::RuleStore;
