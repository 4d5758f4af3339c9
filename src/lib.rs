//! # marmot-core
//!
//! Catalog core for Marmot: the relational asset/lineage store, the unified
//! search index, the rule-based data-product membership engine, the sync
//! merge pipeline, and the singleton-leased background scheduler.
//!
//! ## Module map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`model`] | Asset, lineage edge, rule, membership and pipeline types |
//! | [`query`] | The catalog query language: parser, AST, SQL compiler |
//! | [`store`] | Postgres-backed persistence for every model type |
//! | [`search`] | Full-text + trigram search over the unified index |
//! | [`membership`] | Candidate lookup, exact rule evaluation, reconcile |
//! | [`sync`] | Plugin discovery results merged into the catalog |
//! | [`scheduler`] | Pipeline run claiming, singleton leases, the tick loop |
//! | [`broadcast`] | In-process pub/sub for pipeline run events |
//! | [`crypto`] | At-rest encryption for pipeline connection secrets |
//! | [`config`] | Layered configuration (file + env) |
//! | [`telemetry`] | Structured logging setup |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use marmot_core::config::Config;
//! use marmot_core::store::Pools;
//!
//! let config = Config::load()?;
//! let pools = Pools::connect(&config.store).await?;
//! pools.migrate().await?;
//! ```

pub mod broadcast;
pub mod config;
pub mod crypto;
pub mod error;
pub mod membership;
pub mod model;
pub mod query;
pub mod scheduler;
pub mod search;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use error::Error;
