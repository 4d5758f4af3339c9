//! Data-product membership engine (§4.4, C2): rule evaluation, candidate
//! shortlisting, and incremental/full reconcile.

pub mod candidates;
pub mod evaluate;
pub mod reconcile;
pub mod stats;

pub use reconcile::{reconcile_all, reconcile_asset, ReconcileReport};
