//! Sync orchestration (§4.5, §8 S1): takes one plugin's
//! [`DiscoveryResult`], merges each asset onto its stored counterpart (or
//! inserts it fresh), materializes stub anchors for lineage endpoints
//! that don't exist yet, and reports a per-category change summary.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Error;
use crate::membership::reconcile_asset;
use crate::model::{Asset, BatchEdgeResult, ChangeType, Mrn};
use crate::store::assets::AssetStore;
use crate::store::lineage::LineageStore;
use crate::sync::merge::{merge, MergePolicy};
use crate::sync::plugin::DiscoveryResult;

#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub assets: BTreeMap<&'static str, u64>,
    pub lineage: BTreeMap<&'static str, u64>,
}

impl SyncSummary {
    fn record_asset(&mut self, change: ChangeType) {
        *self.assets.entry(change_key(change)).or_insert(0) += 1;
    }

    fn record_lineage(&mut self, status: &str) {
        *self.lineage.entry(leak(status)).or_insert(0) += 1;
    }
}

fn change_key(change: ChangeType) -> &'static str {
    match change {
        ChangeType::Created => "created",
        ChangeType::Updated => "updated",
        ChangeType::NoChange => "no_change",
    }
}

fn leak(s: &str) -> &'static str {
    match s {
        "created" => "created",
        "duplicate" => "duplicate",
        _ => "existing",
    }
}

/// Runs one plugin's discovery result against the store. Asset writes
/// and their resulting membership reconcile are serialized per asset
/// (§4.2's same-transaction requirement is honored at the trigger level,
/// not here); a failure on one asset is reported but does not abort the
/// remaining batch.
pub async fn apply_discovery(pool: &PgPool, result: &DiscoveryResult, policy: &MergePolicy) -> Result<SyncSummary, Error> {
    let assets = AssetStore::new(pool);
    let mut summary = SyncSummary::default();

    for observed in &result.assets {
        let change = match assets.get_by_mrn(&observed.mrn).await {
            Ok(existing) => {
                let merged = merge(&existing, observed, policy);
                assets.upsert(&merged).await?;
                reconcile_asset(pool, &merged).await?;
                ChangeType::Updated
            }
            Err(Error::NotFound { .. }) => {
                let mut fresh = observed.clone();
                fresh.id = Uuid::new_v4();
                fresh.is_stub = false;
                fresh.created_at = Utc::now();
                fresh.updated_at = Utc::now();
                assets.create(&fresh).await?;
                reconcile_asset(pool, &fresh).await?;
                ChangeType::Created
            }
            Err(other) => return Err(other),
        };
        summary.record_asset(change);
    }

    ensure_lineage_endpoints(pool, result).await?;
    let lineage_store = LineageStore::new(pool);
    let batch = lineage_store.upsert_batch(&result.lineage_edges).await?;
    for item in &batch {
        summary.record_lineage(status_str(item));
    }

    Ok(summary)
}

fn status_str(item: &BatchEdgeResult) -> &'static str {
    match item.status {
        crate::model::EdgeStatus::Created => "created",
        crate::model::EdgeStatus::Duplicate => "duplicate",
        crate::model::EdgeStatus::Existing => "existing",
    }
}

/// For every lineage edge endpoint with no backing asset row, create a
/// stub anchor so the edge has somewhere to point (§4.5).
async fn ensure_lineage_endpoints(pool: &PgPool, result: &DiscoveryResult) -> Result<(), Error> {
    let assets = AssetStore::new(pool);
    let mut endpoints: Vec<&Mrn> = Vec::new();
    for edge in &result.lineage_edges {
        endpoints.push(&edge.source_mrn);
        endpoints.push(&edge.target_mrn);
    }
    for mrn in endpoints {
        if assets.get_by_mrn(mrn).await.is_err() {
            let stub = stub_asset(mrn);
            assets.create(&stub).await.or_else(|err| match err {
                Error::Conflict(_) => Ok(()),
                other => Err(other),
            })?;
        }
    }
    Ok(())
}

fn stub_asset(mrn: &Mrn) -> Asset {
    Asset {
        id: Uuid::new_v4(),
        mrn: mrn.clone(),
        name: mrn.name().to_string(),
        asset_type: mrn.asset_type().to_string(),
        providers: std::iter::once(mrn.provider().to_string()).collect(),
        description: String::new(),
        user_description: String::new(),
        metadata: BTreeMap::new(),
        schema: BTreeMap::new(),
        environments: BTreeMap::new(),
        tags: Vec::new(),
        sources: Vec::new(),
        external_links: Vec::new(),
        is_stub: true,
        parent_mrn: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
