//! Membership reconcile (§4.4): incremental (one asset, on write) and
//! full (every enabled rule against every non-stub asset, scheduled).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Error;
use crate::membership::candidates::{candidate_criteria_for_rules, candidate_rules};
use crate::membership::evaluate::{self, QUERY_EVAL_TIMEOUT};
use crate::model::{Asset, Membership, MembershipSource, Rule};
use crate::store::assets::AssetStore;
use crate::store::memberships::MembershipStore;
use crate::store::rules::RuleStore;

/// Number of assets scanned per committed batch during a full reconcile,
/// so a long-running scan can be interrupted and resumed without losing
/// all its progress, and doesn't hold one giant transaction open.
pub const FULL_RECONCILE_BATCH_SIZE: usize = 500;

/// Recompute rule-sourced membership for a single asset against every
/// enabled rule. Runs inside the caller's transaction-scoped pool so a
/// concurrent reconcile of the same asset serializes via row locking at
/// the membership-store layer rather than racing.
pub async fn reconcile_asset(pool: &PgPool, asset: &Asset) -> Result<(), Error> {
    if asset.is_stub {
        return Ok(());
    }
    let rules = RuleStore::new(pool).all_enabled().await?;
    let candidates = candidate_rules(asset, &rules);

    let memberships = MembershipStore::new(pool);

    // A data product can have more than one matching rule; keep the
    // highest-priority match per product as the membership's rule_id
    // rather than an arbitrary one.
    let mut matched_by_product: BTreeMap<Uuid, &Rule> = BTreeMap::new();
    for rule in candidates {
        let matched = tokio::time::timeout(QUERY_EVAL_TIMEOUT, async { evaluate::matches(rule, asset) })
            .await
            .map_err(|_| Error::TransientStore("rule evaluation timed out".into()))??;
        if matched {
            let keep_new = matched_by_product
                .get(&rule.data_product_id)
                .is_none_or(|existing| rule.priority > existing.priority);
            if keep_new {
                matched_by_product.insert(rule.data_product_id, rule);
            }
        }
    }

    for (&data_product_id, rule) in &matched_by_product {
        memberships
            .add(&Membership {
                data_product_id,
                asset_id: asset.id,
                source: MembershipSource::Rule,
                rule_id: Some(rule.id),
                created_at: Utc::now(),
            })
            .await?;
    }

    // Every enabled rule's data product that this asset did *not* match
    // this time must drop any stale rule-sourced membership, but only
    // for this asset — other assets' memberships in that product are
    // untouched (§4.4 point 3: diff against current memberships for
    // *that asset*).
    let mut seen_products = BTreeMap::new();
    for rule in &rules {
        if matched_by_product.contains_key(&rule.data_product_id) {
            continue;
        }
        if seen_products.insert(rule.data_product_id, ()).is_some() {
            continue;
        }
        memberships.remove_rule_membership(rule.data_product_id, asset.id).await?;
    }
    Ok(())
}

/// Full reconcile: every enabled rule's data product re-evaluated
/// against every candidate asset, in asset batches, running under the
/// singleton lease described in [`crate::scheduler::singleton`].
pub async fn reconcile_all(pool: &PgPool, data_product_id: Uuid, rules: &[Rule]) -> Result<ReconcileReport, Error> {
    let assets = AssetStore::new(pool);
    let memberships = MembershipStore::new(pool);
    let (asset_types, providers, tags, metadata_keys, unbounded) = candidate_criteria_for_rules(rules);

    let candidate_ids = if unbounded {
        // A query rule with no extractable target is unbounded: fall
        // back to scanning every non-stub asset rather than skipping it.
        all_non_stub_asset_ids(pool).await?
    } else {
        assets.find_by_targets(&asset_types, &providers, &tags, &metadata_keys).await?
    };

    let mut report = ReconcileReport::default();
    // (asset_id, id of the highest-priority rule that actually matched it)
    let mut matched: Vec<(Uuid, Uuid)> = Vec::new();

    for chunk in candidate_ids.chunks(FULL_RECONCILE_BATCH_SIZE) {
        for &asset_id in chunk {
            let asset = assets.get(asset_id).await?;
            let best = rules
                .iter()
                .filter(|rule| evaluate::matches(rule, &asset).unwrap_or(false))
                .max_by_key(|rule| rule.priority);
            report.evaluated += 1;
            if let Some(rule) = best {
                matched.push((asset_id, rule.id));
                report.matched += 1;
            }
        }
        tokio::time::sleep(Duration::ZERO).await; // yield between batches
    }

    for &(asset_id, rule_id) in &matched {
        memberships
            .add(&Membership {
                data_product_id,
                asset_id,
                source: MembershipSource::Rule,
                rule_id: Some(rule_id),
                created_at: Utc::now(),
            })
            .await?;
    }
    let matched_ids: Vec<Uuid> = matched.iter().map(|&(asset_id, _)| asset_id).collect();
    report.pruned = memberships.prune_rule_memberships_not_in(data_product_id, &matched_ids).await?;

    Ok(report)
}

async fn all_non_stub_asset_ids(pool: &PgPool) -> Result<Vec<Uuid>, Error> {
    use sqlx::Row;
    let rows = sqlx::query("SELECT id FROM assets WHERE is_stub = FALSE").fetch_all(pool).await?;
    Ok(rows.iter().map(|r| r.get::<Uuid, _>("id")).collect())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileReport {
    pub evaluated: u64,
    pub matched: u64,
    pub pruned: u64,
}
