//! Membership CRUD and stats recomputation (§4.4).

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Error;
use crate::model::{Membership, MembershipSource, MembershipStats};

pub struct MembershipStore<'a> {
    pool: &'a PgPool,
}

impl<'a> MembershipStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        MembershipStore { pool }
    }

    pub async fn add(&self, membership: &Membership) -> Result<(), Error> {
        membership.validate()?;
        sqlx::query(
            "INSERT INTO memberships (data_product_id, asset_id, source, rule_id, created_at)
             VALUES ($1,$2,$3,$4,$5)
             ON CONFLICT (data_product_id, asset_id) DO UPDATE SET
               source = EXCLUDED.source,
               rule_id = EXCLUDED.rule_id",
        )
        .bind(membership.data_product_id)
        .bind(membership.asset_id)
        .bind(source_str(membership.source))
        .bind(membership.rule_id)
        .bind(membership.created_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, data_product_id: Uuid, asset_id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM memberships WHERE data_product_id = $1 AND asset_id = $2")
            .bind(data_product_id)
            .bind(asset_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("membership", format!("{data_product_id}/{asset_id}")));
        }
        Ok(())
    }

    /// Rule-sourced memberships for `data_product_id` not present in
    /// `keep_asset_ids` are removed; manual memberships are never touched
    /// by reconcile (§4.4). Used by a full reconcile, which evaluates
    /// every asset in the data product in one pass and so can safely
    /// prune across the whole product at once.
    pub async fn prune_rule_memberships_not_in(
        &self,
        data_product_id: Uuid,
        keep_asset_ids: &[Uuid],
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            "DELETE FROM memberships
             WHERE data_product_id = $1 AND source = 'rule' AND NOT (asset_id = ANY($2))",
        )
        .bind(data_product_id)
        .bind(keep_asset_ids)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Removes `asset_id`'s rule-sourced membership in `data_product_id`,
    /// if any. Scoped to one asset so an incremental reconcile of a
    /// single asset never touches any other asset's membership; a no-op
    /// if the asset has no membership there, or only a manual one.
    pub async fn remove_rule_membership(&self, data_product_id: Uuid, asset_id: Uuid) -> Result<(), Error> {
        sqlx::query("DELETE FROM memberships WHERE data_product_id = $1 AND asset_id = $2 AND source = 'rule'")
            .bind(data_product_id)
            .bind(asset_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn for_data_product(&self, data_product_id: Uuid) -> Result<Vec<Membership>, Error> {
        let rows = sqlx::query("SELECT * FROM memberships WHERE data_product_id = $1")
            .bind(data_product_id)
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_membership).collect()
    }

    pub async fn stats(&self, data_product_id: Uuid) -> Result<MembershipStats, Error> {
        let memberships = self.for_data_product(data_product_id).await?;
        Ok(MembershipStats::from_memberships(memberships.iter()))
    }
}

fn source_str(source: MembershipSource) -> &'static str {
    match source {
        MembershipSource::Manual => "manual",
        MembershipSource::Rule => "rule",
    }
}

fn row_to_membership(row: &sqlx::postgres::PgRow) -> Result<Membership, Error> {
    let source: String = row.try_get("source")?;
    Ok(Membership {
        data_product_id: row.try_get("data_product_id")?,
        asset_id: row.try_get("asset_id")?,
        source: match source.as_str() {
            "rule" => MembershipSource::Rule,
            _ => MembershipSource::Manual,
        },
        rule_id: row.try_get("rule_id")?,
        created_at: row.try_get("created_at")?,
    })
}
