//! Asset CRUD (§3, §4.2).
//!
//! Writes here run inside a single transaction so that the
//! `search_index` projection and `membership_reconcile_queue` enqueue
//! implemented as Postgres triggers (`migrations/0001_schema.sql`) are
//! guaranteed to observe the same row the caller just wrote — the
//! specification's same-transaction invariant can only be honored from
//! inside the database, not from application code racing it.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::Error;
use crate::model::{Asset, AssetSignature, Mrn};

pub struct AssetStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AssetStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        AssetStore { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Asset, Error> {
        let row = sqlx::query("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("asset", id.to_string()))?;
        row_to_asset(&row)
    }

    pub async fn get_by_mrn(&self, mrn: &Mrn) -> Result<Asset, Error> {
        let row = sqlx::query("SELECT * FROM assets WHERE mrn = $1")
            .bind(mrn.as_str())
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("asset", mrn.as_str()))?;
        row_to_asset(&row)
    }

    /// Insert a brand-new asset row. Callers performing discovery merges
    /// use [`AssetStore::upsert`] instead; this is for manual/API-driven
    /// creation where no prior row can exist.
    pub async fn create(&self, asset: &Asset) -> Result<(), Error> {
        asset.validate()?;
        let tags: Vec<String> = asset.tags.clone();
        let providers: Vec<String> = asset.providers.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO assets
               (id, mrn, name, asset_type, providers, description, user_description,
                metadata, schema, environments, tags, sources, external_links,
                is_stub, parent_mrn, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)",
        )
        .bind(asset.id)
        .bind(asset.mrn.as_str())
        .bind(&asset.name)
        .bind(&asset.asset_type)
        .bind(&providers)
        .bind(&asset.description)
        .bind(&asset.user_description)
        .bind(serde_json::to_value(&asset.metadata)?)
        .bind(serde_json::to_value(&asset.schema)?)
        .bind(serde_json::to_value(&asset.environments)?)
        .bind(&tags)
        .bind(serde_json::to_value(&asset.sources)?)
        .bind(serde_json::to_value(&asset.external_links)?)
        .bind(asset.is_stub)
        .bind(asset.parent_mrn.as_ref().map(Mrn::as_str))
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Replace the full row with the merged result already computed by
    /// [`crate::sync::merge`]. `updated_at` must already reflect "now".
    pub async fn upsert(&self, asset: &Asset) -> Result<(), Error> {
        asset.validate()?;
        let tags: Vec<String> = asset.tags.clone();
        let providers: Vec<String> = asset.providers.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO assets
               (id, mrn, name, asset_type, providers, description, user_description,
                metadata, schema, environments, tags, sources, external_links,
                is_stub, parent_mrn, created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
             ON CONFLICT (mrn) DO UPDATE SET
               name = EXCLUDED.name,
               asset_type = EXCLUDED.asset_type,
               providers = EXCLUDED.providers,
               description = EXCLUDED.description,
               user_description = EXCLUDED.user_description,
               metadata = EXCLUDED.metadata,
               schema = EXCLUDED.schema,
               environments = EXCLUDED.environments,
               tags = EXCLUDED.tags,
               sources = EXCLUDED.sources,
               external_links = EXCLUDED.external_links,
               is_stub = EXCLUDED.is_stub,
               parent_mrn = EXCLUDED.parent_mrn,
               updated_at = EXCLUDED.updated_at",
        )
        .bind(asset.id)
        .bind(asset.mrn.as_str())
        .bind(&asset.name)
        .bind(&asset.asset_type)
        .bind(&providers)
        .bind(&asset.description)
        .bind(&asset.user_description)
        .bind(serde_json::to_value(&asset.metadata)?)
        .bind(serde_json::to_value(&asset.schema)?)
        .bind(serde_json::to_value(&asset.environments)?)
        .bind(&tags)
        .bind(serde_json::to_value(&asset.sources)?)
        .bind(serde_json::to_value(&asset.external_links)?)
        .bind(asset.is_stub)
        .bind(asset.parent_mrn.as_ref().map(Mrn::as_str))
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM assets WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("asset", id.to_string()));
        }
        Ok(())
    }

    /// `{type, providers, tags, metadata_keys}` signature used by the
    /// membership candidate lookup (§4.4).
    pub async fn signature(&self, id: Uuid) -> Result<AssetSignature, Error> {
        let asset = self.get(id).await?;
        Ok(asset.signature())
    }

    /// Page through non-stub assets matching an over-approximate target
    /// set, used by the membership engine before exact evaluation.
    pub async fn find_by_targets(
        &self,
        asset_types: &BTreeSet<String>,
        providers: &BTreeSet<String>,
        tags: &BTreeSet<String>,
        metadata_keys: &BTreeSet<String>,
    ) -> Result<Vec<Uuid>, Error> {
        if asset_types.is_empty() && providers.is_empty() && tags.is_empty() && metadata_keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut b: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT DISTINCT id FROM assets WHERE is_stub = FALSE AND (FALSE",
        );
        if !asset_types.is_empty() {
            b.push(" OR asset_type = ANY(").push_bind(asset_types.iter().cloned().collect::<Vec<_>>()).push(")");
        }
        if !providers.is_empty() {
            b.push(" OR providers && ").push_bind(providers.iter().cloned().collect::<Vec<_>>()).push("::text[]");
        }
        if !tags.is_empty() {
            b.push(" OR tags && ").push_bind(tags.iter().cloned().collect::<Vec<_>>()).push("::text[]");
        }
        for key in metadata_keys {
            b.push(" OR metadata ? ").push_bind(key.clone());
        }
        b.push(")");
        let rows = b.build().fetch_all(self.pool).await?;
        Ok(rows.iter().map(|r| r.get::<Uuid, _>("id")).collect())
    }
}

fn row_to_asset(row: &sqlx::postgres::PgRow) -> Result<Asset, Error> {
    let metadata: serde_json::Value = row.try_get("metadata")?;
    let schema: serde_json::Value = row.try_get("schema")?;
    let environments: serde_json::Value = row.try_get("environments")?;
    let sources: serde_json::Value = row.try_get("sources")?;
    let external_links: serde_json::Value = row.try_get("external_links")?;
    let providers: Vec<String> = row.try_get("providers")?;
    let parent_mrn: Option<String> = row.try_get("parent_mrn")?;

    Ok(Asset {
        id: row.try_get("id")?,
        mrn: Mrn::parse(row.try_get::<String, _>("mrn")?.as_str())?,
        name: row.try_get("name")?,
        asset_type: row.try_get("asset_type")?,
        providers: providers.into_iter().collect::<BTreeSet<_>>(),
        description: row.try_get("description")?,
        user_description: row.try_get("user_description")?,
        metadata: serde_json::from_value(metadata).unwrap_or_default(),
        schema: serde_json::from_value(schema).unwrap_or_default(),
        environments: serde_json::from_value(environments).unwrap_or_default(),
        tags: row.try_get::<Vec<String>, _>("tags")?,
        sources: serde_json::from_value(sources).unwrap_or_default(),
        external_links: serde_json::from_value(external_links).unwrap_or_default(),
        is_stub: row.try_get("is_stub")?,
        parent_mrn: parent_mrn.map(|p| Mrn::parse(&p)).transpose()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Projection mirror of the `metadata` column's unpacking, kept as a pure
/// function so the search-index trigger's shape (see
/// `migrations/0001_schema.sql`) can be unit-tested without a database.
pub fn metadata_keys(metadata: &BTreeMap<String, serde_json::Value>) -> BTreeSet<String> {
    metadata.keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_keys_mirrors_map_keys() {
        let mut metadata = BTreeMap::new();
        metadata.insert("owner".to_string(), serde_json::Value::String("x".into()));
        metadata.insert("pii".to_string(), serde_json::Value::Bool(true));
        let keys = metadata_keys(&metadata);
        assert_eq!(keys, BTreeSet::from(["owner".to_string(), "pii".to_string()]));
    }
}
