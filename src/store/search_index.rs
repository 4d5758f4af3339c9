//! The unified search index row shape and the pure projection functions
//! that mirror what the `search_index_sync` trigger
//! (`migrations/0001_schema.sql`) computes from a source row, kept here
//! so the projection logic has unit test coverage without a database.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::model::Asset;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndexRow {
    pub entity_id: Uuid,
    pub entity_kind: &'static str,
    pub entity_subtype: String,
    pub name: String,
    pub providers: Vec<String>,
    pub tags: Vec<String>,
    pub metadata: Json,
    /// Concatenated text fed to `to_tsvector`, not the tsvector itself —
    /// Postgres computes that column-side in the trigger.
    pub document_source: String,
    pub trigram_source: String,
}

/// Mirrors what the trigger does for an `assets` row: builds the flat
/// text blob that feeds `to_tsvector('english', ...)` and the trigram
/// similarity column, weighted name-first per the specification's rank
/// formula.
pub fn project_asset(asset: &Asset) -> SearchIndexRow {
    let mut text_parts = vec![asset.name.clone(), asset.description.clone(), asset.user_description.clone()];
    text_parts.extend(asset.tags.iter().cloned());
    text_parts.extend(metadata_text_values(&asset.metadata));

    SearchIndexRow {
        entity_id: asset.id,
        entity_kind: "asset",
        entity_subtype: asset.asset_type.clone(),
        name: asset.name.clone(),
        providers: asset.providers.iter().cloned().collect(),
        tags: asset.tags.clone(),
        metadata: serde_json::to_value(&asset.metadata).unwrap_or(Json::Null),
        document_source: text_parts.join(" "),
        trigram_source: asset.name.clone(),
    }
}

/// Only string-valued metadata feeds free text; nested objects/arrays and
/// non-string scalars are reachable via `@metadata.<path>` predicates
/// instead, not full-text search.
fn metadata_text_values(metadata: &BTreeMap<String, Json>) -> Vec<String> {
    metadata
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Facet counts over a result set, keyed by the facet's own name so the
/// caller can easily merge e.g. `type` and `providers` facets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FacetCounts(pub BTreeMap<String, BTreeMap<String, i64>>);

impl FacetCounts {
    pub fn record(&mut self, facet: &str, value: &str) {
        *self
            .0
            .entry(facet.to_string())
            .or_default()
            .entry(value.to_string())
            .or_insert(0) += 1;
    }
}

/// Tallies every facet dimension across `rows` in one pass. Plain
/// counting only — producing a `rows` slice whose own dimension's filter
/// has been removed (§4.3) is the caller's job; see
/// `search::service::SearchService::search`, which runs one query per
/// dimension with that dimension's predicate stripped before calling
/// into `search_index` for counts.
pub fn compute_facets(rows: &[SearchIndexRow]) -> FacetCounts {
    let mut facets = FacetCounts::default();
    for row in rows {
        facets.record("type", &row.entity_subtype);
        for provider in &row.providers {
            facets.record("providers", provider);
        }
        for tag in &row.tags {
            facets.record("tags", tag);
        }
    }
    facets
}

pub fn distinct_providers(rows: &[SearchIndexRow]) -> BTreeSet<String> {
    rows.iter().flat_map(|r| r.providers.iter().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mrn;
    use chrono::{TimeZone, Utc};

    fn sample_asset() -> Asset {
        let mut metadata = BTreeMap::new();
        metadata.insert("owner".to_string(), Json::String("data-team".into()));
        metadata.insert("row_count".to_string(), Json::Number(42.into()));
        Asset {
            id: Uuid::nil(),
            mrn: Mrn::parse("mrn://kafka/Topic/orders").unwrap(),
            name: "orders".into(),
            asset_type: "Topic".into(),
            providers: BTreeSet::from(["kafka".to_string()]),
            description: "order events".into(),
            user_description: String::new(),
            metadata,
            schema: BTreeMap::new(),
            environments: BTreeMap::new(),
            tags: vec!["pii".into()],
            sources: vec![],
            external_links: vec![],
            is_stub: false,
            parent_mrn: None,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn projection_includes_string_metadata_but_not_numbers() {
        let row = project_asset(&sample_asset());
        assert!(row.document_source.contains("data-team"));
        assert!(!row.document_source.contains("42"));
    }

    #[test]
    fn facets_count_per_distinct_value() {
        let rows = vec![project_asset(&sample_asset())];
        let facets = compute_facets(&rows);
        assert_eq!(facets.0["type"]["Topic"], 1);
        assert_eq!(facets.0["providers"]["kafka"], 1);
        assert_eq!(facets.0["tags"]["pii"], 1);
    }

    #[test]
    fn distinct_providers_dedupes_across_rows() {
        let rows = vec![project_asset(&sample_asset()), project_asset(&sample_asset())];
        assert_eq!(distinct_providers(&rows), BTreeSet::from(["kafka".to_string()]));
    }
}
