//! The primary cataloged object.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::Error;
use crate::model::mrn::Mrn;

/// One environment an asset is present in (e.g. `prod`, `staging`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub path: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Json>,
}

/// One place an asset was observed from, e.g. a specific plugin run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSource {
    pub name: String,
    pub last_sync_at: DateTime<Utc>,
    #[serde(default)]
    pub properties: BTreeMap<String, Json>,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub label: String,
    pub url: String,
}

/// A cataloged object: table, topic, bucket, service, API spec, …
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub mrn: Mrn,
    pub name: String,
    /// Free-form tag, e.g. `Table`, `Topic`.
    #[serde(rename = "type")]
    pub asset_type: String,
    pub providers: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Json>,
    #[serde(default)]
    pub schema: BTreeMap<String, String>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentEntry>,
    /// Ordered, unique.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unique by `name`.
    #[serde(default)]
    pub sources: Vec<AssetSource>,
    #[serde(default)]
    pub external_links: Vec<ExternalLink>,
    pub is_stub: bool,
    pub parent_mrn: Option<Mrn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `{type, providers, tags, metadata_keys}` used for membership candidate
/// lookup (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSignature {
    pub asset_type: String,
    pub providers: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub metadata_keys: BTreeSet<String>,
}

impl Asset {
    /// Validate the invariants the specification pins to the asset
    /// itself (MRN validity, non-empty providers, unique source names).
    pub fn validate(&self) -> Result<(), Error> {
        if self.providers.is_empty() {
            return Err(Error::validation("providers", "must be non-empty"));
        }
        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                return Err(Error::validation("sources[].name", "must not be empty"));
            }
            if !seen.insert(source.name.clone()) {
                return Err(Error::validation(
                    "sources[].name",
                    format!("duplicate source name '{}'", source.name),
                ));
            }
        }
        let mut seen_tags = BTreeSet::new();
        for tag in &self.tags {
            if !seen_tags.insert(tag.clone()) {
                return Err(Error::validation("tags", format!("duplicate tag '{tag}'")));
            }
        }
        Ok(())
    }

    pub fn signature(&self) -> AssetSignature {
        AssetSignature {
            asset_type: self.asset_type.clone(),
            providers: self.providers.clone(),
            tags: self.tags.iter().cloned().collect(),
            metadata_keys: self.metadata.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Asset {
        Asset {
            id: Uuid::nil(),
            mrn: Mrn::parse("mrn://kafka/Topic/orders").unwrap(),
            name: "orders".into(),
            asset_type: "Topic".into(),
            providers: BTreeSet::from(["kafka".to_string()]),
            description: String::new(),
            user_description: String::new(),
            metadata: BTreeMap::new(),
            schema: BTreeMap::new(),
            environments: BTreeMap::new(),
            tags: vec![],
            sources: vec![],
            external_links: vec![],
            is_stub: false,
            parent_mrn: None,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn rejects_empty_providers() {
        let mut asset = sample();
        asset.providers.clear();
        assert!(asset.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_source_names() {
        let mut asset = sample();
        asset.sources = vec![
            AssetSource {
                name: "kafka".into(),
                last_sync_at: Utc.timestamp_opt(0, 0).unwrap(),
                properties: BTreeMap::new(),
                priority: 1,
            },
            AssetSource {
                name: "kafka".into(),
                last_sync_at: Utc.timestamp_opt(0, 0).unwrap(),
                properties: BTreeMap::new(),
                priority: 2,
            },
        ];
        assert!(asset.validate().is_err());
    }

    #[test]
    fn signature_collects_metadata_keys() {
        let mut asset = sample();
        asset.metadata.insert("owner".into(), Json::String("x".into()));
        asset.tags = vec!["pii".into()];
        let sig = asset.signature();
        assert!(sig.metadata_keys.contains("owner"));
        assert!(sig.tags.contains("pii"));
    }
}
