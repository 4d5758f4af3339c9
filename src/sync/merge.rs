//! Deterministic merge of a new plugin observation onto an existing
//! asset row (§4.5).

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde_json::Value as Json;

use crate::model::{Asset, AssetSource, ExternalLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPolicy {
    Append,
    AppendOnly,
    Overwrite,
    KeepFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPolicy {
    Overwrite,
    KeepFirst,
}

/// Per-field merge policy, defaulting to `overwrite` everywhere per the
/// specification's default column.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    pub name: TextPolicy,
    pub description: TextPolicy,
    pub tags: TagPolicy,
    /// Empty means unrestricted: every incoming metadata key survives.
    pub metadata_allow: BTreeSet<String>,
    /// `{k}`-style templates re-evaluated against the merged metadata.
    pub external_link_templates: Vec<ExternalLinkTemplate>,
}

#[derive(Debug, Clone)]
pub struct ExternalLinkTemplate {
    pub label: String,
    pub url_template: String,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            name: TextPolicy::Overwrite,
            description: TextPolicy::Overwrite,
            tags: TagPolicy::Overwrite,
            metadata_allow: BTreeSet::new(),
            external_link_templates: Vec::new(),
        }
    }
}

/// Merge `observed` (the new discovery-pass asset) onto `existing`.
/// `observed.id`/`created_at` are ignored; the persisted row always keeps
/// `existing`'s identity.
pub fn merge(existing: &Asset, observed: &Asset, policy: &MergePolicy) -> Asset {
    let mut merged = existing.clone();

    merged.name = match policy.name {
        TextPolicy::Overwrite => observed.name.clone(),
        TextPolicy::KeepFirst => existing.name.clone(),
    };
    merged.description = match policy.description {
        TextPolicy::Overwrite => observed.description.clone(),
        TextPolicy::KeepFirst => existing.description.clone(),
    };

    merged.providers = existing.providers.union(&observed.providers).cloned().collect();
    merged.tags = merge_tags(&existing.tags, &observed.tags, policy.tags);
    merged.metadata = merge_metadata(&existing.metadata, &observed.metadata, &policy.metadata_allow);
    merged.sources = merge_sources(&existing.sources, &observed.sources);
    merged.schema = existing.schema.clone();
    for (k, v) in &observed.schema {
        merged.schema.insert(k.clone(), v.clone());
    }
    merged.environments = existing.environments.clone();
    for (env, entry) in &observed.environments {
        merged.environments.insert(env.clone(), entry.clone());
    }
    merged.external_links = render_external_links(&policy.external_link_templates, &merged.metadata);
    merged.is_stub = false;
    merged.updated_at = Utc::now();

    merged
}

fn merge_tags(existing: &[String], observed: &[String], policy: TagPolicy) -> Vec<String> {
    match policy {
        TagPolicy::Overwrite => dedup_preserve_order(observed),
        TagPolicy::KeepFirst => dedup_preserve_order(existing),
        TagPolicy::Append | TagPolicy::AppendOnly => {
            let mut out = existing.to_vec();
            out.extend(observed.iter().cloned());
            dedup_preserve_order(&out)
        }
    }
}

fn dedup_preserve_order(tags: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        if seen.insert(tag.clone()) {
            out.push(tag.clone());
        }
    }
    out
}

fn merge_metadata(
    existing: &BTreeMap<String, Json>,
    observed: &BTreeMap<String, Json>,
    allow: &BTreeSet<String>,
) -> BTreeMap<String, Json> {
    let mut merged = existing.clone();
    for (key, value) in observed {
        if allow.is_empty() || allow.contains(key) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Sources union by name; empty names are dropped (§4.5). A shared name
/// merges `properties` (new keys win), keeps the later `last_sync_at`,
/// keeps the higher `priority`. Result sorted by `priority` desc.
fn merge_sources(existing: &[AssetSource], observed: &[AssetSource]) -> Vec<AssetSource> {
    let mut by_name: BTreeMap<String, AssetSource> = BTreeMap::new();
    for source in existing.iter().chain(observed.iter()) {
        if source.name.is_empty() {
            continue;
        }
        by_name
            .entry(source.name.clone())
            .and_modify(|current| {
                for (k, v) in &source.properties {
                    current.properties.insert(k.clone(), v.clone());
                }
                if source.last_sync_at > current.last_sync_at {
                    current.last_sync_at = source.last_sync_at;
                }
                if source.priority > current.priority {
                    current.priority = source.priority;
                }
            })
            .or_insert_with(|| source.clone());
    }
    let mut out: Vec<AssetSource> = by_name.into_values().collect();
    out.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    out
}

fn render_external_links(templates: &[ExternalLinkTemplate], metadata: &BTreeMap<String, Json>) -> Vec<ExternalLink> {
    templates
        .iter()
        .map(|template| ExternalLink {
            label: template.label.clone(),
            url: render_template(&template.url_template, metadata),
        })
        .collect()
}

fn render_template(template: &str, metadata: &BTreeMap<String, Json>) -> String {
    let mut out = template.to_string();
    for (key, value) in metadata {
        let placeholder = format!("{{{key}}}");
        if out.contains(&placeholder) {
            let text = match value {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&placeholder, &text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mrn;
    use chrono::TimeZone;

    fn base_asset() -> Asset {
        Asset {
            id: uuid::Uuid::nil(),
            mrn: Mrn::parse("mrn://kafka/Topic/orders").unwrap(),
            name: "orders".into(),
            asset_type: "Topic".into(),
            providers: BTreeSet::from(["kafka".to_string()]),
            description: "old description".into(),
            user_description: String::new(),
            metadata: BTreeMap::new(),
            schema: BTreeMap::new(),
            environments: BTreeMap::new(),
            tags: vec!["legacy".into()],
            sources: vec![AssetSource {
                name: "kafka-scanner".into(),
                last_sync_at: Utc.timestamp_opt(0, 0).unwrap(),
                properties: BTreeMap::new(),
                priority: 1,
            }],
            external_links: vec![],
            is_stub: false,
            parent_mrn: None,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn append_tags_preserves_existing_order_then_new() {
        let existing = base_asset();
        let mut observed = base_asset();
        observed.tags = vec!["fresh".into(), "legacy".into()];
        let merged = merge(&existing, &observed, &MergePolicy { tags: TagPolicy::Append, ..Default::default() });
        assert_eq!(merged.tags, vec!["legacy".to_string(), "fresh".to_string()]);
    }

    #[test]
    fn sources_union_keeps_higher_priority_and_later_sync() {
        let existing = base_asset();
        let mut observed = base_asset();
        observed.sources = vec![AssetSource {
            name: "kafka-scanner".into(),
            last_sync_at: Utc.timestamp_opt(100, 0).unwrap(),
            properties: BTreeMap::from([("region".to_string(), Json::String("us".into()))]),
            priority: 0,
        }];
        let merged = merge(&existing, &observed, &MergePolicy::default());
        assert_eq!(merged.sources.len(), 1);
        assert_eq!(merged.sources[0].priority, 1);
        assert_eq!(merged.sources[0].last_sync_at, Utc.timestamp_opt(100, 0).unwrap());
        assert!(merged.sources[0].properties.contains_key("region"));
    }

    #[test]
    fn empty_name_sources_are_dropped() {
        let existing = base_asset();
        let mut observed = base_asset();
        observed.sources = vec![AssetSource {
            name: String::new(),
            last_sync_at: Utc.timestamp_opt(0, 0).unwrap(),
            properties: BTreeMap::new(),
            priority: 5,
        }];
        let merged = merge(&existing, &observed, &MergePolicy::default());
        assert!(merged.sources.iter().all(|s| !s.name.is_empty()));
    }

    #[test]
    fn metadata_allow_list_restricts_survivors() {
        let existing = base_asset();
        let mut observed = base_asset();
        observed.metadata.insert("owner".to_string(), Json::String("team-a".into()));
        observed.metadata.insert("secret".to_string(), Json::String("x".into()));
        let policy = MergePolicy {
            metadata_allow: BTreeSet::from(["owner".to_string()]),
            ..Default::default()
        };
        let merged = merge(&existing, &observed, &policy);
        assert!(merged.metadata.contains_key("owner"));
        assert!(!merged.metadata.contains_key("secret"));
    }

    #[test]
    fn keep_first_name_ignores_new_observation() {
        let existing = base_asset();
        let mut observed = base_asset();
        observed.name = "renamed".into();
        let merged = merge(&existing, &observed, &MergePolicy { name: TextPolicy::KeepFirst, ..Default::default() });
        assert_eq!(merged.name, "orders");
    }
}
