//! The plugin contract (§6) and the in-process fan-out that isolates one
//! run's failures from its siblings.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::Error;
use crate::model::{Asset, LineageEdge};

/// Discovery is bounded well above a typical scan so a hung client
/// socket can't wedge a scheduler worker forever.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub assets: Vec<Asset>,
    pub lineage_edges: Vec<LineageEdge>,
    pub statistics: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub config_spec: Json,
}

/// One entry in a plugin's declared config schema; `sensitive` fields are
/// redacted wherever config is logged or surfaced over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    pub key: String,
    pub sensitive: bool,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn meta(&self) -> PluginMeta;

    /// Normalize and validate raw user-supplied config before any
    /// discovery run.
    fn validate(&self, raw_config: &Json) -> Result<Json, Error>;

    async fn discover(&self, normalized_config: &Json) -> Result<DiscoveryResult, Error>;
}

/// Strips fields a plugin's `config_spec` marks `sensitive` before the
/// config is logged or returned over an API boundary.
pub fn redact_sensitive(config: &Json, fields: &[ConfigField]) -> Json {
    let mut redacted = config.clone();
    if let Json::Object(map) = &mut redacted {
        for field in fields.iter().filter(|f| f.sensitive) {
            if map.contains_key(&field.key) {
                map.insert(field.key.clone(), Json::String("<redacted>".to_string()));
            }
        }
    }
    redacted
}

/// Include/exclude regex filter applied against one string, e.g. a
/// container or topic name. Exclusion wins on tie: a string matching
/// both an include and an exclude pattern is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Filter {
    /// An empty `include` list means "everything passes unless excluded".
    pub fn accepts(&self, candidate: &str) -> bool {
        let included = self.include.is_empty()
            || self.include.iter().any(|pat| Regex::new(pat).is_ok_and(|re| re.is_match(candidate)));
        if !included {
            return false;
        }
        !self.exclude.iter().any(|pat| Regex::new(pat).is_ok_and(|re| re.is_match(candidate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_list_passes_everything_not_excluded() {
        let filter = Filter {
            include: vec![],
            exclude: vec!["^tmp_".into()],
        };
        assert!(filter.accepts("orders"));
        assert!(!filter.accepts("tmp_orders"));
    }

    #[test]
    fn exclusion_wins_on_tie() {
        let filter = Filter {
            include: vec!["orders".into()],
            exclude: vec!["orders".into()],
        };
        assert!(!filter.accepts("orders"));
    }

    #[test]
    fn redact_sensitive_masks_only_flagged_fields() {
        let config = serde_json::json!({"host": "db.internal", "password": "hunter2"});
        let fields = vec![
            ConfigField { key: "host".into(), sensitive: false },
            ConfigField { key: "password".into(), sensitive: true },
        ];
        let redacted = redact_sensitive(&config, &fields);
        assert_eq!(redacted["host"], "db.internal");
        assert_eq!(redacted["password"], "<redacted>");
    }
}
