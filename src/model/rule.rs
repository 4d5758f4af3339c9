//! Data-product rules and their derived candidate-lookup targets.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Query,
    MetadataMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Exact,
    Wildcard,
    Regex,
    Prefix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub data_product_id: Uuid,
    pub rule_type: RuleType,
    pub query_expression: Option<String>,
    pub metadata_field: Option<String>,
    pub pattern_type: Option<PatternType>,
    pub pattern_value: Option<String>,
    pub priority: i32,
    pub is_enabled: bool,
}

impl Rule {
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        match self.rule_type {
            RuleType::Query => {
                if self.query_expression.as_deref().unwrap_or_default().is_empty() {
                    return Err(crate::error::Error::validation(
                        "query_expression",
                        "required for rule_type=query",
                    ));
                }
            }
            RuleType::MetadataMatch => {
                if self.metadata_field.as_deref().unwrap_or_default().is_empty() {
                    return Err(crate::error::Error::validation(
                        "metadata_field",
                        "required for rule_type=metadata_match",
                    ));
                }
                if self.pattern_type.is_none() {
                    return Err(crate::error::Error::validation(
                        "pattern_type",
                        "required for rule_type=metadata_match",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    AssetType,
    Provider,
    Tag,
    MetadataKey,
    /// Catch-all: the rule is unbounded and must be probed directly.
    Query,
}

/// Derived from a rule, used for fast candidate lookup. The target set is
/// an over-approximation of matching assets (§4.4 target extraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTarget {
    pub rule_id: Uuid,
    pub data_product_id: Uuid,
    pub target_type: TargetType,
    /// Empty when `target_type == Query`.
    pub target_value: String,
}
