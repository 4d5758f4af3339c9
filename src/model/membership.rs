//! `(data_product, asset)` membership rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipSource {
    Manual,
    Rule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub data_product_id: Uuid,
    pub asset_id: Uuid,
    pub source: MembershipSource,
    /// Null iff `source == Manual`.
    pub rule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        match self.source {
            MembershipSource::Manual if self.rule_id.is_some() => Err(crate::error::Error::validation(
                "rule_id",
                "must be null when source=manual",
            )),
            MembershipSource::Rule if self.rule_id.is_none() => Err(crate::error::Error::validation(
                "rule_id",
                "required when source=rule",
            )),
            _ => Ok(()),
        }
    }
}

/// Recomputed after any membership mutation on a data product.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MembershipStats {
    pub asset_count: i64,
    pub manual_asset_count: i64,
    pub rule_asset_count: i64,
}

impl MembershipStats {
    pub fn from_memberships<'a>(memberships: impl Iterator<Item = &'a Membership>) -> Self {
        let mut stats = MembershipStats::default();
        for m in memberships {
            stats.asset_count += 1;
            match m.source {
                MembershipSource::Manual => stats.manual_asset_count += 1,
                MembershipSource::Rule => stats.rule_asset_count += 1,
            }
        }
        stats
    }
}
