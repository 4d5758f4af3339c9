//! Candidate rule/asset lookup (§4.4): given an asset (or a rule), find
//! the over-approximate set of the other side worth exactly evaluating,
//! so reconcile never has to cross the full rules × assets product.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::Error;
use crate::model::{Asset, Rule};
use crate::store::rules::{extract_targets, targets_to_criteria};

/// Rules whose extracted target set intersects `asset`'s signature —
/// i.e. rules that could plausibly match this one asset.
pub fn candidate_rules<'a>(asset: &Asset, rules: &'a [Rule]) -> Vec<&'a Rule> {
    let signature = asset.signature();
    rules
        .iter()
        .filter(|rule| {
            extract_targets(rule).iter().any(|target| {
                use crate::model::TargetType;
                match target.target_type {
                    TargetType::Query => true,
                    TargetType::AssetType => target.target_value == signature.asset_type,
                    TargetType::Provider => signature.providers.contains(&target.target_value),
                    TargetType::Tag => signature.tags.contains(&target.target_value),
                    TargetType::MetadataKey => signature.metadata_keys.contains(&target.target_value),
                }
            })
        })
        .collect()
}

/// Target criteria collected across every rule belonging to one data
/// product, used to shortlist candidate assets via
/// [`crate::store::assets::AssetStore::find_by_targets`].
pub fn candidate_criteria_for_rules(
    rules: &[Rule],
) -> (BTreeSet<String>, BTreeSet<String>, BTreeSet<String>, BTreeSet<String>, bool) {
    let mut all_targets = Vec::new();
    let mut has_unbounded_query = false;
    for rule in rules {
        for target in extract_targets(rule) {
            if matches!(target.target_type, crate::model::TargetType::Query) {
                has_unbounded_query = true;
            }
            all_targets.push(target);
        }
    }
    let (asset_types, providers, tags, metadata_keys) = targets_to_criteria(&all_targets);
    (asset_types, providers, tags, metadata_keys, has_unbounded_query)
}

pub fn validate_rules(rules: &[Rule]) -> Result<(), Error> {
    for rule in rules {
        rule.validate()?;
    }
    Ok(())
}

pub type AssetId = Uuid;
