//! Exact rule evaluation (§4.4), run only against the candidate set a
//! cheaper over-approximate lookup already shortlisted.

use regex::Regex;
use serde_json::Value as Json;
use std::time::Duration;

use crate::error::Error;
use crate::model::{Asset, PatternType, Rule, RuleType};
use crate::query;

/// Query-rule re-evaluation against a single asset is bounded so one
/// pathological regex or a runaway plan can't stall reconcile forever;
/// it is enforced by the caller wrapping this in `tokio::time::timeout`.
pub const QUERY_EVAL_TIMEOUT: Duration = Duration::from_secs(2);

/// True if `asset` matches `rule` exactly. Only valid once the asset has
/// already passed candidate shortlisting — this is the expensive,
/// authoritative check.
pub fn matches(rule: &Rule, asset: &Asset) -> Result<bool, Error> {
    if asset.is_stub {
        return Ok(false);
    }
    match rule.rule_type {
        RuleType::MetadataMatch => Ok(metadata_match(rule, asset)),
        RuleType::Query => query_match(rule, asset),
    }
}

fn metadata_match(rule: &Rule, asset: &Asset) -> bool {
    let field = rule.metadata_field.as_deref().unwrap_or_default();
    let Some(value) = asset.metadata.get(field) else {
        return false;
    };
    let Some(text) = json_as_text(value) else {
        return false;
    };
    let pattern = rule.pattern_value.as_deref().unwrap_or_default();
    match rule.pattern_type.unwrap_or(PatternType::Exact) {
        PatternType::Exact => text == pattern,
        PatternType::Wildcard => {
            // An empty pattern matches nothing under `wildcard`, unlike
            // `prefix` below: preserved deliberately, see rule_targets.
            if pattern.is_empty() {
                return false;
            }
            wildcard_match(pattern, &text)
        }
        PatternType::Prefix => text.starts_with(pattern),
        PatternType::Regex => Regex::new(pattern).is_ok_and(|re| re.is_match(&text)),
    }
}

fn json_as_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Case-insensitive `*`-glob match, `*` translated to a `.*` equivalent
/// under case folding (mirrors the `%`-under-LIKE semantics in the
/// specification without going through SQL).
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern_lower = pattern.to_lowercase();
    let text_lower = text.to_lowercase();
    let parts: Vec<&str> = pattern_lower.split('*').collect();
    glob_match(&parts, &text_lower, pattern_lower.starts_with('*'), pattern_lower.ends_with('*'))
}

fn glob_match(parts: &[&str], text: &str, leading_star: bool, trailing_star: bool) -> bool {
    if parts.len() == 1 {
        return if leading_star || trailing_star {
            text.contains(parts[0])
        } else {
            text == parts[0]
        };
    }
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 && !leading_star {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 && !trailing_star {
            if !rest.ends_with(part) {
                return false;
            }
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn query_match(rule: &Rule, asset: &Asset) -> Result<bool, Error> {
    let expr = rule.query_expression.as_deref().unwrap_or_default();
    let ast = query::parse(expr)?;
    Ok(eval_ast(&ast, asset))
}

fn eval_ast(ast: &query::Ast, asset: &Asset) -> bool {
    use query::Ast;
    match ast {
        Ast::Word(w) if w.is_empty() => true,
        Ast::Word(w) => {
            asset.name.to_lowercase().contains(&w.to_lowercase())
                || asset.description.to_lowercase().contains(&w.to_lowercase())
        }
        Ast::Phrase(p) => asset.name.to_lowercase().contains(&p.to_lowercase()),
        Ast::Not(inner) => !eval_ast(inner, asset),
        Ast::And(l, r) => eval_ast(l, asset) && eval_ast(r, asset),
        Ast::Or(l, r) => eval_ast(l, asset) || eval_ast(r, asset),
        Ast::FieldPred { path, op, value } => eval_field_pred(path, *op, value, asset),
    }
}

fn eval_field_pred(path: &query::Path, op: query::Op, value: &query::Value, asset: &Asset) -> bool {
    use query::Value;
    let root = path.first_segment();
    let text_value = match value {
        Value::Word(w) => w.clone(),
        Value::Phrase(p) => p.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
    };
    match root {
        "type" => eval_scalar(&asset.asset_type, op, &text_value),
        "providers" => eval_set_membership(asset.providers.iter(), op, &text_value),
        "tags" => eval_set_membership(asset.tags.iter(), op, &text_value),
        "metadata" => {
            let key = path.rest().first().cloned().unwrap_or_default();
            match asset.metadata.get(&key).and_then(json_as_text) {
                Some(actual) => eval_scalar(&actual, op, &text_value),
                None => false,
            }
        }
        _ => false,
    }
}

fn eval_scalar(actual: &str, op: query::Op, expected: &str) -> bool {
    use query::Op;
    match op {
        Op::Eq | Op::Match => actual == expected || actual.to_lowercase().contains(&expected.to_lowercase()),
        Op::Ne => actual != expected,
        Op::Regex => Regex::new(expected).is_ok_and(|re| re.is_match(actual)),
        Op::NotRegex => !Regex::new(expected).is_ok_and(|re| re.is_match(actual)),
        Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
            let (Ok(a), Ok(b)) = (actual.parse::<f64>(), expected.parse::<f64>()) else {
                return false;
            };
            match op {
                Op::Gt => a > b,
                Op::Gte => a >= b,
                Op::Lt => a < b,
                Op::Lte => a <= b,
                _ => unreachable!(),
            }
        }
    }
}

fn eval_set_membership<'a>(mut values: impl Iterator<Item = &'a String>, op: query::Op, expected: &str) -> bool {
    use query::Op;
    let found = values.any(|v| v == expected);
    match op {
        Op::Ne | Op::NotRegex => !found,
        _ => found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mrn;
    use chrono::{TimeZone, Utc};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_asset() -> Asset {
        let mut metadata = BTreeMap::new();
        metadata.insert("owner".to_string(), Json::String("data-team".into()));
        Asset {
            id: uuid::Uuid::nil(),
            mrn: Mrn::parse("mrn://kafka/Topic/orders").unwrap(),
            name: "orders".into(),
            asset_type: "Topic".into(),
            providers: BTreeSet::from(["kafka".to_string()]),
            description: String::new(),
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

    fn metadata_rule(pattern_type: PatternType, pattern_value: &str) -> Rule {
        Rule {
            id: uuid::Uuid::nil(),
            data_product_id: uuid::Uuid::nil(),
            rule_type: RuleType::MetadataMatch,
            query_expression: None,
            metadata_field: Some("owner".into()),
            pattern_type: Some(pattern_type),
            pattern_value: Some(pattern_value.into()),
            priority: 0,
            is_enabled: true,
        }
    }

    #[test]
    fn exact_pattern_requires_full_match() {
        let rule = metadata_rule(PatternType::Exact, "data-team");
        assert!(matches(&rule, &sample_asset()).unwrap());
        let rule = metadata_rule(PatternType::Exact, "data");
        assert!(!matches(&rule, &sample_asset()).unwrap());
    }

    #[test]
    fn empty_wildcard_pattern_matches_nothing() {
        let rule = metadata_rule(PatternType::Wildcard, "");
        assert!(!matches(&rule, &sample_asset()).unwrap());
    }

    #[test]
    fn empty_prefix_pattern_matches_everything() {
        let rule = metadata_rule(PatternType::Prefix, "");
        assert!(matches(&rule, &sample_asset()).unwrap());
    }

    #[test]
    fn wildcard_star_matches_any_suffix() {
        let rule = metadata_rule(PatternType::Wildcard, "data-*");
        assert!(matches(&rule, &sample_asset()).unwrap());
    }

    #[test]
    fn stub_assets_never_match() {
        let rule = metadata_rule(PatternType::Exact, "data-team");
        let mut asset = sample_asset();
        asset.is_stub = true;
        assert!(!matches(&rule, &asset).unwrap());
    }

    #[test]
    fn query_rule_matches_type_predicate() {
        let rule = Rule {
            rule_type: RuleType::Query,
            query_expression: Some("@type=\"Topic\"".into()),
            metadata_field: None,
            pattern_type: None,
            pattern_value: None,
            ..metadata_rule(PatternType::Exact, "")
        };
        assert!(matches(&rule, &sample_asset()).unwrap());
    }
}
