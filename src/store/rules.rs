//! Data-product rule CRUD and the target-extraction projection used by
//! the membership candidate lookup (§4.4).

use std::collections::BTreeSet;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Error;
use crate::model::{PatternType, Rule, RuleTarget, RuleType, TargetType};
use crate::query::{self, Ast};

pub struct RuleStore<'a> {
    pool: &'a PgPool,
}

impl<'a> RuleStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        RuleStore { pool }
    }

    pub async fn create(&self, rule: &Rule) -> Result<(), Error> {
        rule.validate()?;
        sqlx::query(
            "INSERT INTO rules
               (id, data_product_id, rule_type, query_expression, metadata_field,
                pattern_type, pattern_value, priority, is_enabled)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(rule.id)
        .bind(rule.data_product_id)
        .bind(rule_type_str(rule.rule_type))
        .bind(&rule.query_expression)
        .bind(&rule.metadata_field)
        .bind(rule.pattern_type.map(pattern_type_str))
        .bind(&rule.pattern_value)
        .bind(rule.priority)
        .bind(rule.is_enabled)
        .execute(self.pool)
        .await?;
        self.replace_targets(rule).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1").bind(id).execute(self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("rule", id.to_string()));
        }
        Ok(())
    }

    pub async fn for_data_product(&self, data_product_id: Uuid) -> Result<Vec<Rule>, Error> {
        let rows = sqlx::query("SELECT * FROM rules WHERE data_product_id = $1 ORDER BY priority DESC")
            .bind(data_product_id)
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_rule).collect()
    }

    pub async fn all_enabled(&self) -> Result<Vec<Rule>, Error> {
        let rows = sqlx::query("SELECT * FROM rules WHERE is_enabled = TRUE")
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_rule).collect()
    }

    /// Recompute and persist the rule's extracted target rows (§4.4): an
    /// over-approximation used to shortlist candidate assets before the
    /// exact evaluator runs.
    async fn replace_targets(&self, rule: &Rule) -> Result<(), Error> {
        sqlx::query("DELETE FROM rule_targets WHERE rule_id = $1")
            .bind(rule.id)
            .execute(self.pool)
            .await?;
        for target in extract_targets(rule) {
            sqlx::query(
                "INSERT INTO rule_targets (rule_id, data_product_id, target_type, target_value)
                 VALUES ($1,$2,$3,$4)",
            )
            .bind(target.rule_id)
            .bind(target.data_product_id)
            .bind(target_type_str(target.target_type))
            .bind(&target.target_value)
            .execute(self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn rules_targeting(&self, target_types: &[TargetType]) -> Result<Vec<Uuid>, Error> {
        let names: Vec<String> = target_types.iter().map(|t| target_type_str(*t).to_string()).collect();
        let rows = sqlx::query("SELECT DISTINCT rule_id FROM rule_targets WHERE target_type = ANY($1)")
            .bind(&names)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<Uuid, _>("rule_id")).collect())
    }
}

/// Over-approximates which assets a rule could possibly match, so the
/// candidate lookup can skip assets that have no chance of qualifying
/// before running the (more expensive) exact evaluation. `RuleType::Query`
/// rules are unbounded and fall back to `TargetType::Query`, meaning
/// every asset is a candidate.
pub fn extract_targets(rule: &Rule) -> Vec<RuleTarget> {
    match rule.rule_type {
        RuleType::Query => {
            let expr = rule.query_expression.as_deref().unwrap_or_default();
            match query::parse(expr) {
                Ok(ast) => {
                    let mut targets = Vec::new();
                    collect_query_targets(&ast, rule, &mut targets);
                    if targets.is_empty() {
                        targets.push(fallback_target(rule));
                    }
                    targets
                }
                Err(_) => vec![fallback_target(rule)],
            }
        }
        RuleType::MetadataMatch => {
            let field = rule.metadata_field.as_deref().unwrap_or_default();
            vec![RuleTarget {
                rule_id: rule.id,
                data_product_id: rule.data_product_id,
                target_type: TargetType::MetadataKey,
                target_value: field.to_string(),
            }]
        }
    }
}

fn fallback_target(rule: &Rule) -> RuleTarget {
    RuleTarget {
        rule_id: rule.id,
        data_product_id: rule.data_product_id,
        target_type: TargetType::Query,
        target_value: String::new(),
    }
}

fn collect_query_targets(ast: &Ast, rule: &Rule, out: &mut Vec<RuleTarget>) {
    match ast {
        Ast::FieldPred { path, value, .. } => {
            let root = path.first_segment();
            let target_type = match root {
                "type" => Some(TargetType::AssetType),
                "providers" => Some(TargetType::Provider),
                "tags" => Some(TargetType::Tag),
                "metadata" => Some(TargetType::MetadataKey),
                _ => None,
            };
            if let Some(target_type) = target_type {
                let target_value = if root == "metadata" {
                    path.rest().first().cloned().unwrap_or_default()
                } else {
                    value.to_string()
                };
                out.push(RuleTarget {
                    rule_id: rule.id,
                    data_product_id: rule.data_product_id,
                    target_type,
                    target_value,
                });
            }
        }
        Ast::And(l, r) | Ast::Or(l, r) => {
            collect_query_targets(l, rule, out);
            collect_query_targets(r, rule, out);
        }
        Ast::Not(inner) => collect_query_targets(inner, rule, out),
        Ast::Word(_) | Ast::Phrase(_) => {}
    }
}

fn rule_type_str(t: RuleType) -> &'static str {
    match t {
        RuleType::Query => "query",
        RuleType::MetadataMatch => "metadata_match",
    }
}

fn pattern_type_str(t: PatternType) -> &'static str {
    match t {
        PatternType::Exact => "exact",
        PatternType::Wildcard => "wildcard",
        PatternType::Regex => "regex",
        PatternType::Prefix => "prefix",
    }
}

fn target_type_str(t: TargetType) -> &'static str {
    match t {
        TargetType::AssetType => "asset_type",
        TargetType::Provider => "provider",
        TargetType::Tag => "tag",
        TargetType::MetadataKey => "metadata_key",
        TargetType::Query => "query",
    }
}

fn row_to_rule(row: &sqlx::postgres::PgRow) -> Result<Rule, Error> {
    let rule_type: String = row.try_get("rule_type")?;
    let pattern_type: Option<String> = row.try_get("pattern_type")?;
    Ok(Rule {
        id: row.try_get("id")?,
        data_product_id: row.try_get("data_product_id")?,
        rule_type: match rule_type.as_str() {
            "metadata_match" => RuleType::MetadataMatch,
            _ => RuleType::Query,
        },
        query_expression: row.try_get("query_expression")?,
        metadata_field: row.try_get("metadata_field")?,
        pattern_type: pattern_type.map(|p| match p.as_str() {
            "wildcard" => PatternType::Wildcard,
            "regex" => PatternType::Regex,
            "prefix" => PatternType::Prefix,
            _ => PatternType::Exact,
        }),
        pattern_value: row.try_get("pattern_value")?,
        priority: row.try_get("priority")?,
        is_enabled: row.try_get("is_enabled")?,
    })
}

/// `asset_types`/`providers`/`tags`/`metadata_keys` collected from a set
/// of candidate rule targets, for the batch asset lookup in
/// [`crate::store::assets::AssetStore::find_by_targets`].
pub fn targets_to_criteria(
    targets: &[RuleTarget],
) -> (BTreeSet<String>, BTreeSet<String>, BTreeSet<String>, BTreeSet<String>) {
    let mut asset_types = BTreeSet::new();
    let mut providers = BTreeSet::new();
    let mut tags = BTreeSet::new();
    let mut metadata_keys = BTreeSet::new();
    for target in targets {
        match target.target_type {
            TargetType::AssetType => {
                asset_types.insert(target.target_value.clone());
            }
            TargetType::Provider => {
                providers.insert(target.target_value.clone());
            }
            TargetType::Tag => {
                tags.insert(target.target_value.clone());
            }
            TargetType::MetadataKey => {
                metadata_keys.insert(target.target_value.clone());
            }
            TargetType::Query => {}
        }
    }
    (asset_types, providers, tags, metadata_keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_rule() -> Rule {
        Rule {
            id: Uuid::nil(),
            data_product_id: Uuid::nil(),
            rule_type: RuleType::MetadataMatch,
            query_expression: None,
            metadata_field: Some("owner".into()),
            pattern_type: Some(PatternType::Exact),
            pattern_value: Some("data-team".into()),
            priority: 0,
            is_enabled: true,
        }
    }

    #[test]
    fn metadata_match_rule_targets_its_field() {
        let targets = extract_targets(&metadata_rule());
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].target_type, TargetType::MetadataKey);
        assert_eq!(targets[0].target_value, "owner");
    }

    #[test]
    fn query_rule_extracts_type_and_provider_targets() {
        let rule = Rule {
            rule_type: RuleType::Query,
            query_expression: Some("@type=\"Table\" AND @providers=\"kafka\"".into()),
            metadata_field: None,
            pattern_type: None,
            pattern_value: None,
            ..metadata_rule()
        };
        let targets = extract_targets(&rule);
        assert!(targets.iter().any(|t| t.target_type == TargetType::AssetType));
        assert!(targets.iter().any(|t| t.target_type == TargetType::Provider));
    }

    #[test]
    fn unbounded_query_falls_back_to_query_target() {
        let rule = Rule {
            rule_type: RuleType::Query,
            query_expression: Some("orders".into()),
            metadata_field: None,
            pattern_type: None,
            pattern_value: None,
            ..metadata_rule()
        };
        let targets = extract_targets(&rule);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].target_type, TargetType::Query);
    }
}
