//! Lowers a query [`Ast`] into a SQL predicate appended directly onto a
//! [`QueryBuilder`], plus the ranking expression described in the
//! specification:
//!
//! ```text
//! rank = 0.5 * name_match + 0.3 * fts_rank + 0.2 * trigram_similarity
//! ```
//!
//! clipped to `[0, 1]`, ties broken by `updated_at DESC, id ASC`.
//!
//! Callers own one [`QueryBuilder`] for the whole statement (predicate,
//! facet filters, ranking, pagination) so every bound value gets a single
//! consistent placeholder stream — there is no separate "compile, then
//! rebind" step.

use sqlx::{Postgres, QueryBuilder};

use super::ast::{Ast, Op, Path, Value};

/// Append the ranking expression for `query_text` onto `b`, e.g. as a
/// `SELECT ..., {rank} AS search_rank` column.
pub fn push_rank_expr(b: &mut QueryBuilder<Postgres>, query_text: &str) {
    b.push("LEAST(1.0, GREATEST(0.0, 0.5 * (CASE WHEN search_index.name ILIKE '%' || ")
        .push_bind(query_text.to_string())
        .push(" || '%' THEN 1.0 ELSE 0.0 END) + 0.3 * ts_rank(search_index.document, plainto_tsquery('english', ")
        .push_bind(query_text.to_string())
        .push(")) + 0.2 * similarity(search_index.trigram_source, ")
        .push_bind(query_text.to_string())
        .push(")))");
}

/// Append the compiled predicate for `ast` onto `b`. Does not include the
/// leading `WHERE`/`AND` — callers control how it composes with other
/// filters.
pub fn push_predicate(b: &mut QueryBuilder<Postgres>, ast: &Ast) {
    match ast {
        Ast::Word(w) if w.is_empty() => {
            b.push("TRUE");
        }
        Ast::Word(w) => {
            b.push("similarity(search_index.trigram_source, ")
                .push_bind(w.clone())
                .push(") > 0.1");
        }
        Ast::Phrase(p) => {
            b.push("search_index.document @@ plainto_tsquery('english', ")
                .push_bind(p.clone())
                .push(")");
        }
        Ast::FieldPred { path, op, value } => push_field_pred(b, path, *op, value),
        Ast::Not(inner) => {
            b.push("NOT (");
            push_predicate(b, inner);
            b.push(")");
        }
        Ast::And(l, r) => {
            b.push("(");
            push_predicate(b, l);
            b.push(" AND ");
            push_predicate(b, r);
            b.push(")");
        }
        Ast::Or(l, r) => {
            b.push("(");
            push_predicate(b, l);
            b.push(" OR ");
            push_predicate(b, r);
            b.push(")");
        }
    }
}

/// Returns `ast` with every `@<field>...` predicate on the given root
/// field segment replaced by an always-true clause, leaving everything
/// else intact. Used to compute a facet dimension's counts "with its own
/// filter removed": selecting a `providers` value should not make every
/// other provider disappear from the `providers` facet.
pub fn strip_field_predicate(ast: &Ast, field: &str) -> Ast {
    match ast {
        Ast::FieldPred { path, .. } if path.first_segment() == field => Ast::Word(String::new()),
        Ast::FieldPred { .. } | Ast::Word(_) | Ast::Phrase(_) => ast.clone(),
        Ast::Not(inner) => Ast::Not(Box::new(strip_field_predicate(inner, field))),
        Ast::And(l, r) => Ast::And(
            Box::new(strip_field_predicate(l, field)),
            Box::new(strip_field_predicate(r, field)),
        ),
        Ast::Or(l, r) => Ast::Or(
            Box::new(strip_field_predicate(l, field)),
            Box::new(strip_field_predicate(r, field)),
        ),
    }
}

/// Free text driving trigram/fts ranking: every bare word/phrase joined
/// by spaces, ignoring field predicates (those became exact SQL
/// predicates above).
pub fn free_text(ast: &Ast) -> String {
    let mut words = Vec::new();
    free_text_rec(ast, &mut words);
    words.join(" ")
}

fn free_text_rec(ast: &Ast, out: &mut Vec<String>) {
    match ast {
        Ast::Word(w) if !w.is_empty() => out.push(w.clone()),
        Ast::Word(_) => {}
        Ast::Phrase(p) => out.push(p.clone()),
        Ast::FieldPred { .. } => {}
        Ast::Not(inner) => free_text_rec(inner, out),
        Ast::And(l, r) | Ast::Or(l, r) => {
            free_text_rec(l, out);
            free_text_rec(r, out);
        }
    }
}

/// `tags` and `providers` are multi-valued columns on `search_index`;
/// every other field descends the `metadata` JSONB column by path.
fn push_field_pred(b: &mut QueryBuilder<Postgres>, path: &Path, op: Op, value: &Value) {
    let root = path.first_segment();
    match root {
        "type" => push_scalar_column(b, "search_index.entity_subtype", op, value),
        "providers" => push_set_membership(b, "search_index.providers", op, value),
        "tags" => push_set_membership(b, "search_index.tags", op, value),
        "metadata" => push_json_path(b, path.rest(), op, value),
        other => push_scalar_column(b, &format!("search_index.{other}"), op, value),
    }
}

fn push_scalar_column(b: &mut QueryBuilder<Postgres>, column: &str, op: Op, value: &Value) {
    b.push(column);
    push_op_and_value(b, op, value);
}

fn push_set_membership(b: &mut QueryBuilder<Postgres>, column: &str, op: Op, value: &Value) {
    let negate = matches!(op, Op::Ne | Op::NotRegex);
    if negate {
        b.push("NOT ");
    }
    b.push_bind(value_text(value)).push(" = ANY(").push(column).push(")");
}

fn push_json_path(b: &mut QueryBuilder<Postgres>, segments: &[String], op: Op, value: &Value) {
    if segments.is_empty() {
        b.push("FALSE");
        return;
    }
    let is_numeric = matches!(op, Op::Gt | Op::Gte | Op::Lt | Op::Lte);
    if is_numeric {
        b.push("(");
    }
    b.push("search_index.metadata");
    for seg in &segments[..segments.len() - 1] {
        b.push(" -> ").push_bind(seg.clone());
    }
    let last = segments.last().unwrap();
    b.push(" ->> ").push_bind(last.clone());
    if is_numeric {
        b.push(")::numeric");
    }
    push_op_and_value(b, op, value);
}

fn push_op_and_value(b: &mut QueryBuilder<Postgres>, op: Op, value: &Value) {
    match op {
        Op::Match => {
            b.push(" ILIKE '%' || ").push_bind(value_text(value)).push(" || '%'");
        }
        Op::Eq => {
            b.push(" = ").push_bind(value_text(value));
        }
        Op::Ne => {
            b.push(" != ").push_bind(value_text(value));
        }
        Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
            b.push(format!(" {op} ")).push_bind(value_number(value));
        }
        Op::Regex => {
            b.push(" ~ ").push_bind(value_text(value));
        }
        Op::NotRegex => {
            b.push(" !~ ").push_bind(value_text(value));
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Word(w) => w.clone(),
        Value::Phrase(p) => p.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
    }
}

fn value_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Word(w) | Value::Phrase(w) => w.parse().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    fn rendered(ast: &Ast) -> String {
        let mut b = QueryBuilder::<Postgres>::new("");
        push_predicate(&mut b, ast);
        b.into_sql()
    }

    #[test]
    fn compiles_bare_word_to_trigram_predicate() {
        let ast = parse("table").unwrap();
        assert!(rendered(&ast).contains("similarity"));
        assert_eq!(free_text(&ast), "table");
    }

    #[test]
    fn compiles_type_field_to_exact_equality() {
        let ast = parse("@type=\"Table\"").unwrap();
        assert!(rendered(&ast).contains("entity_subtype"));
    }

    #[test]
    fn compiles_metadata_path_into_jsonb_descent() {
        let ast = parse("@metadata.owner=\"data-team\"").unwrap();
        let sql = rendered(&ast);
        assert!(sql.contains("search_index.metadata"));
        assert!(sql.contains("->>"));
    }

    #[test]
    fn flattens_free_text_from_conjunctions() {
        let ast = parse("@type:\"Table\" AND prod").unwrap();
        assert_eq!(free_text(&ast), "prod");
    }

    #[test]
    fn numeric_predicate_casts_json_value() {
        let ast = parse("@metadata.priority > 3").unwrap();
        let sql = rendered(&ast);
        assert!(sql.contains("::numeric"));
        assert!(sql.contains(">"));
    }

    #[test]
    fn strip_field_predicate_removes_only_matching_field() {
        let ast = parse("@providers:\"kafka\" AND @type=\"Table\"").unwrap();
        let stripped = strip_field_predicate(&ast, "providers");
        match stripped {
            Ast::And(l, r) => {
                assert_eq!(*l, Ast::Word(String::new()));
                assert!(matches!(*r, Ast::FieldPred { .. }));
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn strip_field_predicate_is_identity_when_field_absent() {
        let ast = parse("@type=\"Table\"").unwrap();
        let stripped = strip_field_predicate(&ast, "providers");
        assert_eq!(stripped, ast);
    }
}
