//! Unified search over the `search_index` projection (§4.3, C1).
//!
//! A query string is parsed once into an AST, then lowered straight
//! onto one [`QueryBuilder`] alongside pagination and the rank
//! expression, so the whole statement shares a single bound-parameter
//! stream. Each facet dimension (`type`, `providers`, `tags`) is counted
//! by its own query with that dimension's own predicate removed, so
//! picking one provider still shows the true counts of its siblings.

use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::Error;
use crate::query::{self, compiler};
use crate::search::filter::SearchFilter;
use crate::store::search_index::FacetCounts;

/// Facet dimension name paired with the `search_index` column it reads.
const FACET_DIMENSIONS: [(&str, &str); 3] =
    [("type", "entity_subtype"), ("providers", "providers"), ("tags", "tags")];

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entity_id: Uuid,
    pub entity_kind: String,
    pub name: String,
    pub rank: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: i64,
    pub facets: FacetCounts,
}

pub struct SearchService<'a> {
    pool: &'a PgPool,
}

impl<'a> SearchService<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        SearchService { pool }
    }

    pub async fn search(&self, filter: &SearchFilter) -> Result<SearchResults, Error> {
        let ast = query::parse(&filter.query)?;
        let (limit, offset) = filter.normalized();
        let free_text = compiler::free_text(&ast);

        let mut b: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT entity_id, entity_kind, name, entity_subtype, providers, tags, ",
        );
        compiler::push_rank_expr(&mut b, &free_text);
        b.push(" AS rank FROM search_index WHERE ");
        compiler::push_predicate(&mut b, &ast);
        b.push(" ORDER BY rank DESC, updated_at DESC, entity_id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = b.build().fetch_all(self.pool).await?;

        let mut count_b: QueryBuilder<Postgres> = QueryBuilder::new("SELECT count(*) FROM search_index WHERE ");
        compiler::push_predicate(&mut count_b, &ast);
        let total: i64 = count_b.build_query_scalar().fetch_one(self.pool).await?;

        let mut facets = FacetCounts::default();
        for &(dimension, column) in &FACET_DIMENSIONS {
            let stripped = compiler::strip_field_predicate(&ast, dimension);
            let mut facet_b: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT {column} FROM search_index WHERE "));
            compiler::push_predicate(&mut facet_b, &stripped);
            let facet_rows = facet_b.build().fetch_all(self.pool).await?;
            record_facet_dimension(&mut facets, dimension, column, &facet_rows)?;
        }

        let hits = rows
            .iter()
            .map(|row| {
                Ok(SearchHit {
                    entity_id: row.try_get("entity_id")?,
                    entity_kind: row.try_get("entity_kind")?,
                    name: row.try_get("name")?,
                    rank: row.try_get("rank")?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(SearchResults { hits, total, facets })
    }
}

/// Folds one facet dimension's query result (a single scalar column for
/// `type`, an array column for `providers`/`tags`) into `facets`.
fn record_facet_dimension(
    facets: &mut FacetCounts,
    dimension: &str,
    column: &str,
    rows: &[sqlx::postgres::PgRow],
) -> Result<(), Error> {
    for row in rows {
        if dimension == "type" {
            let value: String = row.try_get(column)?;
            facets.record(dimension, &value);
        } else {
            let values: Vec<String> = row.try_get(column)?;
            for value in values {
                facets.record(dimension, &value);
            }
        }
    }
    Ok(())
}
