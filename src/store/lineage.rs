//! Lineage edge CRUD and graph traversal (§4.3 lineage, §8 S1).

use std::collections::{HashSet, VecDeque};

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Error;
use crate::model::{BatchEdgeResult, EdgeStatus, LineageEdge, LineageGraph, LineageNode, LineageType, Mrn};

/// Traversal is capped so a caller cannot accidentally (or maliciously)
/// request an unbounded fan-out: depth beyond this is rejected, and the
/// total node count returned is capped regardless of depth.
pub const MAX_DEPTH: u32 = 15;
pub const MAX_NODES: usize = 500;

pub struct LineageStore<'a> {
    pool: &'a PgPool,
}

impl<'a> LineageStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        LineageStore { pool }
    }

    /// Insert a batch of edges, classifying each as newly created,
    /// duplicate-within-the-batch, or already existing in storage.
    pub async fn upsert_batch(&self, edges: &[LineageEdge]) -> Result<Vec<BatchEdgeResult>, Error> {
        let mut results = Vec::with_capacity(edges.len());
        let mut seen_in_batch = HashSet::new();
        for edge in edges {
            let key = (edge.source_mrn.as_str().to_string(), edge.target_mrn.as_str().to_string(), edge.edge_type);
            if !seen_in_batch.insert(key) {
                results.push(BatchEdgeResult {
                    edge: edge.clone(),
                    status: EdgeStatus::Duplicate,
                });
                continue;
            }
            let existing: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM lineage_edges WHERE source_mrn = $1 AND target_mrn = $2 AND edge_type = $3",
            )
            .bind(edge.source_mrn.as_str())
            .bind(edge.target_mrn.as_str())
            .bind(edge_type_str(edge.edge_type))
            .fetch_optional(self.pool)
            .await?;

            if let Some(_id) = existing {
                results.push(BatchEdgeResult {
                    edge: edge.clone(),
                    status: EdgeStatus::Existing,
                });
                continue;
            }

            sqlx::query(
                "INSERT INTO lineage_edges (id, source_mrn, target_mrn, edge_type, job_mrn, created_at, updated_at)
                 VALUES ($1,$2,$3,$4,$5,$6,$7)",
            )
            .bind(edge.id)
            .bind(edge.source_mrn.as_str())
            .bind(edge.target_mrn.as_str())
            .bind(edge_type_str(edge.edge_type))
            .bind(edge.job_mrn.as_ref().map(Mrn::as_str))
            .bind(edge.created_at)
            .bind(edge.updated_at)
            .execute(self.pool)
            .await?;
            results.push(BatchEdgeResult {
                edge: edge.clone(),
                status: EdgeStatus::Created,
            });
        }
        Ok(results)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM lineage_edges WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("lineage_edge", id.to_string()));
        }
        Ok(())
    }

    async fn outgoing(&self, mrn: &Mrn) -> Result<Vec<LineageEdge>, Error> {
        let rows = sqlx::query("SELECT * FROM lineage_edges WHERE source_mrn = $1")
            .bind(mrn.as_str())
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(row_to_edge).collect()
    }

    async fn is_stub(&self, mrn: &Mrn) -> Result<bool, Error> {
        let stub: Option<bool> = sqlx::query_scalar("SELECT is_stub FROM assets WHERE mrn = $1")
            .bind(mrn.as_str())
            .fetch_optional(self.pool)
            .await?;
        // An MRN with no backing asset row is a phantom stub: it exists
        // only as a lineage endpoint until discovery fills it in.
        Ok(stub.unwrap_or(true))
    }

    /// Breadth-first traversal out to `depth` hops, reporting any edge
    /// whose target has already been visited as a cycle edge instead of
    /// expanding it further.
    pub async fn traverse(&self, root: &Mrn, depth: u32) -> Result<LineageGraph, Error> {
        let depth = depth.min(MAX_DEPTH);
        let mut visited: HashSet<String> = HashSet::new();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut cycle_edges = Vec::new();

        visited.insert(root.as_str().to_string());
        nodes.push(LineageNode {
            mrn: root.clone(),
            is_stub: self.is_stub(root).await?,
        });

        let mut frontier: VecDeque<(Mrn, u32)> = VecDeque::new();
        frontier.push_back((root.clone(), 0));

        while let Some((current, d)) = frontier.pop_front() {
            if d >= depth || nodes.len() >= MAX_NODES {
                continue;
            }
            for edge in self.outgoing(&current).await? {
                let target_key = edge.target_mrn.as_str().to_string();
                if visited.contains(&target_key) {
                    cycle_edges.push(edge.id);
                    edges.push(edge);
                    continue;
                }
                if nodes.len() >= MAX_NODES {
                    break;
                }
                visited.insert(target_key);
                nodes.push(LineageNode {
                    mrn: edge.target_mrn.clone(),
                    is_stub: self.is_stub(&edge.target_mrn).await?,
                });
                frontier.push_back((edge.target_mrn.clone(), d + 1));
                edges.push(edge);
            }
        }

        Ok(LineageGraph {
            nodes,
            edges,
            cycle_edges,
        })
    }
}

fn edge_type_str(t: LineageType) -> &'static str {
    match t {
        LineageType::Direct => "DIRECT",
        LineageType::Transform => "TRANSFORM",
    }
}

fn row_to_edge(row: &sqlx::postgres::PgRow) -> Result<LineageEdge, Error> {
    let edge_type: String = row.try_get("edge_type")?;
    let job_mrn: Option<String> = row.try_get("job_mrn")?;
    Ok(LineageEdge {
        id: row.try_get("id")?,
        source_mrn: Mrn::parse(row.try_get::<String, _>("source_mrn")?.as_str())?,
        target_mrn: Mrn::parse(row.try_get::<String, _>("target_mrn")?.as_str())?,
        edge_type: match edge_type.as_str() {
            "TRANSFORM" => LineageType::Transform,
            _ => LineageType::Direct,
        },
        job_mrn: job_mrn.map(|j| Mrn::parse(&j)).transpose()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_type_round_trips_through_string() {
        assert_eq!(edge_type_str(LineageType::Direct), "DIRECT");
        assert_eq!(edge_type_str(LineageType::Transform), "TRANSFORM");
    }
}
