//! Pipeline and pipeline-run CRUD, including the CAS operations the
//! scheduler needs to claim work without double-assigning it (§4.6, §4.7).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::Error;
use crate::model::{Pipeline, PipelineRun, RunStatus};

pub struct PipelineStore<'a> {
    pool: &'a PgPool,
}

impl<'a> PipelineStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        PipelineStore { pool }
    }

    pub async fn create(&self, pipeline: &Pipeline) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO pipelines (id, name, plugin_id, config, schedule, is_enabled, next_scheduled_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(pipeline.id)
        .bind(&pipeline.name)
        .bind(&pipeline.plugin_id)
        .bind(&pipeline.config)
        .bind(&pipeline.schedule)
        .bind(pipeline.is_enabled)
        .bind(pipeline.next_scheduled_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Pipeline>, Error> {
        let rows = sqlx::query(
            "SELECT * FROM pipelines WHERE is_enabled = TRUE AND next_scheduled_at IS NOT NULL AND next_scheduled_at <= $1",
        )
        .bind(now)
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_pipeline).collect()
    }

    pub async fn enqueue_run(&self, run: &PipelineRun) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO pipeline_runs
               (id, pipeline_id, status, claimed_by, claim_expiry_at, started_at, finished_at, attempt, scheduled_for)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(run.id)
        .bind(run.pipeline_id)
        .bind(status_str(run.status))
        .bind(&run.claimed_by)
        .bind(run.claim_expiry_at)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.attempt)
        .bind(run.scheduled_for)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Claim one pending run via compare-and-swap: only succeeds if the
    /// row is still `pending` at the moment of the update, so two workers
    /// racing the same run never both win.
    pub async fn claim_one(
        &self,
        worker_id: &str,
        claim_expiry_at: DateTime<Utc>,
    ) -> Result<Option<PipelineRun>, Error> {
        let row = sqlx::query(
            "UPDATE pipeline_runs SET status = 'claimed', claimed_by = $1, claim_expiry_at = $2
             WHERE id = (
               SELECT id FROM pipeline_runs WHERE status = 'pending' ORDER BY scheduled_for ASC
               LIMIT 1 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .bind(worker_id)
        .bind(claim_expiry_at)
        .fetch_optional(self.pool)
        .await?;
        row.as_ref().map(row_to_run).transpose()
    }

    pub async fn transition(&self, run: &PipelineRun) -> Result<(), Error> {
        sqlx::query(
            "UPDATE pipeline_runs SET status = $1, claimed_by = $2, claim_expiry_at = $3,
               started_at = $4, finished_at = $5, attempt = $6 WHERE id = $7",
        )
        .bind(status_str(run.status))
        .bind(&run.claimed_by)
        .bind(run.claim_expiry_at)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.attempt)
        .bind(run.id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Runs whose claim has expired without the worker finishing: the
    /// caller reverts them to `pending` and bumps `attempt` (§4.7).
    pub async fn expired_claims(&self, now: DateTime<Utc>) -> Result<Vec<PipelineRun>, Error> {
        let rows = sqlx::query(
            "SELECT * FROM pipeline_runs WHERE status IN ('claimed', 'running') AND claim_expiry_at < $1",
        )
        .bind(now)
        .fetch_all(self.pool)
        .await?;
        rows.iter().map(row_to_run).collect()
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Claimed => "claimed",
        RunStatus::Running => "running",
        RunStatus::Succeeded => "succeeded",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn row_to_pipeline(row: &sqlx::postgres::PgRow) -> Result<Pipeline, Error> {
    Ok(Pipeline {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        plugin_id: row.try_get("plugin_id")?,
        config: row.try_get("config")?,
        schedule: row.try_get("schedule")?,
        is_enabled: row.try_get("is_enabled")?,
        next_scheduled_at: row.try_get("next_scheduled_at")?,
    })
}

fn row_to_run(row: &sqlx::postgres::PgRow) -> Result<PipelineRun, Error> {
    let status: String = row.try_get("status")?;
    Ok(PipelineRun {
        id: row.try_get("id")?,
        pipeline_id: row.try_get("pipeline_id")?,
        status: match status.as_str() {
            "claimed" => RunStatus::Claimed,
            "running" => RunStatus::Running,
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            _ => RunStatus::Pending,
        },
        claimed_by: row.try_get("claimed_by")?,
        claim_expiry_at: row.try_get("claim_expiry_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        attempt: row.try_get("attempt")?,
        scheduled_for: row.try_get("scheduled_for")?,
    })
}
