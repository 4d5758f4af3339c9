//! The scheduler tick (§4.6), run under [`crate::scheduler::singleton::SingletonTask`]'s
//! lease on an interval of `pipelines.scheduler_interval` seconds.

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::Error;
use crate::model::{Pipeline, PipelineRun, RunStatus};
use crate::store::pipelines::PipelineStore;

/// One scheduler tick: emit pending runs for due pipelines, then expire
/// stale claims. Both steps proceed even if the other reports nothing to
/// do; neither failing aborts the caller's loop, only this tick.
pub async fn tick(pool: &PgPool, runs: &crate::scheduler::runs::RunCoordinator<'_>) -> Result<TickReport, Error> {
    let store = PipelineStore::new(pool);
    let now = Utc::now();

    let due = store.due(now).await?;
    let mut emitted = 0;
    for pipeline in &due {
        enqueue_pending_run(&store, pipeline, now).await?;
        emitted += 1;
    }

    let expired = runs.expire_stale_claims().await?;
    if emitted > 0 || expired > 0 {
        info!(emitted, expired, "scheduler tick");
    }

    Ok(TickReport { emitted, expired })
}

async fn enqueue_pending_run(store: &PipelineStore<'_>, pipeline: &Pipeline, now: chrono::DateTime<Utc>) -> Result<(), Error> {
    let run = PipelineRun {
        id: Uuid::new_v4(),
        pipeline_id: pipeline.id,
        status: RunStatus::Pending,
        claimed_by: None,
        claim_expiry_at: None,
        started_at: None,
        finished_at: None,
        attempt: 0,
        scheduled_for: now,
    };
    store.enqueue_run(&run).await
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub emitted: u64,
    pub expired: u64,
}
