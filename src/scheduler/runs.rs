//! Pipeline run lifecycle (§4.6, §4.7): claim, execute/heartbeat,
//! cancellation, and claim expiry.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;

use crate::broadcast::{BroadcastHub, JobRunEvent};
use crate::error::Error;
use crate::model::{PipelineRun, RunStatus};
use crate::store::pipelines::PipelineStore;

pub struct RunCoordinator<'a> {
    store: PipelineStore<'a>,
    hub: &'a BroadcastHub,
    claim_expiry: ChronoDuration,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(pool: &'a PgPool, hub: &'a BroadcastHub, claim_expiry: ChronoDuration) -> Self {
        RunCoordinator {
            store: PipelineStore::new(pool),
            hub,
            claim_expiry,
        }
    }

    /// CAS-claims the oldest pending run, if any, and publishes the
    /// resulting transition.
    pub async fn claim(&self, worker_id: &str) -> Result<Option<PipelineRun>, Error> {
        let claim_expiry_at = Utc::now() + self.claim_expiry;
        let run = self.store.claim_one(worker_id, claim_expiry_at).await?;
        if let Some(run) = &run {
            self.hub.publish(JobRunEvent::claimed(run.id, run.pipeline_id));
        }
        Ok(run)
    }

    pub async fn start(&self, mut run: PipelineRun) -> Result<PipelineRun, Error> {
        run.transition(RunStatus::Running)?;
        run.started_at = Some(Utc::now());
        self.store.transition(&run).await?;
        self.hub.publish(JobRunEvent::started(run.id, run.pipeline_id));
        Ok(run)
    }

    /// Extends the claim so the scheduler's expiry sweep doesn't reclaim
    /// a run that's still actively being worked.
    pub async fn heartbeat(&self, mut run: PipelineRun) -> Result<PipelineRun, Error> {
        run.claim_expiry_at = Some(Utc::now() + self.claim_expiry);
        self.store.transition(&run).await?;
        Ok(run)
    }

    pub async fn finish(&self, mut run: PipelineRun, status: RunStatus) -> Result<PipelineRun, Error> {
        run.transition(status)?;
        run.finished_at = Some(Utc::now());
        self.store.transition(&run).await?;
        self.hub.publish(JobRunEvent::finished(run.id, run.pipeline_id, status));
        Ok(run)
    }

    pub async fn cancel(&self, mut run: PipelineRun) -> Result<PipelineRun, Error> {
        run.transition(RunStatus::Cancelled)?;
        run.finished_at = Some(Utc::now());
        self.store.transition(&run).await?;
        self.hub.publish(JobRunEvent::finished(run.id, run.pipeline_id, RunStatus::Cancelled));
        Ok(run)
    }

    /// Reverts runs whose claim has lapsed back to `pending`, bumping
    /// `attempt`. Called from the scheduler loop under its singleton
    /// lease, never from a worker.
    pub async fn expire_stale_claims(&self) -> Result<u64, Error> {
        let expired = self.store.expired_claims(Utc::now()).await?;
        let count = expired.len() as u64;
        for mut run in expired {
            run.transition(RunStatus::Pending)?;
            run.attempt += 1;
            run.claimed_by = None;
            run.claim_expiry_at = None;
            self.store.transition(&run).await?;
            self.hub.publish(JobRunEvent::expired(run.id, run.pipeline_id));
        }
        Ok(count)
    }
}
