//! Singleton-leader coordination (§4.6.1). Every periodic background
//! task — the scheduler loop, full membership reconcile, stats
//! recomputation — runs under its own named lease so exactly one process
//! replica does the work at a time, without an external coordinator.

use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::Error;
use crate::store::lease::LeaseStore;

pub struct SingletonTask {
    name: String,
    holder: String,
    lease_expiry: Duration,
}

impl SingletonTask {
    pub fn new(name: impl Into<String>, holder: impl Into<String>, lease_expiry: Duration) -> Self {
        SingletonTask {
            name: name.into(),
            holder: holder.into(),
            lease_expiry,
        }
    }

    /// Runs `body` under this task's lease. If the lease can't be
    /// acquired, returns `Ok(false)` without running `body` — that's the
    /// normal case for every replica that loses the race, not an error.
    pub async fn run_under_lease<F, Fut>(&self, pool: &PgPool, body: F) -> Result<bool, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let lease = LeaseStore::new(pool);
        let expires_at = chrono::Utc::now() + chrono::Duration::from_std(self.lease_expiry).unwrap();
        if !lease.try_acquire(&self.name, &self.holder, expires_at).await? {
            return Ok(false);
        }

        let renew_interval = self.lease_expiry / 3;
        let renew_name = self.name.clone();
        let renew_holder = self.holder.clone();
        let renew_lease_expiry = self.lease_expiry;
        let renew_pool = pool.clone();
        let renew_handle = tokio::spawn(async move {
            let lease = LeaseStore::new(&renew_pool);
            loop {
                tokio::time::sleep(renew_interval).await;
                let expires_at = chrono::Utc::now() + chrono::Duration::from_std(renew_lease_expiry).unwrap();
                if let Err(err) = lease.try_acquire(&renew_name, &renew_holder, expires_at).await {
                    warn!(task = %renew_name, %err, "failed to renew singleton lease");
                    return;
                }
            }
        });

        let result = body().await;
        renew_handle.abort();

        if let Err(err) = &result {
            warn!(task = %self.name, %err, "singleton task body failed, releasing lease");
        }
        lease.release(&self.name, &self.holder).await?;
        if result.is_ok() {
            info!(task = %self.name, "singleton task completed");
        }
        result.map(|()| true)
    }
}
