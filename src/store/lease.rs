//! Singleton-leader lease over a single Postgres row (§4.6.1). Any number
//! of scheduler processes may run; at most one holds the lease at a time,
//! decided entirely by a CAS update rather than an external coordinator.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Error;

pub struct LeaseStore<'a> {
    pool: &'a PgPool,
}

impl<'a> LeaseStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        LeaseStore { pool }
    }

    /// Attempt to acquire or renew `name`'s lease for `holder` until
    /// `expires_at`. Succeeds if the lease is unheld, already expired, or
    /// already held by `holder`.
    pub async fn try_acquire(&self, name: &str, holder: &str, expires_at: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            "INSERT INTO scheduler_leases (name, holder, expires_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (name) DO UPDATE SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
             WHERE scheduler_leases.holder = $2 OR scheduler_leases.expires_at < now()",
        )
        .bind(name)
        .bind(holder)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn release(&self, name: &str, holder: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM scheduler_leases WHERE name = $1 AND holder = $2")
            .bind(name)
            .bind(holder)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
