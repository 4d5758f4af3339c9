//! Connection pools (§5).
//!
//! Two pools share one `database_url`: a foreground pool sized for
//! request-serving traffic, and a small dedicated pool reserved for
//! full-reconcile scans and other long-lived cursors, so a slow scan can
//! never starve foreground queries of connections.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::StoreConfig;
use crate::error::Error;

#[derive(Clone)]
pub struct Pools {
    pub main: PgPool,
    pub scan: PgPool,
}

impl Pools {
    pub async fn connect(config: &StoreConfig) -> Result<Self, Error> {
        let main = PgPoolOptions::new()
            .max_connections(config.max_conns)
            .connect(&config.database_url)
            .await?;
        let scan = PgPoolOptions::new()
            .max_connections(config.scan_pool_size)
            .connect(&config.database_url)
            .await?;
        Ok(Pools { main, scan })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.main)
            .await
            .map_err(|e| Error::Fatal(format!("migration failed: {e}")))
    }
}
