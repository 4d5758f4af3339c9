//! Marmot core process bootstrap.
//!
//! Connects the store pools, runs pending migrations, and drives the
//! background scheduler: the pipeline tick loop and a full membership
//! reconcile sweep, each under its own singleton lease so exactly one
//! replica does the work. REST/gRPC routing lives in a separate service
//! and is out of scope for this binary.
//!
//! ```bash
//! cargo run --bin marmot-server
//! ```

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use uuid::Uuid;

use marmot_core::broadcast::BroadcastHub;
use marmot_core::config::Config;
use marmot_core::membership;
use marmot_core::scheduler::{RunCoordinator, SingletonTask};
use marmot_core::store::{Pools, RuleStore};
use marmot_core::telemetry;

#[derive(Parser, Debug)]
#[command(name = "marmot-server", about = "Marmot catalog scheduler and reconcile worker")]
struct Args {
    /// Load configuration from this file instead of the default
    /// config.toml / config.local.toml / MARMOT_-prefixed env search.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let _log_guard = telemetry::init(&config.logging)?;

    info!("starting marmot-server");

    let pools = Pools::connect(&config.store).await?;
    pools.migrate().await?;
    info!("connected to store and applied migrations");

    let hub = BroadcastHub::new();
    let holder = format!("marmot-server-{}", Uuid::new_v4());

    let scheduler_interval = Duration::from_secs(config.pipelines.scheduler_interval);
    let lease_expiry = Duration::from_secs(config.pipelines.lease_expiry);
    let claim_expiry = ChronoDuration::seconds(config.pipelines.claim_expiry as i64);

    let scheduler_task = SingletonTask::new("scheduler-tick", holder.clone(), lease_expiry);
    let reconcile_task = SingletonTask::new("full-membership-reconcile", holder.clone(), lease_expiry);

    let mut scheduler_ticker = tokio::time::interval(scheduler_interval);
    let mut reconcile_ticker = tokio::time::interval(scheduler_interval * 10);

    loop {
        tokio::select! {
            _ = scheduler_ticker.tick() => {
                let runs = RunCoordinator::new(&pools.main, &hub, claim_expiry);
                let result = scheduler_task
                    .run_under_lease(&pools.main, || async {
                        marmot_core::scheduler::tick(&pools.main, &runs).await.map(|_| ())
                    })
                    .await;
                if let Err(err) = result {
                    error!(%err, "scheduler tick failed");
                }
            }
            _ = reconcile_ticker.tick() => {
                let result = reconcile_task
                    .run_under_lease(&pools.scan, || async { run_full_reconcile(&pools.scan).await })
                    .await;
                if let Err(err) = result {
                    error!(%err, "full membership reconcile failed");
                }
            }
            _ = signal::ctrl_c() => {
                info!("received shutdown signal, exiting");
                break;
            }
        }
    }

    Ok(())
}

/// Re-evaluates every enabled rule against the whole catalog. Run on a
/// slower cadence than the scheduler tick since it scans the full asset
/// table rather than acting on deltas.
async fn run_full_reconcile(pool: &sqlx::PgPool) -> Result<(), marmot_core::Error> {
    let rules = RuleStore::new(pool).all_enabled().await?;
    let mut by_product: std::collections::BTreeMap<Uuid, Vec<_>> = std::collections::BTreeMap::new();
    for rule in rules {
        by_product.entry(rule.data_product_id).or_default().push(rule);
    }

    for (data_product_id, rules) in by_product {
        let report = membership::reconcile_all(pool, data_product_id, &rules).await?;
        if report.matched > 0 || report.pruned > 0 {
            info!(
                %data_product_id,
                evaluated = report.evaluated,
                matched = report.matched,
                pruned = report.pruned,
                "full reconcile"
            );
        }
    }

    Ok(())
}
