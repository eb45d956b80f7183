//! One-shot operator tool that drains the token rotation backlog.
//!
//! Runs rotation batches back-to-back until no stale connections remain, for
//! key rollover days when waiting on the cron cadence would take too long.
//! Uses the same lease as the cron endpoint, so it is safe to run while the
//! scheduler is active.

use anyhow::{Context, Result, bail};
use curie_sync::{
    config::ConfigLoader,
    db,
    rotation::{RotationOutcome, TokenRotationBatch},
    telemetry,
};
use migration::{Migrator, MigratorTrait};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<()> {
    let loader = ConfigLoader::new();
    let config = loader.load().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    telemetry::init_tracing(&config);

    let keyring = config.keyring().context("building keyring")?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    Migrator::up(&db, None)
        .await
        .context("applying migrations")?;

    let batch = TokenRotationBatch::new(Arc::new(db), keyring, config.rotation.clone());

    let mut total_success = 0u64;
    let mut total_failed = 0u64;
    let mut lock_waits = 0u32;

    loop {
        match batch.run().await.context("running rotation batch")? {
            RotationOutcome::Locked { expires_at } => {
                lock_waits += 1;
                if lock_waits > 10 {
                    bail!("rotation lease held for too long; giving up");
                }
                println!("Lease held until {}; waiting...", expires_at);
                sleep(Duration::from_secs(30)).await;
            }
            RotationOutcome::Completed(summary) => {
                lock_waits = 0;
                total_success += summary.success;
                total_failed += summary.failed;

                println!(
                    "Batch: processed={} success={} failed={} remaining={}",
                    summary.processed, summary.success, summary.failed, summary.remaining
                );
                for error in &summary.errors {
                    eprintln!("  {}", error);
                }

                if !summary.has_more {
                    break;
                }
                // A batch that only produced failures will not shrink the
                // backlog; stop instead of spinning on the same rows.
                if summary.success == 0 && summary.processed > 0 {
                    bail!(
                        "no progress: {} connections keep failing rotation",
                        summary.remaining
                    );
                }
            }
        }
    }

    println!(
        "Rotation backlog drained: {} rotated, {} failed.",
        total_success, total_failed
    );

    Ok(())
}
