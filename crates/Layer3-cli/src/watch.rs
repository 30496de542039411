//! Watch loop - timer-driven janitor passes and market refreshes
//!
//! Runs until Ctrl-C. Blocking filesystem work goes through
//! `spawn_blocking` so the interval timer keeps its cadence.

use crate::commands::App;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tollgate_core::MarketFeed;
use tracing::{error, info};

pub async fn run(app: App, feed: MarketFeed, interval_secs: u64) -> Result<()> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };
    run_until(Arc::new(app), feed, interval_secs, shutdown).await?;
    Ok(())
}

/// Tick until `shutdown` resolves; returns the number of completed passes
pub async fn run_until<F>(
    app: Arc<App>,
    feed: MarketFeed,
    interval_secs: u64,
    shutdown: F,
) -> Result<u64>
where
    F: Future<Output = ()>,
{
    let feed = Arc::new(feed);
    let mut passes = 0;

    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(interval_secs, "Watching cache and markets (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let worker = app.clone();
                let worker_feed = feed.clone();
                let pass = tokio::task::spawn_blocking(move || {
                    let report = worker.cache.run_janitor();
                    worker.ledger.update_active_markets(worker_feed.collect());
                    report
                })
                .await;

                match pass {
                    Ok(report) => {
                        passes += 1;
                        info!(
                            expired = report.expired,
                            evicted = report.evicted,
                            recompressed = report.recompressed,
                            remaining_bytes = report.remaining_bytes,
                            level = %app.ledger.throttle_level(),
                            "Watch pass complete"
                        );
                    }
                    Err(e) => error!(error = %e, "Watch pass panicked"),
                }
            }
            _ = &mut shutdown => {
                info!(passes, "Stopping watch");
                return Ok(passes);
            }
        }
    }
}
