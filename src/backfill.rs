// Startup catch-up: run one rollup pass per level, finest first, so buckets
// that became ready while the collector was down are compacted before the
// periodic tasks start.

use crate::rollup_worker::RollupWorker;
use tracing::info;

pub async fn run_backfill(worker: &RollupWorker) -> anyhow::Result<()> {
    for level in 1..worker.level_count() {
        let summary = worker.run_one_tick(level).await?;
        info!(
            level,
            rolled_up_buckets = summary.buckets,
            failed_agents = summary.failed,
            "backfill level complete"
        );
    }
    worker.run_retention_sweep().await?;
    info!("backfill complete");
    Ok(())
}
