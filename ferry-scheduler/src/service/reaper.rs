//! Reaper
//!
//! Periodically finishes RUNNING jobs whose worker stopped heartbeating as
//! RECLAIMED, so their imports get queued again.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::repository::{Finished, JobStore, Store, StoreError};

/// Reclaims every job whose last heartbeat is older than `max_silence`
///
/// Each job is reclaimed in its own transaction. A job that heartbeats or
/// finishes between the scan and its reclaim is left alone, so running the
/// sweep twice is harmless.
pub async fn reclaim_stale_jobs(
    store: &dyn Store,
    max_silence: Duration,
) -> Result<Vec<Finished>, StoreError> {
    let now = Utc::now();
    let max_silence = chrono::Duration::from_std(max_silence)
        .map_err(|e| StoreError::Corrupt(format!("heartbeat interval out of range: {}", e)))?;
    let cutoff = now - max_silence;

    let mut reclaimed = Vec::new();
    for job_id in store.find_stale_jobs(cutoff).await? {
        if let Some(finished) = store.reclaim_job(job_id, cutoff, now).await? {
            tracing::warn!(
                "Reclaimed job {} from {}: no heartbeat since {}",
                job_id,
                finished.result.machine.as_deref().unwrap_or("unknown machine"),
                cutoff
            );
            reclaimed.push(finished);
        }
    }

    Ok(reclaimed)
}

/// Starts the background sweep
pub fn spawn_reaper(
    store: Arc<dyn Store>,
    period: Duration,
    max_silence: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);

        loop {
            interval.tick().await;

            match reclaim_stale_jobs(store.as_ref(), max_silence).await {
                Ok(reclaimed) if !reclaimed.is_empty() => {
                    tracing::info!("Reclaimed {} stale job(s)", reclaimed.len());
                }
                Ok(_) => tracing::debug!("No stale jobs"),
                Err(e) => tracing::error!("Reaper sweep failed: {}", e),
            }
        }
    })
}
