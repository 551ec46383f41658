use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::observability::metrics::Metrics;

/// One more matching attempt for a request that is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RematchJob {
    pub request_id: Uuid,
    pub attempt: u32,
}

impl RematchJob {
    pub fn next(self) -> Self {
        Self {
            request_id: self.request_id,
            attempt: self.attempt.saturating_add(1),
        }
    }
}

pub async fn enqueue_rematch(
    tx: &mpsc::Sender<RematchJob>,
    metrics: &Metrics,
    job: RematchJob,
) -> Result<(), AppError> {
    tx.send(job)
        .await
        .map_err(|err| AppError::Internal(format!("rematch queue send failed: {err}")))?;

    metrics.rematch_queue_depth.inc();
    Ok(())
}

/// Enqueues `job` after `delay` without blocking the caller.
pub fn schedule_rematch(
    tx: mpsc::Sender<RematchJob>,
    metrics: Metrics,
    job: RematchJob,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(err) = enqueue_rematch(&tx, &metrics, job).await {
            warn!(request_id = %job.request_id, error = %err, "dropping rematch job");
        }
    });
}
