use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::queue::{schedule_rematch, RematchJob};
use crate::error::AppError;
use crate::state::AppState;

/// Retries matching for pending requests until they are assigned or run out
/// of attempts.
pub async fn run_rematch_engine(state: Arc<AppState>, mut rematch_rx: mpsc::Receiver<RematchJob>) {
    info!("rematch engine started");

    while let Some(job) = rematch_rx.recv().await {
        state.metrics.rematch_queue_depth.dec();
        process_job(&state, job);
    }

    warn!("rematch engine stopped: queue channel closed");
}

fn process_job(state: &AppState, job: RematchJob) {
    let dispatch = &state.config.dispatch;

    match state.service.attempt_match(job.request_id, job.attempt) {
        Ok(request) => {
            info!(
                request_id = %request.id,
                attempt = job.attempt,
                "pending request matched on retry"
            );
        }
        Err(AppError::NoDriverAvailable) if job.attempt < dispatch.max_match_attempts => {
            schedule_rematch(
                state.service.rematch_sender(),
                state.metrics.clone(),
                job.next(),
                dispatch.retry_delay,
            );
        }
        Err(AppError::NoDriverAvailable) => {
            warn!(
                request_id = %job.request_id,
                attempts = job.attempt,
                "matching exhausted; request stays pending"
            );
            if let Err(err) = state.service.mark_exhausted(job.request_id, job.attempt) {
                error!(request_id = %job.request_id, error = %err, "failed to record exhaustion");
            }
        }
        Err(AppError::InvalidTransition { from, .. }) => {
            debug!(request_id = %job.request_id, status = %from, "request left pending; dropping job");
        }
        Err(err) => {
            error!(request_id = %job.request_id, error = %err, "rematch attempt failed");
        }
    }
}

/// Cancels requests that stayed pending past the configured timeout.
pub async fn run_pending_expiry(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(state.config.dispatch.expiry_sweep_interval);
    info!("pending expiry sweeper started");

    loop {
        ticker.tick().await;
        let expired = state.service.expire_stale_pending();
        if expired > 0 {
            info!(expired, "expired pending requests");
        }
    }
}
