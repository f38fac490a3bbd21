//! Time-bounded progress stream for one job.
//!
//! The stream always opens with `connected`, forwards progress events in
//! publish order and ends with exactly one of `completed`, `failed` or
//! `expired`. Expiry only ends the subscription; the job keeps running.

use std::sync::Arc;
use std::time::Duration;

use taleforge_core::store::PackageStore;
use taleforge_core::types::PackageId;
use taleforge_events::{JobEvent, ProgressHub};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// Default hard cap on a subscription.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(300);

/// Buffer between the forwarder task and the consumer.
const CHANNEL_CAPACITY: usize = 32;

/// Open a progress subscription for `job_id`.
///
/// The hub topic is joined before the persisted package is read, so an
/// event published in between is either seen on the topic or already
/// reflected in the package.
pub async fn subscribe_progress(
    store: Arc<dyn PackageStore>,
    hub: Arc<ProgressHub>,
    job_id: PackageId,
    max_lifetime: Duration,
    shutdown: CancellationToken,
) -> Result<mpsc::Receiver<JobEvent>, JobError> {
    let rx = hub.subscribe(job_id);

    let package = match store.get(job_id).await {
        Ok(Some(package)) => package,
        Ok(None) => {
            drop(rx);
            hub.release(job_id);
            return Err(JobError::NotFound(job_id));
        }
        Err(e) => {
            drop(rx);
            hub.release(job_id);
            return Err(e.into());
        }
    };

    let (tx, out) = mpsc::channel(CHANNEL_CAPACITY);
    let _ = tx.send(JobEvent::Connected { job_id }).await;

    if let Some(terminal) = JobEvent::terminal_for(&package) {
        let _ = tx.send(terminal).await;
        drop(rx);
        hub.release(job_id);
        return Ok(out);
    }

    tokio::spawn(forward(store, hub, job_id, rx, tx, max_lifetime, shutdown));
    Ok(out)
}

async fn forward(
    store: Arc<dyn PackageStore>,
    hub: Arc<ProgressHub>,
    job_id: PackageId,
    mut rx: broadcast::Receiver<JobEvent>,
    tx: mpsc::Sender<JobEvent>,
    max_lifetime: Duration,
    shutdown: CancellationToken,
) {
    let deadline = tokio::time::sleep(max_lifetime);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::debug!(job_id = %job_id, "Progress subscription expired");
                let _ = tx.send(JobEvent::Expired { job_id }).await;
                break;
            }
            _ = shutdown.cancelled() => break,
            _ = tx.closed() => {
                tracing::debug!(job_id = %job_id, "Progress subscriber went away");
                break;
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() || terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %job_id, skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // Topic dropped without us seeing the terminal event;
                    // the persisted package has it.
                    match store.get(job_id).await {
                        Ok(Some(package)) => {
                            if let Some(terminal) = JobEvent::terminal_for(&package) {
                                let _ = tx.send(terminal).await;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(job_id = %job_id, error = %e, "Failed to reload package");
                        }
                    }
                    break;
                }
            },
        }
    }

    drop(rx);
    hub.release(job_id);
}
