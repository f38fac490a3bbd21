//! Per-job progress fan-out.
//!
//! Every running job gets its own broadcast topic in the [`ProgressHub`].
//! Subscribers attach and detach freely; each sees the events published
//! after it subscribed, in publish order. Publishing a terminal event closes
//! the topic.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use taleforge_core::package::{Package, Progress};
use taleforge_core::types::PackageId;
use tokio::sync::broadcast;

/// Progress stream message. The `type` tag doubles as the SSE event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Connected {
        job_id: PackageId,
    },
    Progress {
        job_id: PackageId,
        progress: Progress,
    },
    Completed {
        job_id: PackageId,
        package: Box<Package>,
    },
    Failed {
        job_id: PackageId,
        error: String,
        package: Box<Package>,
    },
    /// The subscription outlived its time budget. The job keeps running;
    /// clients should fall back to polling the package.
    Expired {
        job_id: PackageId,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> PackageId {
        match self {
            Self::Connected { job_id }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Expired { job_id } => *job_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Expired { .. } => "expired",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Expired { .. }
        )
    }

    /// The terminal event describing a finished package, if it has finished.
    pub fn terminal_for(package: &Package) -> Option<Self> {
        use taleforge_core::package::PackageStatus;

        match package.status {
            PackageStatus::Completed => Some(Self::Completed {
                job_id: package.id,
                package: Box::new(package.clone()),
            }),
            PackageStatus::Failed => Some(Self::Failed {
                job_id: package.id,
                error: package
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Job failed".to_string()),
                package: Box::new(package.clone()),
            }),
            PackageStatus::Draft | PackageStatus::Processing => None,
        }
    }
}

/// Default per-topic buffer. A job emits a handful of events, so this only
/// matters for very slow subscribers.
const DEFAULT_TOPIC_CAPACITY: usize = 64;

/// Registry of per-job broadcast topics.
pub struct ProgressHub {
    topics: Mutex<HashMap<PackageId, broadcast::Sender<JobEvent>>>,
    capacity: usize,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn topics(&self) -> std::sync::MutexGuard<'_, HashMap<PackageId, broadcast::Sender<JobEvent>>> {
        self.topics.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Subscribe to a job's events, creating its topic if needed.
    pub fn subscribe(&self, job_id: PackageId) -> broadcast::Receiver<JobEvent> {
        let capacity = self.capacity;
        self.topics()
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Publish to the job's current subscribers. A terminal event also
    /// drops the topic, which closes every receiver once drained.
    pub fn publish(&self, event: JobEvent) {
        let job_id = event.job_id();
        let mut topics = self.topics();
        if event.is_terminal() {
            if let Some(sender) = topics.remove(&job_id) {
                let _ = sender.send(event);
            }
        } else if let Some(sender) = topics.get(&job_id) {
            let _ = sender.send(event);
        }
    }

    /// Drop the topic if nobody is listening any more.
    pub fn release(&self, job_id: PackageId) {
        let mut topics = self.topics();
        if topics
            .get(&job_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            topics.remove(&job_id);
        }
    }

    pub fn active_topics(&self) -> usize {
        self.topics().len()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}
