//! Job transition events for push-based status.
//!
//! Every state change made by the job manager is also published on a
//! `tokio::sync::broadcast` channel. Subscribers that only need the final
//! outcome can use [`crate::JobManager::wait_for`] instead; this channel is
//! for progress displays and dashboards that show every step.

use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::document::DocumentId;
use crate::job::{JobId, JobState};

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    Submitted,
    AttemptStarted {
        attempt: u32,
    },
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    Succeeded {
        result_document_id: DocumentId,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

/// A single job transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub source_document_id: DocumentId,
    /// State after the transition.
    pub state: JobState,
    pub kind: JobEventKind,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: JobId, source: &DocumentId, state: JobState, kind: JobEventKind) -> Self {
        Self {
            job_id,
            source_document_id: source.clone(),
            state,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Boxed stream of job events; lagged gaps are skipped.
pub type JobEventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// Fan-out of job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn send(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream`, optionally filtered to one job.
    pub fn stream(&self, only: Option<JobId>) -> JobEventStream {
        let s = BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| {
            let keep = match item {
                Ok(event) if only.map_or(true, |id| id == event.job_id) => Some(event),
                // Lagged receivers skip ahead instead of ending the stream.
                _ => None,
            };
            futures::future::ready(keep)
        });
        Box::pin(s)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> DocumentId {
        DocumentId::for_content(b"%PDF")
    }

    #[test]
    fn send_receive() {
        let b = JobEventBroadcaster::new(8);
        let mut rx = b.subscribe();
        let job = JobId::new();

        b.send(JobEvent::new(job, &doc(), JobState::Pending, JobEventKind::Submitted));

        let got = rx.try_recv().unwrap();
        assert_eq!(got.job_id, job);
        assert_eq!(got.kind, JobEventKind::Submitted);
        assert!(!got.is_terminal());
    }

    #[test]
    fn send_without_subscribers_is_ok() {
        let b = JobEventBroadcaster::default();
        b.send(JobEvent::new(
            JobId::new(),
            &doc(),
            JobState::Cancelled,
            JobEventKind::Cancelled,
        ));
        assert_eq!(b.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stream_filters_by_job() {
        let b = JobEventBroadcaster::new(8);
        let wanted = JobId::new();
        let other = JobId::new();
        let mut s = b.stream(Some(wanted));

        b.send(JobEvent::new(other, &doc(), JobState::Pending, JobEventKind::Submitted));
        b.send(JobEvent::new(
            wanted,
            &doc(),
            JobState::Running,
            JobEventKind::AttemptStarted { attempt: 1 },
        ));

        let first = s.next().await.unwrap();
        assert_eq!(first.job_id, wanted);
        assert_eq!(first.kind, JobEventKind::AttemptStarted { attempt: 1 });
    }

    #[test]
    fn event_json_shape() {
        let e = JobEvent::new(
            JobId::new(),
            &doc(),
            JobState::Running,
            JobEventKind::RetryScheduled {
                attempt: 2,
                delay_ms: 1000,
                error: "rate limited".into(),
            },
        );
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"]["type"], "retry_scheduled");
        assert_eq!(json["kind"]["delay_ms"], 1000);
        assert_eq!(json["state"], "running");
    }
}
