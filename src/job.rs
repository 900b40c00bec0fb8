//! Translation jobs and their state machine.
//!
//! ```text
//!            ┌──────────── cancel ────────────┐
//!            │                                ▼
//! Pending ──▶ Running ──▶ Succeeded       Cancelled
//!            │   ▲  │
//!            │   └──┘ transient failure (Retrying, observed as Running)
//!            └──────▶ Failed
//! ```
//!
//! A Pending job may also go straight to `Failed` when it cannot start at
//! all (e.g. its source document is unreadable).
//!
//! Terminal states (`Succeeded`, `Failed`, `Cancelled`) are final. All
//! mutation goes through [`TranslationJob::transition`], which refuses any
//! move that would make a polling caller observe the state going backwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentId;
use crate::error::TranslateError;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(JobId)
            .map_err(|_| TranslateError::InvalidId(s.to_string()))
    }
}

/// Externally observable job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// Position in the forward order; a job never moves to a lower rank.
    fn rank(&self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled => 2,
        }
    }

    /// Whether `self → next` is a legal transition.
    ///
    /// `Running → Running` is allowed: it is how a retry re-enters the
    /// running state after its backoff. `Pending → Failed` covers a job
    /// that never got to make an engine call.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (JobState::Pending, JobState::Succeeded) => false,
            _ => next.rank() >= self.rank(),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The job record owned by the job manager.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub id: JobId,
    pub source: DocumentId,
    pub source_language: Option<String>,
    pub target_language: String,
    state: JobState,
    /// Set while waiting out a backoff delay; reported as `Running`.
    retrying: bool,
    attempt_count: u32,
    last_error: Option<String>,
    result: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TranslationJob {
    pub fn new(source: DocumentId, source_language: Option<String>, target_language: String) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source,
            source_language,
            target_language,
            state: JobState::Pending,
            retrying: false,
            attempt_count: 0,
            last_error: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn is_retrying(&self) -> bool {
        self.retrying
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply a transition. Returns `false` (and changes nothing) when the
    /// move is illegal, e.g. the job was cancelled while an attempt was in
    /// flight.
    pub fn transition(&mut self, change: Transition) -> bool {
        let next = change.target_state();
        if !self.state.can_transition_to(next) {
            return false;
        }

        match change {
            Transition::AttemptStarted => {
                self.attempt_count += 1;
                self.retrying = false;
            }
            Transition::RetryScheduled { error } => {
                self.retrying = true;
                self.last_error = Some(error);
            }
            Transition::Succeeded { result } => {
                self.retrying = false;
                self.result = Some(result);
            }
            Transition::Failed { error } => {
                self.retrying = false;
                self.last_error = Some(if error.trim().is_empty() {
                    "translation failed".to_string()
                } else {
                    error
                });
            }
            Transition::Cancelled => {
                self.retrying = false;
            }
        }

        self.state = next;
        self.updated_at = Utc::now();
        true
    }

    /// Point-in-time view handed to callers.
    pub fn snapshot(&self) -> JobStatus {
        JobStatus {
            job_id: self.id,
            source_document_id: self.source.clone(),
            target_language: self.target_language.clone(),
            state: self.state,
            attempt_count: self.attempt_count,
            last_error: self.last_error.clone(),
            result_document_id: self.result.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A requested state change, carrying the data that goes with it.
#[derive(Debug, Clone)]
pub enum Transition {
    /// An engine call is about to be made (first attempt or a retry).
    AttemptStarted,
    /// A transient failure; the job will retry after a backoff.
    RetryScheduled { error: String },
    Succeeded { result: DocumentId },
    Failed { error: String },
    Cancelled,
}

impl Transition {
    fn target_state(&self) -> JobState {
        match self {
            Transition::AttemptStarted | Transition::RetryScheduled { .. } => JobState::Running,
            Transition::Succeeded { .. } => JobState::Succeeded,
            Transition::Failed { .. } => JobState::Failed,
            Transition::Cancelled => JobState::Cancelled,
        }
    }
}

/// Caller-facing job status.
///
/// `result_document_id` is `Some` exactly when `state` is `Succeeded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub source_document_id: DocumentId,
    pub target_language: String,
    pub state: JobState,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_document_id: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranslationJob {
        TranslationJob::new(DocumentId::for_content(b"%PDF"), None, "fr".into())
    }

    #[test]
    fn new_job_is_pending() {
        let j = job();
        let s = j.snapshot();
        assert_eq!(s.state, JobState::Pending);
        assert_eq!(s.attempt_count, 0);
        assert!(s.result_document_id.is_none());
        assert!(s.last_error.is_none());
    }

    #[test]
    fn happy_path() {
        let mut j = job();
        assert!(j.transition(Transition::AttemptStarted));
        assert_eq!(j.state(), JobState::Running);
        assert_eq!(j.attempt_count(), 1);

        let out = DocumentId::for_content(b"%PDF fr");
        assert!(j.transition(Transition::Succeeded { result: out.clone() }));
        let s = j.snapshot();
        assert_eq!(s.state, JobState::Succeeded);
        assert_eq!(s.result_document_id, Some(out));
    }

    #[test]
    fn retry_is_observed_as_running() {
        let mut j = job();
        j.transition(Transition::AttemptStarted);
        assert!(j.transition(Transition::RetryScheduled {
            error: "503".into()
        }));
        assert_eq!(j.state(), JobState::Running);
        assert!(j.is_retrying());
        assert_eq!(j.snapshot().last_error.as_deref(), Some("503"));

        assert!(j.transition(Transition::AttemptStarted));
        assert!(!j.is_retrying());
        assert_eq!(j.attempt_count(), 2);
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            Transition::Succeeded {
                result: DocumentId::for_content(b"r"),
            },
            Transition::Failed { error: "bad".into() },
            Transition::Cancelled,
        ] {
            let mut j = job();
            j.transition(Transition::AttemptStarted);
            assert!(j.transition(terminal));
            let frozen = j.snapshot();

            assert!(!j.transition(Transition::AttemptStarted));
            assert!(!j.transition(Transition::Cancelled));
            assert!(!j.transition(Transition::Failed { error: "x".into() }));
            assert_eq!(j.snapshot(), frozen);
        }
    }

    #[test]
    fn pending_cannot_skip_to_result() {
        let mut j = job();
        assert!(!j.transition(Transition::Succeeded {
            result: DocumentId::for_content(b"r")
        }));
        assert!(j.transition(Transition::Cancelled));
        assert_eq!(j.state(), JobState::Cancelled);
    }

    #[test]
    fn pending_job_can_fail_before_first_attempt() {
        let mut j = job();
        assert!(j.transition(Transition::Failed {
            error: "source unreadable".into()
        }));
        let s = j.snapshot();
        assert_eq!(s.state, JobState::Failed);
        assert_eq!(s.attempt_count, 0);
        assert_eq!(s.last_error.as_deref(), Some("source unreadable"));
    }

    #[test]
    fn failed_always_has_error_text() {
        let mut j = job();
        j.transition(Transition::AttemptStarted);
        j.transition(Transition::Failed { error: "  ".into() });
        assert_eq!(j.snapshot().last_error.as_deref(), Some("translation failed"));
        assert!(j.snapshot().result_document_id.is_none());
    }

    #[test]
    fn state_order() {
        assert!(JobState::Pending.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Running));
        assert!(!JobState::Running.can_transition_to(JobState::Pending));
        assert!(JobState::Pending.can_transition_to(JobState::Failed));
        assert!(!JobState::Pending.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Running));
        assert!(!JobState::Cancelled.can_transition_to(JobState::Cancelled));
    }

    #[test]
    fn job_id_parse() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!(matches!("nope".parse::<JobId>(), Err(TranslateError::InvalidId(_))));
    }

    #[test]
    fn status_serialises_camel_case() {
        let json = serde_json::to_value(job().snapshot()).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["attemptCount"], 0);
        assert!(json.get("resultDocumentId").is_none());
    }
}
