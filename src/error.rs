//! Error types for the edgequake-pdftrans library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TranslateError`] — **Synchronous**: the caller's request cannot be
//!   honoured (unsupported upload, duplicate active job, unknown id, wait
//!   budget exceeded). Returned as `Err(TranslateError)` from the
//!   [`crate::JobManager`] and [`crate::DashboardFacade`] methods.
//!
//! * [`EngineError`] — **Captured**: a single translation attempt failed.
//!   It never crosses the job boundary; the job runner classifies it,
//!   retries transient failures and records the last one inside the job so
//!   callers observe it through [`crate::JobManager::status`].

use std::path::PathBuf;
use thiserror::Error;

use crate::document::DocumentId;
use crate::job::{JobId, JobState};

/// All errors returned synchronously by the edgequake-pdftrans library.
///
/// Engine failures use [`EngineError`] and are stored in the job record
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Request errors ────────────────────────────────────────────────────
    /// A non-terminal job already exists for this source document.
    #[error("Document {document} already has an active translation job ({existing})")]
    Conflict {
        document: DocumentId,
        existing: JobId,
    },

    /// The uploaded content is not of the single allowed kind (PDF).
    #[error("Unsupported document type '{declared}': only PDF uploads are accepted")]
    UnsupportedType { declared: String },

    /// The target (or source) language tag is not a valid BCP-47-style tag.
    #[error("Invalid language tag '{tag}'\nUse a tag such as 'fr', 'de' or 'pt-BR'.")]
    InvalidLanguage { tag: String },

    // ── Lookup errors ─────────────────────────────────────────────────────
    /// A caller-supplied identifier is malformed.
    #[error("'{0}' is not a valid job or document identifier")]
    InvalidId(String),

    /// No job with this identifier is tracked.
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// No document with this identifier is stored.
    #[error("Document {0} not found")]
    DocumentNotFound(DocumentId),

    /// The job has not produced a translated artifact (yet).
    #[error("Job {job} has no translated document: state is {state}")]
    NotReady { job: JobId, state: JobState },

    // ── Waiting ───────────────────────────────────────────────────────────
    /// `wait_for` exceeded the caller's budget. The job keeps running.
    #[error("Timed out after {waited_ms}ms waiting for job {job}")]
    TimedOut { job: JobId, waited_ms: u64 },

    /// The job was cancelled before it could finish.
    #[error("Job {0} was cancelled")]
    Cancelled(JobId),

    // ── Input errors (CLI loader) ─────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Reading or writing a stored artifact failed.
    #[error("Artifact storage failed at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored metadata could not be decoded.
    #[error("Corrupt artifact metadata at '{path}': {detail}")]
    CorruptMetadata { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TranslateError {
    /// True for the "unknown identifier" family, whatever the id kind.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TranslateError::JobNotFound(_) | TranslateError::DocumentNotFound(_)
        )
    }
}

/// A failed translation attempt, classified for the retry policy.
///
/// Stored (as its display string) in the job record once retries are
/// exhausted or the failure is permanent.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum EngineError {
    /// Timeout, rate limit, overloaded backend. Retried with backoff.
    #[error("transient engine failure: {reason}")]
    Transient { reason: String },

    /// Unsupported language, corrupt input, rejected credentials. Never retried.
    #[error("permanent engine failure: {reason}")]
    Permanent { reason: String },
}

impl EngineError {
    pub fn transient(reason: impl Into<String>) -> Self {
        EngineError::Transient {
            reason: non_empty(reason.into()),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        EngineError::Permanent {
            reason: non_empty(reason.into()),
        }
    }

    /// An attempt that exceeded the per-call budget.
    pub fn timeout(secs: u64) -> Self {
        EngineError::transient(format!("engine call timed out after {secs}s"))
    }

    /// HTTP 429 or equivalent back-pressure signal.
    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        match retry_after_secs {
            Some(s) => EngineError::transient(format!("rate limited (retry after {s}s)")),
            None => EngineError::transient("rate limited"),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            EngineError::Transient { reason } | EngineError::Permanent { reason } => reason,
        }
    }
}

fn non_empty(reason: String) -> String {
    if reason.trim().is_empty() {
        "engine failed without detail".to_string()
    } else {
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_classification() {
        assert!(EngineError::transient("503").is_transient());
        assert!(EngineError::timeout(30).is_transient());
        assert!(EngineError::rate_limited(None).is_transient());
        assert!(!EngineError::permanent("unsupported language").is_transient());
    }

    #[test]
    fn engine_error_never_has_empty_reason() {
        let e = EngineError::permanent("   ");
        assert_eq!(e.reason(), "engine failed without detail");
        assert!(!e.to_string().is_empty());
    }

    #[test]
    fn rate_limit_display_with_retry() {
        let e = EngineError::rate_limited(Some(60));
        assert!(e.to_string().contains("60s"), "got: {e}");
    }

    #[test]
    fn timeout_display() {
        let e = EngineError::timeout(120);
        assert!(e.to_string().contains("120s"));
        assert!(e.to_string().starts_with("transient"));
    }

    #[test]
    fn unsupported_type_display() {
        let e = TranslateError::UnsupportedType {
            declared: "exe".into(),
        };
        assert!(e.to_string().contains("'exe'"));
    }

    #[test]
    fn not_found_family() {
        let job = JobId::new();
        assert!(TranslateError::JobNotFound(job).is_not_found());
        assert!(!TranslateError::Cancelled(job).is_not_found());
    }
}
