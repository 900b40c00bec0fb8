//! # edgequake-pdftrans
//!
//! Asynchronous PDF translation jobs: upload a document, translate it with
//! retry and backoff, track the job, download the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (bytes + declared kind)
//!  │
//!  ├─ 1. Store     content-addressed, write-once ArtifactStore
//!  ├─ 2. Submit    one active job per document, returns a JobId at once
//!  ├─ 3. Run       bounded concurrency, engine call per attempt
//!  ├─ 4. Retry     transient failures: exponential backoff with jitter
//!  ├─ 5. Publish   translated bytes stored, job marked Succeeded
//!  └─ 6. Observe   poll status / wait_for / subscribe to events
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use edgequake_pdftrans::{DashboardFacade, EchoEngine, JobManager, JobManagerConfig, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = JobManager::new(
//!         JobManagerConfig::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(EchoEngine::default()),
//!     );
//!     let dashboard = DashboardFacade::new(manager);
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     let doc = dashboard.upload("report.pdf", "application/pdf", bytes).await?;
//!     let job = dashboard.translate(&doc, "fr").await?;
//!
//!     let status = dashboard.wait(job, Duration::from_secs(60)).await?;
//!     eprintln!("{}: {} after {} attempt(s)", job, status.state, status.attempt_count);
//!     dashboard.save_result(job, "report.fr.pdf").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftrans` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdftrans = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod facade;
pub mod input;
pub mod job;
pub mod language;
pub mod manager;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{JobManagerConfig, JobManagerConfigBuilder};
pub use document::{DocumentId, DocumentKind, DocumentMeta, StoredDocument};
pub use engine::{EchoEngine, HttpEngine, HttpEngineConfig, TranslationEngine};
pub use error::{EngineError, TranslateError};
pub use events::{JobEvent, JobEventKind, JobEventStream};
pub use facade::DashboardFacade;
pub use input::{load_input, LoadedInput};
pub use job::{JobId, JobState, JobStatus};
pub use language::normalize_language;
pub use manager::JobManager;
pub use store::{ArtifactStore, FsStore, MemoryStore};
