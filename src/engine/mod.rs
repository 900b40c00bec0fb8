//! Translation engines.
//!
//! The engine is the only part of the pipeline that does real work, and it
//! is opaque: the job manager hands it source bytes and a
//! language pair and gets translated bytes or a classified [`EngineError`]
//! back. Retry, timeout and cancellation all live in the job manager, so an
//! engine implementation makes a single attempt and returns.
//!
//! * [`EchoEngine`]: waits, then returns the input unchanged.
//! * [`HttpEngine`]: POSTs the document to a remote translation service.

pub mod echo;
pub mod http;

use async_trait::async_trait;

use crate::error::EngineError;

pub use echo::EchoEngine;
pub use http::{HttpEngine, HttpEngineConfig};

/// An external document translator.
///
/// Implementations must be `Send + Sync`: one engine instance is shared by
/// every running job.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Translate `document` into `target_lang`.
    ///
    /// `source_lang` is `None` when the caller wants the engine to detect
    /// it. Classify failures carefully: `Transient` is retried with
    /// backoff, `Permanent` fails the job immediately.
    async fn translate(
        &self,
        document: &[u8],
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Vec<u8>, EngineError>;
}
