use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::engine::TranslationEngine;
use crate::error::EngineError;

/// Engine that sleeps for a fixed delay and returns the document unchanged.
///
/// Stands in for a real translator in demos and local runs of the CLI.
#[derive(Debug, Clone)]
pub struct EchoEngine {
    delay: Duration,
}

impl EchoEngine {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl TranslationEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    async fn translate(
        &self,
        document: &[u8],
        _source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Vec<u8>, EngineError> {
        debug!(
            "echo: {} bytes → {} after {:?}",
            document.len(),
            target_lang,
            self.delay
        );
        tokio::time::sleep(self.delay).await;
        Ok(document.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_input() {
        let engine = EchoEngine::new(Duration::ZERO);
        let out = tokio_test::block_on(engine.translate(b"%PDF-1.7", None, "fr")).unwrap();
        assert_eq!(out, b"%PDF-1.7");
        assert_eq!(engine.name(), "echo");
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_delay() {
        let engine = EchoEngine::new(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        engine.translate(b"x", Some("en"), "de").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
