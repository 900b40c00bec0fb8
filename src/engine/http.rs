//! Remote translation service adapter.
//!
//! Protocol: `POST {endpoint}?target=<lang>[&source=<lang>]` with the raw
//! document as the body (`Content-Type: application/pdf`). A 2xx response
//! body is the translated document.
//!
//! ## Failure classification
//!
//! | Outcome | Class |
//! |---------|-------|
//! | connect error, request timeout | transient |
//! | 408, 425, 429, 5xx | transient |
//! | any other 4xx (bad language, corrupt input, auth) | permanent |
//! | 2xx with an empty body | permanent |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use tracing::{debug, warn};

use crate::engine::TranslationEngine;
use crate::error::{EngineError, TranslateError};

/// Connection settings for [`HttpEngine`].
#[derive(Clone)]
pub struct HttpEngineConfig {
    pub endpoint: Url,
    /// Sent as `Authorization: Bearer <key>` when set.
    pub api_key: Option<String>,
    /// Transport-level timeout for one request. Default: 120 s.
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for HttpEngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEngineConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl HttpEngineConfig {
    pub fn new(endpoint: &str) -> Result<Self, TranslateError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            TranslateError::InvalidConfig(format!("engine endpoint '{endpoint}': {e}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TranslateError::InvalidConfig(format!(
                "engine endpoint must be http(s), got '{}'",
                endpoint.scheme()
            )));
        }
        Ok(Self {
            endpoint,
            api_key: None,
            request_timeout_secs: 120,
        })
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs.max(1);
        self
    }
}

/// Engine backed by a remote HTTP translation service.
pub struct HttpEngine {
    client: reqwest::Client,
    config: HttpEngineConfig,
}

impl HttpEngine {
    pub fn new(config: HttpEngineConfig) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TranslateError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn request_url(&self, source_lang: Option<&str>, target_lang: &str) -> Url {
        let mut url = self.config.endpoint.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("target", target_lang);
            if let Some(src) = source_lang {
                q.append_pair("source", src);
            }
        }
        url
    }
}

/// Map an HTTP status to an engine error. `None` means success.
pub fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> Option<EngineError> {
    if status.is_success() {
        return None;
    }
    let detail = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", truncate(body.trim(), 200))
    };
    Some(match status.as_u16() {
        429 => EngineError::rate_limited(retry_after),
        408 | 425 => EngineError::transient(detail),
        s if s >= 500 => EngineError::transient(detail),
        _ => EngineError::permanent(detail),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl TranslationEngine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn translate(
        &self,
        document: &[u8],
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Vec<u8>, EngineError> {
        let url = self.request_url(source_lang, target_lang);
        debug!("POST {} ({} bytes)", url, document.len());

        let mut request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/pdf")
            .header(header::ACCEPT, "application/pdf")
            .body(document.to_vec());
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::timeout(self.config.request_timeout_secs)
            } else if e.is_connect() || e.is_request() {
                EngineError::transient(format!("request failed: {e}"))
            } else {
                EngineError::permanent(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, retry_after, &body)
                .unwrap_or_else(|| EngineError::transient(format!("HTTP {status}")));
            warn!("Translation service rejected request: {}", err);
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::transient(format!("reading response body: {e}")))?;
        if bytes.is_empty() {
            return Err(EngineError::permanent(
                "translation service returned an empty document",
            ));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::OK, None, "").is_none());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, Some(3), "")
            .unwrap()
            .is_transient());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, None, "")
            .unwrap()
            .is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, None, "")
            .unwrap()
            .is_transient());

        let bad_lang = classify_status(StatusCode::UNPROCESSABLE_ENTITY, None, "unsupported language xx").unwrap();
        assert!(!bad_lang.is_transient());
        assert!(bad_lang.reason().contains("unsupported language"));

        assert!(!classify_status(StatusCode::UNAUTHORIZED, None, "").unwrap().is_transient());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(5_000);
        let err = classify_status(StatusCode::BAD_REQUEST, None, &body).unwrap();
        assert!(err.reason().len() < 300);
    }

    #[test]
    fn request_url_carries_languages() {
        let engine = HttpEngine::new(HttpEngineConfig::new("https://translate.example/v1/documents").unwrap()).unwrap();
        let url = engine.request_url(Some("en"), "pt-BR");
        assert_eq!(url.path(), "/v1/documents");
        assert_eq!(url.query(), Some("target=pt-BR&source=en"));

        let url = engine.request_url(None, "fr");
        assert_eq!(url.query(), Some("target=fr"));
    }

    #[test]
    fn config_rejects_non_http() {
        assert!(HttpEngineConfig::new("ftp://example.com").is_err());
        assert!(HttpEngineConfig::new("not a url").is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let cfg = HttpEngineConfig::new("http://localhost:8080").unwrap().api_key("sk-secret");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        // Port 9 (discard) on localhost is closed on test machines.
        let cfg = HttpEngineConfig::new("http://127.0.0.1:9/translate")
            .unwrap()
            .request_timeout_secs(2);
        let engine = HttpEngine::new(cfg).unwrap();
        let err = engine.translate(b"%PDF", None, "fr").await.unwrap_err();
        assert!(err.is_transient(), "got {err}");
    }
}
