//! Caller-facing surface: upload, translate, track, download.
//!
//! A thin layer over [`JobManager`] and the [`ArtifactStore`] that owns the
//! upload boundary (declared-kind and content checks) and resolves a
//! finished job to its translated bytes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::document::{DocumentId, DocumentKind, DocumentMeta, StoredDocument};
use crate::error::TranslateError;
use crate::job::{JobId, JobState, JobStatus};
use crate::manager::JobManager;
use crate::store::ArtifactStore;

#[derive(Clone)]
pub struct DashboardFacade {
    manager: JobManager,
    store: Arc<dyn ArtifactStore>,
}

impl DashboardFacade {
    /// Wrap a manager; uploads go to the manager's own store.
    pub fn new(manager: JobManager) -> Self {
        let store = manager.store();
        Self { manager, store }
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    /// Store an uploaded document and return its id. Creates no job.
    ///
    /// `declared_kind` is what the caller says the content is (`pdf`,
    /// `application/pdf`, …). Anything but PDF, or PDF-declared bytes that
    /// lack the `%PDF` header, is rejected with `UnsupportedType`.
    pub async fn upload(
        &self,
        name: &str,
        declared_kind: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentId, TranslateError> {
        let kind = DocumentKind::from_declared(declared_kind)?;
        if !kind.matches_content(&bytes) {
            return Err(TranslateError::UnsupportedType {
                declared: format!("{declared_kind} (content is not a {kind})"),
            });
        }
        let size = bytes.len();
        let id = self.store.put(bytes, DocumentMeta::upload(name, kind)).await?;
        info!("Uploaded '{}' as {} ({} bytes)", name, id.short(), size);
        Ok(id)
    }

    pub async fn translate(&self, document: &DocumentId, language: &str) -> Result<JobId, TranslateError> {
        self.manager.submit(document, language).await
    }

    /// Like [`translate`](Self::translate) with an explicit source language.
    pub async fn translate_from(
        &self,
        document: &DocumentId,
        source_language: Option<&str>,
        language: &str,
    ) -> Result<JobId, TranslateError> {
        self.manager
            .submit_with_source(document, source_language, language)
            .await
    }

    pub fn status(&self, job: JobId) -> Result<JobStatus, TranslateError> {
        self.manager.status(job)
    }

    pub fn cancel(&self, job: JobId) -> Result<JobStatus, TranslateError> {
        self.manager.cancel(job)
    }

    pub async fn wait(&self, job: JobId, timeout: Duration) -> Result<JobStatus, TranslateError> {
        self.manager.wait_for(job, timeout).await
    }

    /// Bytes of any stored document, original or translated.
    pub async fn download(&self, document: &DocumentId) -> Result<Vec<u8>, TranslateError> {
        Ok(self.store.get(document).await?.bytes)
    }

    /// The translated document of a finished job.
    ///
    /// `Cancelled` for a cancelled job, `NotReady` for any other state but
    /// Succeeded.
    pub async fn download_result(&self, job: JobId) -> Result<StoredDocument, TranslateError> {
        let status = self.manager.status(job)?;
        match (status.state, status.result_document_id) {
            (JobState::Succeeded, Some(result)) => self.store.get(&result).await,
            (JobState::Cancelled, _) => Err(TranslateError::Cancelled(job)),
            (state, _) => Err(TranslateError::NotReady { job, state }),
        }
    }

    /// Write a finished job's translated document to `path`.
    ///
    /// Writes to a temp file next to `path`, then renames, so a reader never
    /// sees a half-written PDF. Returns the number of bytes written.
    pub async fn save_result(&self, job: JobId, path: impl AsRef<Path>) -> Result<u64, TranslateError> {
        let doc = self.download_result(job).await?;
        let path = path.as_ref();
        let io_err = |source: std::io::Error| TranslateError::Storage {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, &doc.bytes).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_err(e));
        }
        Ok(doc.bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobManagerConfig;
    use crate::engine::EchoEngine;
    use crate::store::MemoryStore;

    fn facade(delay: Duration) -> DashboardFacade {
        DashboardFacade::new(JobManager::new(
            JobManagerConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(EchoEngine::new(delay)),
        ))
    }

    #[tokio::test]
    async fn upload_rejects_other_kinds() {
        let f = facade(Duration::ZERO);
        for declared in ["docx", "image/png", "text/plain", ""] {
            let err = f.upload("x", declared, b"%PDF-1.7".to_vec()).await.unwrap_err();
            assert!(matches!(err, TranslateError::UnsupportedType { .. }), "{declared}");
        }
        assert!(f.manager().list().is_empty());
    }

    #[tokio::test]
    async fn upload_rejects_mislabelled_content() {
        let f = facade(Duration::ZERO);
        let err = f
            .upload("fake.pdf", "application/pdf", b"PK\x03\x04 zip".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedType { .. }));
    }

    #[tokio::test]
    async fn upload_then_download() {
        let f = facade(Duration::ZERO);
        let id = f.upload("a.pdf", "pdf", b"%PDF-1.7 a".to_vec()).await.unwrap();
        assert_eq!(f.download(&id).await.unwrap(), b"%PDF-1.7 a");

        let missing = DocumentId::for_content(b"other");
        assert!(f.download(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn result_is_not_ready_while_running() {
        let f = facade(Duration::from_secs(10));
        let doc = f.upload("a.pdf", "pdf", b"%PDF-1.7 a".to_vec()).await.unwrap();
        let job = f.translate(&doc, "fr").await.unwrap();

        assert!(matches!(
            f.download_result(job).await,
            Err(TranslateError::NotReady { .. })
        ));

        let done = f.wait(job, Duration::from_secs(60)).await.unwrap();
        assert_eq!(done.state, JobState::Succeeded);

        let result = f.download_result(job).await.unwrap();
        assert_eq!(result.bytes, b"%PDF-1.7 a");
        // Echo output is byte-identical, so it dedupes onto the source.
        assert_eq!(result.id, doc);
    }

    #[tokio::test]
    async fn save_result_writes_whole_file() {
        let f = facade(Duration::ZERO);
        let doc = f.upload("a.pdf", "pdf", b"%PDF-1.7 save me".to_vec()).await.unwrap();
        let job = f.translate(&doc, "it").await.unwrap();
        f.wait(job, Duration::from_secs(5)).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("a.it.pdf");
        let written = f.save_result(job, &out).await.unwrap();

        assert_eq!(written, 16);
        assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-1.7 save me");
        let leftovers: Vec<_> = std::fs::read_dir(out.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_to_one_path_do_not_collide() {
        let f = facade(Duration::ZERO);
        let body = b"%PDF-1.7 shared output".to_vec();
        let doc = f.upload("a.pdf", "pdf", body.clone()).await.unwrap();
        let job = f.translate(&doc, "nl").await.unwrap();
        f.wait(job, Duration::from_secs(5)).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.nl.pdf");
        let saves: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                let out = out.clone();
                tokio::spawn(async move { f.save_result(job, &out).await })
            })
            .collect();
        for save in saves {
            assert_eq!(save.await.unwrap().unwrap(), body.len() as u64);
        }
        assert_eq!(std::fs::read(&out).unwrap(), body);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn download_result_of_unknown_job() {
        let f = facade(Duration::ZERO);
        assert!(f.download_result(JobId::new()).await.unwrap_err().is_not_found());
    }
}
