//! Filesystem-backed artifact store.
//!
//! Layout: a single directory holding `<id>.json` (metadata) and `<id>.bin`
//! (content). Both are written to a temp file first and renamed into place.
//! The `.bin` rename happens last and is what publishes the document:
//! `exists`/`get` key off the `.bin` file, so a reader never sees a
//! half-written artifact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::document::{DocumentId, DocumentMeta, StoredDocument};
use crate::error::TranslateError;
use crate::store::ArtifactStore;

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, TranslateError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| TranslateError::Storage {
                path: root.clone(),
                source: e,
            })?;
        info!("Artifact store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, id: &DocumentId) -> PathBuf {
        self.root.join(format!("{id}.bin"))
    }

    fn meta_path(&self, id: &DocumentId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn read_meta(&self, id: &DocumentId) -> Result<DocumentMeta, TranslateError> {
        let path = self.meta_path(id);
        let raw = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TranslateError::CorruptMetadata {
                    path: path.clone(),
                    detail: "metadata file missing".into(),
                }
            } else {
                TranslateError::Storage {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;
        serde_json::from_slice(&raw).map_err(|e| TranslateError::CorruptMetadata {
            path,
            detail: e.to_string(),
        })
    }
}

/// Atomic write: write to a unique temp file in the same directory, then rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TranslateError> {
    let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| TranslateError::Storage {
            path: tmp_path.clone(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(TranslateError::Storage {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn put(&self, bytes: Vec<u8>, mut meta: DocumentMeta) -> Result<DocumentId, TranslateError> {
        let id = DocumentId::for_content(&bytes);
        if self.exists(&id).await {
            debug!("Document {} already on disk", id.short());
            return Ok(id);
        }

        meta.size = bytes.len() as u64;
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| TranslateError::Internal(format!("metadata encode: {e}")))?;

        write_atomic(&self.meta_path(&id), &meta_json).await?;
        write_atomic(&self.content_path(&id), &bytes).await?;

        debug!("Wrote document {} ({} bytes)", id.short(), bytes.len());
        Ok(id)
    }

    async fn get(&self, id: &DocumentId) -> Result<StoredDocument, TranslateError> {
        let path = self.content_path(id);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TranslateError::DocumentNotFound(id.clone())
            } else {
                TranslateError::Storage { path, source: e }
            }
        })?;
        let meta = self.read_meta(id).await?;
        Ok(StoredDocument {
            id: id.clone(),
            meta,
            bytes,
        })
    }

    async fn metadata(&self, id: &DocumentId) -> Result<DocumentMeta, TranslateError> {
        if !self.exists(id).await {
            return Err(TranslateError::DocumentNotFound(id.clone()));
        }
        self.read_meta(id).await
    }

    async fn exists(&self, id: &DocumentId) -> bool {
        tokio::fs::try_exists(self.content_path(id))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_and_layout() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path().join("artifacts")).await.unwrap();

        let id = store
            .put(
                b"%PDF-1.4 test".to_vec(),
                DocumentMeta::upload("t.pdf", DocumentKind::Pdf),
            )
            .await
            .unwrap();

        assert!(store.root().join(format!("{id}.bin")).exists());
        assert!(store.root().join(format!("{id}.json")).exists());

        let doc = store.get(&id).await.unwrap();
        assert_eq!(doc.bytes, b"%PDF-1.4 test");
        assert_eq!(doc.meta.name, "t.pdf");
        assert_eq!(doc.meta.size, 13);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        store
            .put(vec![0u8; 4096], DocumentMeta::upload("z.pdf", DocumentKind::Pdf))
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = FsStore::open(dir.path()).await.unwrap();
            store
                .put(b"%PDF keep".to_vec(), DocumentMeta::upload("k.pdf", DocumentKind::Pdf))
                .await
                .unwrap()
        };

        let reopened = FsStore::open(dir.path()).await.unwrap();
        assert!(reopened.exists(&id).await);
        assert_eq!(reopened.metadata(&id).await.unwrap().name, "k.pdf");
    }

    #[tokio::test]
    async fn missing_document() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let id = DocumentId::for_content(b"nope");

        assert!(!store.exists(&id).await);
        assert!(matches!(
            store.get(&id).await,
            Err(TranslateError::DocumentNotFound(_))
        ));
        assert!(matches!(
            store.metadata(&id).await,
            Err(TranslateError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unreadable_metadata_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let id = store
            .put(b"%PDF x".to_vec(), DocumentMeta::upload("x.pdf", DocumentKind::Pdf))
            .await
            .unwrap();
        std::fs::write(dir.path().join(format!("{id}.json")), b"{not json").unwrap();

        let err = store.get(&id).await.unwrap_err();
        assert!(matches!(err, TranslateError::CorruptMetadata { .. }), "got {err}");
    }
}
