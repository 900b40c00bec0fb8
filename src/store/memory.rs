use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::document::{DocumentId, DocumentMeta, StoredDocument};
use crate::error::TranslateError;
use crate::store::ArtifactStore;

/// In-memory store; documents live as long as the process.
///
/// Each document is built completely before it is inserted under the write
/// lock, so readers can only ever see a whole `Arc<StoredDocument>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<DocumentId, Arc<StoredDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<DocumentId, Arc<StoredDocument>>> {
        self.docs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, id: &DocumentId) -> Result<Arc<StoredDocument>, TranslateError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| TranslateError::DocumentNotFound(id.clone()))
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, bytes: Vec<u8>, mut meta: DocumentMeta) -> Result<DocumentId, TranslateError> {
        let id = DocumentId::for_content(&bytes);
        meta.size = bytes.len() as u64;
        let doc = Arc::new(StoredDocument {
            id: id.clone(),
            meta,
            bytes,
        });

        let mut docs = self
            .docs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if docs.contains_key(&id) {
            debug!("Document {} already stored, keeping existing copy", id.short());
        } else {
            debug!("Stored document {} ({} bytes)", id.short(), doc.bytes.len());
            docs.insert(id.clone(), doc);
        }
        Ok(id)
    }

    async fn get(&self, id: &DocumentId) -> Result<StoredDocument, TranslateError> {
        self.lookup(id).map(|doc| (*doc).clone())
    }

    async fn metadata(&self, id: &DocumentId) -> Result<DocumentMeta, TranslateError> {
        self.lookup(id).map(|doc| doc.meta.clone())
    }

    async fn exists(&self, id: &DocumentId) -> bool {
        self.read().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentKind;

    fn meta(name: &str) -> DocumentMeta {
        DocumentMeta::upload(name, DocumentKind::Pdf)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryStore::new();
        let id = store.put(b"%PDF-1.7 body".to_vec(), meta("a.pdf")).await.unwrap();

        let doc = store.get(&id).await.unwrap();
        assert_eq!(doc.bytes, b"%PDF-1.7 body");
        assert_eq!(doc.meta.size, 13);
        assert_eq!(doc.meta.name, "a.pdf");
        assert!(store.exists(&id).await);
    }

    #[tokio::test]
    async fn empty_and_large_content() {
        let store = MemoryStore::new();

        let empty = store.put(Vec::new(), meta("empty.pdf")).await.unwrap();
        assert!(store.get(&empty).await.unwrap().bytes.is_empty());

        let large: Vec<u8> = (0..8 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let id = store.put(large.clone(), meta("large.pdf")).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().bytes, large);
    }

    #[tokio::test]
    async fn identical_content_dedupes_first_meta_wins() {
        let store = MemoryStore::new();
        let a = store.put(b"%PDF same".to_vec(), meta("first.pdf")).await.unwrap();
        let b = store.put(b"%PDF same".to_vec(), meta("second.pdf")).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.metadata(&a).await.unwrap().name, "first.pdf");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let id = DocumentId::for_content(b"never stored");

        assert!(!store.exists(&id).await);
        let err = store.get(&id).await.unwrap_err();
        assert!(matches!(err, TranslateError::DocumentNotFound(ref missing) if *missing == id));
        assert!(store.metadata(&id).await.is_err());
    }
}
