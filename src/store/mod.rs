//! Artifact storage for uploaded and translated documents.
//!
//! Documents are write-once and addressed by content hash, so there is no
//! update or delete. Every implementation must publish a document
//! atomically: a concurrent reader sees either nothing or the complete
//! bytes, never a prefix.
//!
//! ```text
//! upload ──put──▶ ArtifactStore ◀──put── JobManager (on Succeeded)
//!                      │
//!                      └──get──▶ download / engine input
//! ```
//!
//! * [`MemoryStore`]: process-lifetime map, the default.
//! * [`FsStore`]: one directory on disk; survives restarts.

pub mod fs;
pub mod memory;

use async_trait::async_trait;

use crate::document::{DocumentId, DocumentMeta, StoredDocument};
use crate::error::TranslateError;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Content-addressed, write-once document storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` and return their identifier.
    ///
    /// Storing content that is already present is a no-op returning the
    /// existing identifier; the first metadata wins.
    async fn put(&self, bytes: Vec<u8>, meta: DocumentMeta) -> Result<DocumentId, TranslateError>;

    /// Fetch a document, or `DocumentNotFound`.
    async fn get(&self, id: &DocumentId) -> Result<StoredDocument, TranslateError>;

    /// Metadata only, without copying the bytes.
    async fn metadata(&self, id: &DocumentId) -> Result<DocumentMeta, TranslateError>;

    async fn exists(&self, id: &DocumentId) -> bool;
}
