//! Documents: immutable byte artifacts addressed by their content hash.
//!
//! Both uploads and translated outputs are [`StoredDocument`]s. The
//! identifier is the lowercase hex SHA-256 of the bytes, so two identical
//! uploads resolve to the same [`DocumentId`] and the store keeps one copy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TranslateError;

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Content-derived document identifier (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Hash `bytes` into an identifier.
    pub fn for_content(bytes: &[u8]) -> Self {
        DocumentId(format!("{:x}", Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = TranslateError;

    /// Parse a caller-supplied identifier. Anything that is not 64 hex
    /// digits cannot name a stored document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(DocumentId(s))
        } else {
            Err(TranslateError::InvalidId(s))
        }
    }
}

/// Kind of document the pipeline accepts.
///
/// There is exactly one allowed kind; the enum exists so the declared kind
/// of an upload is parsed once at the boundary and carried as a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    #[default]
    Pdf,
}

impl DocumentKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
        }
    }

    /// Parse a declared kind: a short name (`pdf`), a MIME type
    /// (`application/pdf`, parameters ignored) or a file extension (`.pdf`).
    pub fn from_declared(declared: &str) -> Result<Self, TranslateError> {
        let normalized = declared
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();

        match normalized.as_str() {
            "pdf" | "application/pdf" | "application/x-pdf" => Ok(DocumentKind::Pdf),
            _ => Err(TranslateError::UnsupportedType {
                declared: declared.to_string(),
            }),
        }
    }

    /// Guess the kind from a file name using its extension.
    pub fn from_file_name(name: &str) -> Result<Self, TranslateError> {
        match mime_guess::from_path(name).first() {
            Some(mime) => Self::from_declared(mime.essence_str()),
            None => Err(TranslateError::UnsupportedType {
                declared: name.to_string(),
            }),
        }
    }

    /// Check that `bytes` actually look like this kind.
    pub fn matches_content(&self, bytes: &[u8]) -> bool {
        match self {
            DocumentKind::Pdf => bytes.starts_with(PDF_MAGIC),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Descriptive metadata stored next to the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    /// Display name, e.g. the uploaded file name.
    pub name: String,
    pub kind: DocumentKind,
    /// Filled in by the store from the actual content length.
    #[serde(default)]
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// Source document this artifact was translated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<DocumentId>,
    /// Language of a translated artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl DocumentMeta {
    /// Metadata for a caller upload.
    pub fn upload(name: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: 0,
            created_at: Utc::now(),
            derived_from: None,
            language: None,
        }
    }

    /// Metadata for the translation of `source` into `language`.
    ///
    /// `report.pdf` translated to `fr` is named `report.fr.pdf`.
    pub fn translation_of(source: &DocumentId, source_meta: &DocumentMeta, language: &str) -> Self {
        let stem = source_meta
            .name
            .strip_suffix(&format!(".{}", source_meta.kind.extension()))
            .unwrap_or(&source_meta.name);
        Self {
            name: format!("{stem}.{language}.{}", source_meta.kind.extension()),
            kind: source_meta.kind,
            size: 0,
            created_at: Utc::now(),
            derived_from: Some(source.clone()),
            language: Some(language.to_string()),
        }
    }
}

/// A stored document: bytes plus metadata. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub meta: DocumentMeta,
    pub bytes: Vec<u8>,
}
