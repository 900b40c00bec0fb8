//! Input loading: turn a user-supplied path or URL into upload bytes.
//!
//! Used by the CLI before handing a document to the
//! [`crate::DashboardFacade`]. Both sources are checked for the `%PDF`
//! magic here so a wrong file fails fast with a path in the message rather
//! than as a rejected upload.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::document::{DocumentKind, PDF_MAGIC};
use crate::error::TranslateError;

/// A document read into memory, ready for upload.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    /// File name used as the document's display name.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, TranslateError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

async fn load_local(path: &Path) -> Result<LoadedInput, TranslateError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => TranslateError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => TranslateError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => TranslateError::Storage {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    check_magic(&bytes, &path.display().to_string())?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());
    debug!("Loaded local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedInput { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, TranslateError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| TranslateError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?
        .to_vec();
    check_magic(&bytes, url)?;

    let name = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(LoadedInput { name, bytes })
}

fn check_magic(bytes: &[u8], origin: &str) -> Result<(), TranslateError> {
    if DocumentKind::Pdf.matches_content(bytes) {
        return Ok(());
    }
    let head: String = bytes
        .iter()
        .take(PDF_MAGIC.len())
        .map(|b| if b.is_ascii_graphic() { *b as char } else { '.' })
        .collect();
    Err(TranslateError::UnsupportedType {
        declared: format!("{origin} (starts with '{head}', not a PDF)"),
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// Default output path: `report.pdf` → `report.<lang>.pdf` next to the input.
pub fn default_output_path(input: &str, language: &str) -> PathBuf {
    let name = if is_url(input) {
        filename_from_url(input)
    } else {
        input.to_string()
    };
    let path = PathBuf::from(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let file = format!("{stem}.{language}.pdf");
    match path.parent() {
        Some(dir) if !is_url(input) && !dir.as_os_str().is_empty() => dir.join(file),
        _ => PathBuf::from(file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/papers/a.pdf"), "a.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[test]
    fn output_path_defaults() {
        assert_eq!(
            default_output_path("docs/report.pdf", "fr"),
            PathBuf::from("docs/report.fr.pdf")
        );
        assert_eq!(default_output_path("report.pdf", "de"), PathBuf::from("report.de.pdf"));
        assert_eq!(
            default_output_path("https://x.org/papers/a.pdf", "es"),
            PathBuf::from("a.es.pdf")
        );
    }

    #[tokio::test]
    async fn local_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        let loaded = load_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(loaded.name, "paper.pdf");
        assert_eq!(loaded.bytes, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn missing_file() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, TranslateError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello world").unwrap();

        let err = load_input(path.to_str().unwrap(), 5).await.unwrap_err();
        match err {
            TranslateError::UnsupportedType { declared } => assert!(declared.contains("hell")),
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }
}
