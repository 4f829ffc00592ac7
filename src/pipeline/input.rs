//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! ## Why download to a temp file?
//!
//! The DOCX extractor needs a seekable file and the composer resolves relative
//! image references against the source's directory. Downloading to a
//! `TempDir` gives every input a real path, and cleanup happens automatically
//! when `ResolvedInput` is dropped.

use crate::error::Doc2PdfError;
use crate::model::SourceFormat;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the document was downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the document regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    /// Source format from the resolved file's extension.
    pub fn format(&self) -> Result<SourceFormat, Doc2PdfError> {
        let path = self.path();
        SourceFormat::from_path(path).ok_or_else(|| Doc2PdfError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }

    /// Title derived from the file stem.
    pub fn title(&self) -> Option<String> {
        self.path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a readable local file.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Doc2PdfError> {
    if input.trim().is_empty() {
        return Err(Doc2PdfError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, Doc2PdfError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Doc2PdfError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(Doc2PdfError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Doc2PdfError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Doc2PdfError::FileNotFound { path });
        }
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Doc2PdfError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Doc2PdfError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Doc2PdfError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Doc2PdfError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Doc2PdfError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = extract_filename(url, content_type.as_deref());

    let temp_dir = TempDir::new().map_err(|e| Doc2PdfError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            Doc2PdfError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Doc2PdfError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Doc2PdfError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Pick a filename for a download: the URL's last path segment when it has
/// a supported extension, otherwise a name derived from the content type.
fn extract_filename(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                let decoded = urlencoding::decode(last)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| last.to_string());
                if SourceFormat::from_path(Path::new(&decoded)).is_some() {
                    return decoded;
                }
            }
        }
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());
    let ext = match mime.as_deref() {
        Some("text/markdown") | Some("text/x-markdown") => "md",
        Some("text/plain") => "txt",
        Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document") => "docx",
        _ => "html",
    };
    format!("downloaded.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.md"));
        assert!(is_url("http://example.com/doc.md"));
        assert!(!is_url("/tmp/doc.md"));
        assert!(!is_url("doc.md"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_extract_filename_from_path() {
        assert_eq!(extract_filename("https://x.org/a/notes.md", None), "notes.md");
        assert_eq!(
            extract_filename("https://x.org/my%20report.docx?dl=1", None),
            "my report.docx"
        );
    }

    #[test]
    fn test_extract_filename_from_content_type() {
        assert_eq!(
            extract_filename("https://x.org/page", Some("text/html; charset=utf-8")),
            "downloaded.html"
        );
        assert_eq!(
            extract_filename("https://x.org/raw", Some("text/markdown")),
            "downloaded.md"
        );
        assert_eq!(extract_filename("https://x.org/", None), "downloaded.html");
    }

    #[tokio::test]
    async fn test_resolve_missing_file() {
        let err = resolve_input("/definitely/not/here.md", 5).await.err().unwrap();
        assert!(matches!(err, Doc2PdfError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_empty_input() {
        let err = resolve_input("  ", 5).await.err().unwrap();
        assert!(matches!(err, Doc2PdfError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_resolve_local_and_detect_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Quarterly Report.md");
        std::fs::write(&path, "# Hi").unwrap();

        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.format().unwrap(), SourceFormat::Markdown);
        assert_eq!(resolved.title().as_deref(), Some("Quarterly Report"));
    }

    #[tokio::test]
    async fn test_unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert!(matches!(resolved.format(), Err(Doc2PdfError::UnsupportedFormat { .. })));
    }
}
