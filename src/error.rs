//! Error types for the edgequake-doc2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Doc2PdfError`]: **Fatal**: the document cannot be converted at all
//!   (missing input file, corrupt DOCX container, PDF emission failure).
//!   Returned as `Err(Doc2PdfError)` from the top-level `convert_*`
//!   functions. In batch mode the file is reported and skipped.
//!
//! * [`DiagramError`]: **Non-fatal**: a single Mermaid diagram failed to
//!   render (browser unavailable, wait timed out, engine error). It never
//!   leaves the substitution stage; the diagram is replaced by an inline
//!   marker and recorded in [`crate::pipeline::diagram::DiagramOutcome`].
//!
//! Image problems sit below both: an unresolvable or undecodable image is
//! simply omitted from the layout and logged at `warn`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doc2pdf library.
#[derive(Debug, Error)]
pub enum Doc2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file extension does not map to a supported source format.
    #[error("Unsupported source format for '{path}'\nSupported: .md .markdown .html .htm .txt .docx")]
    UnsupportedFormat { path: PathBuf },

    /// A text source is not valid UTF-8.
    #[error("File '{path}' is not valid UTF-8: {detail}")]
    InvalidEncoding { path: PathBuf, detail: String },

    // ── Source errors ─────────────────────────────────────────────────────
    /// The DOCX container could not be opened or lacks its main part.
    #[error("DOCX '{path}' could not be read: {detail}")]
    InvalidDocx { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The page renderer failed to emit the PDF byte stream.
    #[error("PDF rendering failed: {0}")]
    RenderFailed(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Control flow ──────────────────────────────────────────────────────
    /// The caller cancelled the conversion through its cancellation token.
    #[error("Conversion cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single diagram.
///
/// Absorbed by the substitution stage, which splices the failure marker into
/// the source text in place of the fence.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DiagramError {
    /// The headless session could not be launched (now or on an earlier call).
    #[error("Diagram renderer unavailable: {detail}")]
    SessionUnavailable { detail: String },

    /// The session was explicitly closed before this render.
    #[error("Diagram renderer session is closed")]
    SessionClosed,

    /// The rendered element did not appear within the configured bound.
    #[error("Diagram did not render within {ms}ms")]
    Timeout { ms: u64 },

    /// The engine raised an error while loading, waiting or capturing.
    #[error("Diagram engine error: {detail}")]
    Engine { detail: String },

    /// The rendered PNG could not be persisted as a temporary asset.
    #[error("Failed to write diagram asset '{path}': {detail}")]
    AssetWrite { path: PathBuf, detail: String },
}

impl DiagramError {
    /// Convenience constructor for engine failures carrying any displayable cause.
    pub fn engine(detail: impl std::fmt::Display) -> Self {
        DiagramError::Engine {
            detail: detail.to_string(),
        }
    }
}
