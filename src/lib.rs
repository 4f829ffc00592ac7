//! # edgequake-doc2pdf
//!
//! Convert Markdown, HTML, DOCX and plain text into paginated PDF, rendering
//! embedded Mermaid diagrams through a headless browser on the way.
//!
//! ## Why this crate?
//!
//! Documentation repositories mix Markdown, exported HTML and Word files, and
//! Markdown often carries ```` ```mermaid ```` fences that plain converters
//! print as code. This crate renders each diagram to a PNG, splices it back
//! into the source, and lays everything out as one fixed-format PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Diagrams  Mermaid fences → PNG via headless Chrome (Markdown only)
//!  ├─ 3. Markup    Markdown/HTML/text/DOCX → HTML-like node tree
//!  ├─ 4. Compose   tree → headings, paragraphs, lists, tables, images
//!  ├─ 5. Fit       text made printable with the builtin PDF fonts
//!  └─ 6. Render    paginated PDF via printpdf (CPU-bound, spawn_blocking)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2pdf::{convert_to_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let output = convert_to_file("notes.md", "notes.pdf", &config).await?;
//!     eprintln!("{} pages, {} diagrams rendered",
//!         output.metadata.page_count,
//!         output.stats.diagrams_rendered);
//!     edgequake_doc2pdf::shutdown_shared_session().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cli`      | on      | Enables the `doc2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `chromium` | on      | Renders Mermaid diagrams with a local Chrome/Chromium via chromiumoxide |
//!
//! Without `chromium` every diagram becomes an inline failure marker unless a
//! custom [`DiagramRenderer`] is injected:
//! ```toml
//! edgequake-doc2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, DiagramOptions, PageConfig, PageSize,
    DEFAULT_MERMAID_URL, DEFAULT_TITLE,
};
pub use convert::{
    compose_docx, compose_document, compose_html, compose_markdown, compose_text, convert_bytes,
    convert_directory, convert_docx, convert_document, convert_file, convert_html,
    convert_markdown, convert_sync, convert_text, convert_to_file, convert_to_writer,
};
pub use error::{DiagramError, Doc2PdfError};
pub use model::{AssetMap, LayoutBlock, SourceDocument, SourceFormat, TableCell};
pub use output::{BatchReport, ConversionOutput, ConversionStats, DocumentMetadata, FileResult};
pub use pipeline::diagram::{DiagramOutcome, Substitution};
pub use pipeline::normalize::SvgSizePolicy;
pub use pipeline::render::{PageRenderer, PrintPdfRenderer};
pub use pipeline::session::{
    default_renderer, shutdown_shared_session, DiagramRenderer, RenderSession,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_directory_stream, FileStream};
