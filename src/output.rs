//! Output types returned by the conversion entry points.
//!
//! Everything except the PDF bytes themselves serialises to JSON, which is
//! what the CLI prints with `--json`.

use crate::model::SourceFormat;
use crate::pipeline::diagram::DiagramOutcome;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The result of converting one document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The finished PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
    /// Per-diagram results in source order.
    pub diagrams: Vec<DiagramOutcome>,
}

/// Descriptive facts about the produced document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub format: Option<SourceFormat>,
    /// Path or URL the document was read from, when it came from one.
    pub source: Option<String>,
    pub page_count: usize,
    pub pdf_bytes: usize,
}

/// Counters and timings for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub blocks: usize,
    pub images: usize,
    pub images_skipped: usize,
    pub diagrams_found: usize,
    pub diagrams_rendered: usize,
    pub diagrams_failed: usize,
    pub diagram_duration_ms: u64,
    pub compose_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Outcome for one file of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub input: PathBuf,
    /// Written PDF, `None` when the file failed.
    pub output: Option<PathBuf>,
    pub error: Option<String>,
    pub pdf_bytes: usize,
    pub stats: Option<ConversionStats>,
    pub duration_ms: u64,
}

impl FileResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a directory conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileResult>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }
}

static PAGE_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Type\s*/Page\b").unwrap());

/// Count page objects in a PDF byte stream.
///
/// Works on the uncompressed object dictionaries printpdf writes; a PDF that
/// packs its dictionaries into object streams reports zero.
pub fn count_pdf_pages(pdf: &[u8]) -> usize {
    PAGE_OBJECT.find_iter(pdf).count()
}
