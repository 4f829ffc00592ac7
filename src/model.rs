//! Core data model shared by every pipeline stage.
//!
//! A conversion starts from a [`SourceDocument`] and ends with an ordered
//! `Vec<LayoutBlock>` that the page renderer turns into PDF bytes. The block
//! order is the document reading order and is never changed after the
//! composer has produced it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Embedded image bytes keyed by an opaque identifier, scoped to one run.
///
/// Populated by the DOCX extractor, where every key is a fresh UUID that is
/// also written into the `<img src>` of the generated markup.
pub type AssetMap = HashMap<String, Vec<u8>>;

/// The markup family of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Markdown,
    Html,
    Text,
    Docx,
}

impl SourceFormat {
    /// Every file extension handled by batch mode, lower-case, without dot.
    pub const EXTENSIONS: &'static [&'static str] =
        &["md", "markdown", "html", "htm", "txt", "text", "docx"];

    /// Map a file extension (case-insensitive, no dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(SourceFormat::Markdown),
            "html" | "htm" => Some(SourceFormat::Html),
            "txt" | "text" => Some(SourceFormat::Text),
            "docx" => Some(SourceFormat::Docx),
            _ => None,
        }
    }

    /// Detect the format of a path from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceFormat::Markdown => "markdown",
            SourceFormat::Html => "html",
            SourceFormat::Text => "text",
            SourceFormat::Docx => "docx",
        };
        f.write_str(s)
    }
}

/// Raw textual content plus its format tag.
///
/// For [`SourceFormat::Docx`] the content is the path of the `.docx` file;
/// the container is binary and is read through [`crate::convert::convert_docx`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub content: String,
    pub format: SourceFormat,
    pub title: Option<String>,
}

impl SourceDocument {
    pub fn new(content: impl Into<String>, format: SourceFormat) -> Self {
        Self {
            content: content.into(),
            format,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// One cell of a [`LayoutBlock::Table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    /// Cell came from a `th` element and renders in bold.
    pub is_header: bool,
}

impl TableCell {
    pub fn new(text: impl Into<String>, is_header: bool) -> Self {
        Self {
            text: text.into(),
            is_header,
        }
    }
}

/// One semantic unit of paginated output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutBlock {
    /// A level 1–3 heading.
    Heading { level: u8, text: String },
    Paragraph { text: String },
    ListItem { text: String },
    /// `columns` is the cell count of the first row; later rows may differ.
    Table {
        columns: usize,
        rows: Vec<Vec<TableCell>>,
    },
    /// Normalised raster bytes (PNG, or JPEG passed through).
    Image {
        #[serde(skip)]
        data: Vec<u8>,
    },
}

impl LayoutBlock {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        LayoutBlock::Heading {
            level,
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        LayoutBlock::Paragraph { text: text.into() }
    }

    pub fn list_item(text: impl Into<String>) -> Self {
        LayoutBlock::ListItem { text: text.into() }
    }

    /// Short kind name used in logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            LayoutBlock::Heading { .. } => "heading",
            LayoutBlock::Paragraph { .. } => "paragraph",
            LayoutBlock::ListItem { .. } => "list_item",
            LayoutBlock::Table { .. } => "table",
            LayoutBlock::Image { .. } => "image",
        }
    }
}
