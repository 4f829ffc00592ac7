//! Eager (whole-document) conversion entry points.
//!
//! ## Pipeline
//!
//! ```text
//! source ──▶ diagrams ──▶ markup ──▶ compose ──▶ textfit ──▶ render
//!           (Markdown)   (→ tree)   (→ blocks)   (ASCII)    (printpdf)
//! ```
//!
//! Every entry point funnels into the same two stages: `compose_source`
//! turns a source into layout blocks, and `finish` fits and renders them.
//! One document runs strictly sequentially; diagrams are rendered one at a
//! time. Use [`crate::stream::convert_directory_stream`] for directories.

use crate::config::ConversionConfig;
use crate::error::Doc2PdfError;
use crate::model::{AssetMap, LayoutBlock, SourceDocument, SourceFormat};
use crate::output::{count_pdf_pages, BatchReport, ConversionOutput, ConversionStats, DocumentMetadata};
use crate::pipeline::compose::Composer;
use crate::pipeline::diagram::{self, DiagramOutcome};
use crate::pipeline::render::{self, PageRenderer, PrintPdfRenderer};
use crate::pipeline::{docx, input, markup, session, textfit};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Source markup handed to the pipeline.
enum Source {
    Markdown(String),
    Html(String),
    Text(String),
    Docx(PathBuf),
}

impl Source {
    fn format(&self) -> SourceFormat {
        match self {
            Source::Markdown(_) => SourceFormat::Markdown,
            Source::Html(_) => SourceFormat::Html,
            Source::Text(_) => SourceFormat::Text,
            Source::Docx(_) => SourceFormat::Docx,
        }
    }

    fn from_document(doc: &SourceDocument) -> Self {
        match doc.format {
            SourceFormat::Markdown => Source::Markdown(doc.content.clone()),
            SourceFormat::Html => Source::Html(doc.content.clone()),
            SourceFormat::Text => Source::Text(doc.content.clone()),
            SourceFormat::Docx => Source::Docx(PathBuf::from(&doc.content)),
        }
    }
}

/// Blocks plus what the stats need to know about how they were made.
struct Composed {
    blocks: Vec<LayoutBlock>,
    diagrams: Vec<DiagramOutcome>,
    images_skipped: usize,
    diagram_duration_ms: u64,
    compose_duration_ms: u64,
}

// ── Conversion entry points ──────────────────────────────────────────────

/// Convert Markdown text to PDF.
///
/// Mermaid fences are rendered first unless diagrams are disabled; relative
/// image paths resolve against `base_path`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2pdf::{convert_markdown, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::builder().diagrams_enabled(false).build()?;
/// let output = convert_markdown("# Hello\n\nWorld", Some("Hello"), None, &config).await?;
/// std::fs::write("hello.pdf", &output.pdf)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_markdown(
    markdown: &str,
    title: Option<&str>,
    base_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    run(Source::Markdown(markdown.to_string()), title, base_path, None, config).await
}

/// Convert an HTML document or fragment to PDF.
pub async fn convert_html(
    html: &str,
    title: Option<&str>,
    base_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    run(Source::Html(html.to_string()), title, base_path, None, config).await
}

/// Convert plain text to PDF; line breaks are kept.
pub async fn convert_text(
    text: &str,
    title: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    run(Source::Text(text.to_string()), title, None, None, config).await
}

/// Convert a `.docx` file to PDF, embedded images included.
pub async fn convert_docx(
    path: impl AsRef<Path>,
    title: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    let path = path.as_ref();
    let base = path.parent().map(Path::to_path_buf);
    let origin = Some(path.display().to_string());
    run(Source::Docx(path.to_path_buf()), title, base.as_deref(), origin, config).await
}

/// Convert an already loaded [`SourceDocument`].
pub async fn convert_document(
    doc: &SourceDocument,
    base_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    run(Source::from_document(doc), doc.title.as_deref(), base_path, None, config).await
}

/// Convert a file or HTTP(S) URL, choosing the pipeline from its extension.
///
/// The title is [`ConversionConfig::title`] when set, else the file stem;
/// relative images resolve against the file's directory.
///
/// # Errors
/// Fatal errors only: unreadable or unsupported input, invalid DOCX, PDF
/// emission failure, cancellation. Diagram and image problems are reported
/// in the output instead.
pub async fn convert_file(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    // `resolved` owns any download directory; keep it alive until the end.
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let path = resolved.path().to_path_buf();
    let format = resolved.format()?;
    let title = config.title.clone().or_else(|| resolved.title());
    let base = path.parent().map(Path::to_path_buf);

    // ── Step 2: Load source ──────────────────────────────────────────────
    let source = match format {
        SourceFormat::Docx => Source::Docx(path.clone()),
        SourceFormat::Markdown => Source::Markdown(read_text(&path).await?),
        SourceFormat::Html => Source::Html(read_text(&path).await?),
        SourceFormat::Text => Source::Text(read_text(&path).await?),
    };
    debug!("Detected {} source: {}", format, path.display());

    let output = run(
        source,
        title.as_deref(),
        base.as_deref(),
        Some(input_str.to_string()),
        config,
    )
    .await?;
    drop(resolved);
    Ok(output)
}

/// Convert in-memory bytes of the given format.
///
/// DOCX bytes are written to a managed [`tempfile`] that is removed on
/// return; text formats must be UTF-8.
pub async fn convert_bytes(
    bytes: &[u8],
    format: SourceFormat,
    title: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    if format == SourceFormat::Docx {
        let mut tmp = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .map_err(|e| Doc2PdfError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| Doc2PdfError::Internal(format!("tempfile write: {e}")))?;
        // `tmp` is dropped (and the file deleted) when the conversion returns
        return run(Source::Docx(tmp.path().to_path_buf()), title, None, None, config).await;
    }

    let text = String::from_utf8(bytes.to_vec()).map_err(|e| Doc2PdfError::InvalidEncoding {
        path: PathBuf::from("<memory>"),
        detail: e.to_string(),
    })?;
    let doc = SourceDocument {
        content: text,
        format,
        title: title.map(str::to_string),
    };
    convert_document(&doc, None, config).await
}

/// Convert a file or URL and write the PDF to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. A
/// cancellation observed before the rename removes the temp file, so a
/// cancelled conversion never leaves an output behind.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    let output = convert_file(input_str, config).await?;
    let path = output_path.as_ref();
    write_atomic(path, &output.pdf, config).await?;
    info!("Wrote {} ({} bytes)", path.display(), output.pdf.len());
    Ok(output)
}

/// Convert a file or URL and stream the PDF into `writer`.
pub async fn convert_to_writer<W>(
    input_str: impl AsRef<str>,
    writer: &mut W,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let output = convert_file(input_str, config).await?;
    config.check_cancelled()?;
    let write_err = |e| Doc2PdfError::OutputWriteFailed {
        path: PathBuf::from("<writer>"),
        source: e,
    };
    writer.write_all(&output.pdf).await.map_err(write_err)?;
    writer.flush().await.map_err(write_err)?;
    Ok(output)
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_file(input_str, config))
}

/// Convert every supported file in `input_dir` into `output_dir`.
///
/// Files are converted one after another; a failed file is recorded in the
/// report and the batch continues. `output_dir` is created if missing.
pub async fn convert_directory(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchReport, Doc2PdfError> {
    let start = Instant::now();
    let stream = crate::stream::convert_directory_stream(input_dir, output_dir, config).await?;
    let files = stream.collect::<Vec<_>>().await;
    let report = BatchReport {
        files,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Batch complete: {}/{} files converted in {}ms",
        report.succeeded(),
        report.total(),
        report.duration_ms
    );
    Ok(report)
}

// ── Compose-only entry points ────────────────────────────────────────────

/// Compose Markdown into layout blocks without rendering a PDF.
///
/// Diagram substitution still runs, so rendered diagrams appear as image
/// blocks.
pub async fn compose_markdown(
    markdown: &str,
    base_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<Vec<LayoutBlock>, Doc2PdfError> {
    Ok(compose_source(Source::Markdown(markdown.to_string()), base_path, config)
        .await?
        .blocks)
}

/// Compose HTML into layout blocks.
pub async fn compose_html(
    html: &str,
    base_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<Vec<LayoutBlock>, Doc2PdfError> {
    Ok(compose_source(Source::Html(html.to_string()), base_path, config)
        .await?
        .blocks)
}

/// Compose plain text into layout blocks.
pub async fn compose_text(text: &str, config: &ConversionConfig) -> Result<Vec<LayoutBlock>, Doc2PdfError> {
    Ok(compose_source(Source::Text(text.to_string()), None, config)
        .await?
        .blocks)
}

/// Compose a `.docx` file into layout blocks.
pub async fn compose_docx(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<Vec<LayoutBlock>, Doc2PdfError> {
    let path = path.as_ref();
    let base = path.parent().map(Path::to_path_buf);
    Ok(compose_source(Source::Docx(path.to_path_buf()), base.as_deref(), config)
        .await?
        .blocks)
}

/// Compose a [`SourceDocument`] into layout blocks.
pub async fn compose_document(
    doc: &SourceDocument,
    base_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<Vec<LayoutBlock>, Doc2PdfError> {
    Ok(compose_source(Source::from_document(doc), base_path, config)
        .await?
        .blocks)
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run(
    source: Source,
    title: Option<&str>,
    base_path: Option<&Path>,
    origin: Option<String>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2PdfError> {
    let total_start = Instant::now();
    let format = source.format();
    let title = resolve_title(title, config);
    info!("Converting {} document '{}'", format, title);

    let composed = compose_source(source, base_path, config).await?;
    finish(composed, title, format, origin, config, total_start).await
}

/// Source → layout blocks: diagrams, markup, tree, composer.
async fn compose_source(
    source: Source,
    base_path: Option<&Path>,
    config: &ConversionConfig,
) -> Result<Composed, Doc2PdfError> {
    config.check_cancelled()?;

    // ── Step 1: Substitute diagrams (Markdown only) ──────────────────────
    let diagram_start = Instant::now();
    let (source, diagrams) = match source {
        Source::Markdown(md) if config.diagrams_enabled => {
            let renderer = config
                .diagram_renderer
                .clone()
                .unwrap_or_else(|| session::default_renderer(&config.diagram));
            let sub = diagram::substitute_diagrams(
                &md,
                renderer.as_ref(),
                &config.diagram,
                config.cancel.as_ref(),
            )
            .await?;
            if let Some(ref cb) = config.progress_callback {
                for outcome in &sub.outcomes {
                    cb.on_diagram(outcome.is_rendered());
                }
            }
            if !sub.outcomes.is_empty() {
                info!(
                    "Diagrams: {} rendered, {} failed",
                    sub.rendered(),
                    sub.failed()
                );
            }
            (Source::Markdown(sub.text), sub.outcomes)
        }
        other => (other, Vec::new()),
    };
    let diagram_duration_ms = diagram_start.elapsed().as_millis() as u64;

    // ── Step 2: Markup → tree → blocks ───────────────────────────────────
    // Blocking: DOCX unzip and image files are read synchronously here.
    let compose_start = Instant::now();
    let base = base_path.map(Path::to_path_buf);
    let policy = config.svg_policy;
    let build = move || -> Result<(Vec<LayoutBlock>, usize), Doc2PdfError> {
        let (html, assets) = match source {
            Source::Markdown(md) => (markup::markdown_to_html(&md), AssetMap::new()),
            Source::Html(html) => (html, AssetMap::new()),
            Source::Text(text) => (markup::text_to_html(&text), AssetMap::new()),
            Source::Docx(path) => docx::extract_docx(&path, &policy)?,
        };
        let root = markup::parse_html(&html);
        let mut composer = Composer::new(&assets, base.as_deref(), &policy);
        let blocks = composer.compose(&root);
        Ok((blocks, composer.skipped_images()))
    };
    let (blocks, images_skipped) = tokio::task::spawn_blocking(build)
        .await
        .map_err(|e| Doc2PdfError::Internal(format!("spawn_blocking panicked: {}", e)))??;
    let compose_duration_ms = compose_start.elapsed().as_millis() as u64;

    debug!(
        "Composed {} blocks in {}ms ({} images skipped)",
        blocks.len(),
        compose_duration_ms,
        images_skipped
    );

    Ok(Composed {
        blocks,
        diagrams,
        images_skipped,
        diagram_duration_ms,
        compose_duration_ms,
    })
}

/// Blocks → PDF: text fitting, page rendering, stats.
async fn finish(
    composed: Composed,
    title: String,
    format: SourceFormat,
    origin: Option<String>,
    config: &ConversionConfig,
    total_start: Instant,
) -> Result<ConversionOutput, Doc2PdfError> {
    // ── Step 3: Fit text to the builtin fonts ────────────────────────────
    let mut blocks = composed.blocks;
    blocks.iter_mut().for_each(textfit::fit_block_text);

    let mut stats = ConversionStats {
        blocks: blocks.len(),
        images: blocks
            .iter()
            .filter(|b| matches!(b, LayoutBlock::Image { .. }))
            .count(),
        images_skipped: composed.images_skipped,
        diagrams_found: composed.diagrams.len(),
        diagrams_rendered: composed.diagrams.iter().filter(|d| d.is_rendered()).count(),
        diagrams_failed: composed.diagrams.iter().filter(|d| !d.is_rendered()).count(),
        diagram_duration_ms: composed.diagram_duration_ms,
        compose_duration_ms: composed.compose_duration_ms,
        ..Default::default()
    };
    if blocks.is_empty() {
        warn!("Document '{}' produced no content; emitting an empty page", title);
    }

    // ── Step 4: Render pages ─────────────────────────────────────────────
    config.check_cancelled()?;
    let renderer = config
        .page_renderer
        .clone()
        .unwrap_or_else(|| Arc::new(PrintPdfRenderer) as Arc<dyn PageRenderer>);
    let render_start = Instant::now();
    let pdf = render::render_pdf(renderer, blocks, config.page.clone(), textfit::fit_text(&title)).await?;
    stats.render_duration_ms = render_start.elapsed().as_millis() as u64;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    let metadata = DocumentMetadata {
        title,
        format: Some(format),
        source: origin,
        page_count: count_pdf_pages(&pdf),
        pdf_bytes: pdf.len(),
    };

    info!(
        "Conversion complete: '{}', {} blocks, {} page(s), {}ms total",
        metadata.title, stats.blocks, metadata.page_count, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        pdf,
        metadata,
        stats,
        diagrams: composed.diagrams,
    })
}

fn resolve_title(explicit: Option<&str>, config: &ConversionConfig) -> String {
    explicit
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| config.default_title.clone())
}

async fn read_text(path: &Path) -> Result<String, Doc2PdfError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Doc2PdfError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Doc2PdfError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    String::from_utf8(bytes).map_err(|e| Doc2PdfError::InvalidEncoding {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub(crate) async fn write_atomic(
    path: &Path,
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<(), Doc2PdfError> {
    let write_err = |e| Doc2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    if config.is_cancelled() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Doc2PdfError::Cancelled);
    }

    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}
