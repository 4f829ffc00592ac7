//! Integration tests for the conversion facade.
//!
//! Diagrams are rendered by an in-process stub unless `E2E_ENABLED` is set,
//! in which case the live Chromium test at the bottom also runs:
//!   E2E_ENABLED=1 cargo test --test conversion -- --nocapture

use async_trait::async_trait;
use edgequake_doc2pdf::{
    compose_docx, compose_html, compose_markdown, convert_directory, convert_docx,
    convert_file, convert_markdown, convert_text, convert_to_file, ConversionConfig,
    ConversionProgressCallback, DiagramError, DiagramOutcome, DiagramRenderer, Doc2PdfError,
    LayoutBlock, SourceFormat, TableCell,
};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Renders a small PNG unless the diagram contains "FAIL"; records the
/// diagram sources in call order.
#[derive(Default)]
struct StubRenderer {
    calls: Mutex<Vec<String>>,
    cancel_on_render: Option<CancellationToken>,
}

#[async_trait]
impl DiagramRenderer for StubRenderer {
    async fn render(&self, source: &str) -> Result<Vec<u8>, DiagramError> {
        self.calls.lock().unwrap().push(source.to_string());
        if let Some(ref token) = self.cancel_on_render {
            token.cancel();
        }
        if source.contains("FAIL") {
            return Err(DiagramError::Engine {
                detail: "syntax error".into(),
            });
        }
        Ok(png(8, 6))
    }
}

fn config_with(renderer: Arc<StubRenderer>, asset_dir: &Path) -> ConversionConfig {
    ConversionConfig::builder()
        .diagram_renderer(renderer)
        .diagram_asset_dir(asset_dir)
        .build()
        .unwrap()
}

fn no_diagrams() -> ConversionConfig {
    ConversionConfig::builder()
        .diagrams_enabled(false)
        .build()
        .unwrap()
}

fn write_docx(path: &Path, document_xml: &str) {
    let mut file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(&mut file);
    zip.start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(document_xml.as_bytes()).unwrap();
    zip.finish().unwrap();
}

fn docx_body(inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>{inner}</w:body>
</w:document>"#
    )
}

// ── Source formats ───────────────────────────────────────────────────────────

#[tokio::test]
async fn markdown_document_to_pdf() {
    let md = "# Release notes\n\nShipped the **new** parser.\n\n- faster\n- smaller\n\n\
              | Name | Qty |\n|------|-----|\n| a | 1 |\n";
    let output = convert_markdown(md, Some("Notes"), None, &no_diagrams())
        .await
        .unwrap();

    assert!(is_pdf(&output.pdf));
    assert_eq!(output.metadata.title, "Notes");
    assert_eq!(output.metadata.format, Some(SourceFormat::Markdown));
    assert_eq!(output.metadata.page_count, 1);
    assert_eq!(output.metadata.pdf_bytes, output.pdf.len());
    // heading, paragraph, two list items, table
    assert_eq!(output.stats.blocks, 5);
    assert_eq!(output.stats.diagrams_found, 0);
}

#[tokio::test]
async fn markdown_emphasis_is_flattened() {
    let blocks = compose_markdown("# Title\n\nHello **world**", None, &no_diagrams())
        .await
        .unwrap();
    assert_eq!(
        blocks,
        vec![
            LayoutBlock::heading(1, "Title"),
            LayoutBlock::paragraph("Hello world"),
        ]
    );
}

#[tokio::test]
async fn html_table_header_flags() {
    let html = "<table><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr></table>";
    let blocks = compose_html(html, None, &no_diagrams()).await.unwrap();
    assert_eq!(
        blocks,
        vec![LayoutBlock::Table {
            columns: 2,
            rows: vec![
                vec![TableCell::new("A", true), TableCell::new("B", true)],
                vec![TableCell::new("1", false), TableCell::new("2", false)],
            ],
        }]
    );
}

#[tokio::test]
async fn html_document_composes_in_reading_order() {
    let html = r#"<html><head><title>ignored</title><style>p{}</style></head>
        <body><div><h2>Intro</h2><p>First</p></div><section><p>Second</p></section></body></html>"#;
    let blocks = compose_html(html, None, &no_diagrams()).await.unwrap();
    assert_eq!(
        blocks,
        vec![
            LayoutBlock::heading(2, "Intro"),
            LayoutBlock::paragraph("First"),
            LayoutBlock::paragraph("Second"),
        ]
    );
}

#[tokio::test]
async fn pathologically_nested_html_still_composes() {
    let n = 10_000;
    let html = format!("{}deep{}", "<div>".repeat(n), "</div>".repeat(n));
    let blocks = compose_html(&html, None, &no_diagrams()).await.unwrap();
    assert_eq!(blocks, vec![LayoutBlock::paragraph("deep")]);
}

#[tokio::test]
async fn text_document_keeps_line_breaks() {
    let output = convert_text("line one\nline two\n", None, &no_diagrams())
        .await
        .unwrap();
    assert!(is_pdf(&output.pdf));
    assert_eq!(output.metadata.title, "Generated PDF");
    assert_eq!(output.stats.blocks, 1);
}

#[tokio::test]
async fn docx_document_with_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.docx");
    write_docx(
        &path,
        &docx_body(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Quarterly</w:t></w:r></w:p>
<w:p><w:r><w:t>All good.</w:t></w:r></w:p>
<w:tbl><w:tr><w:trPr><w:tblHeader/></w:trPr><w:tc><w:p><w:r><w:t>Item</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>Widgets</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        ),
    );

    let blocks = compose_docx(&path, &no_diagrams()).await.unwrap();
    assert_eq!(
        blocks,
        vec![
            LayoutBlock::heading(1, "Quarterly"),
            LayoutBlock::paragraph("All good."),
            LayoutBlock::Table {
                columns: 1,
                rows: vec![
                    vec![TableCell::new("Item", true)],
                    vec![TableCell::new("Widgets", false)],
                ],
            },
        ]
    );

    let output = convert_docx(&path, Some("Q3"), &no_diagrams()).await.unwrap();
    assert!(is_pdf(&output.pdf));
    assert_eq!(output.metadata.format, Some(SourceFormat::Docx));
}

#[tokio::test]
async fn invalid_docx_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.docx");
    std::fs::write(&path, b"not a zip").unwrap();
    let err = convert_docx(&path, None, &no_diagrams()).await.unwrap_err();
    assert!(matches!(err, Doc2PdfError::InvalidDocx { .. }));
}

#[tokio::test]
async fn file_title_defaults_to_stem_and_can_be_forced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meeting-notes.md");
    std::fs::write(&path, "hello").unwrap();
    let input = path.to_string_lossy().into_owned();

    let output = convert_file(&input, &no_diagrams()).await.unwrap();
    assert_eq!(output.metadata.title, "meeting-notes");
    assert_eq!(output.metadata.source.as_deref(), Some(input.as_str()));

    let forced = ConversionConfig::builder()
        .diagrams_enabled(false)
        .title("Minutes")
        .build()
        .unwrap();
    let output = convert_file(&input, &forced).await.unwrap();
    assert_eq!(output.metadata.title, "Minutes");
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    std::fs::write(&path, "a,b").unwrap();
    let err = convert_file(path.to_string_lossy(), &no_diagrams())
        .await
        .unwrap_err();
    assert!(matches!(err, Doc2PdfError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn composing_twice_is_identical() {
    let md = "# A\n\nsome *text*\n\n1. one\n2. two\n";
    let config = no_diagrams();
    let first = compose_markdown(md, None, &config).await.unwrap();
    let second = compose_markdown(md, None, &config).await.unwrap();
    assert_eq!(first, second);
}

// ── Diagrams ─────────────────────────────────────────────────────────────────

const THREE_DIAGRAMS: &str = "Intro\n\n\
```mermaid\ngraph TD; A-->B\n```\n\n\
```mermaid\nFAIL here\n```\n\n\
```mermaid\ngraph LR; C-->D\n```\n\n\
End\n";

#[tokio::test]
async fn diagrams_render_last_to_first_and_failures_stay_local() {
    let assets = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubRenderer::default());
    let config = config_with(stub.clone(), assets.path());

    let output = convert_markdown(THREE_DIAGRAMS, None, None, &config)
        .await
        .unwrap();

    assert_eq!(
        *stub.calls.lock().unwrap(),
        vec!["graph LR; C-->D", "FAIL here", "graph TD; A-->B"]
    );
    assert_eq!(output.stats.diagrams_found, 3);
    assert_eq!(output.stats.diagrams_rendered, 2);
    assert_eq!(output.stats.diagrams_failed, 1);
    assert_eq!(output.stats.images, 2);

    let indexes: Vec<(usize, bool)> = output
        .diagrams
        .iter()
        .map(|o| match o {
            DiagramOutcome::Rendered { index, path } => {
                assert!(path.starts_with(assets.path()));
                assert!(path.exists());
                (*index, true)
            }
            DiagramOutcome::Failed { index, .. } => (*index, false),
        })
        .collect();
    assert_eq!(indexes, vec![(0, true), (1, false), (2, true)]);
}

#[tokio::test]
async fn failed_diagram_becomes_inline_marker() {
    let assets = tempfile::tempdir().unwrap();
    let config = config_with(Arc::new(StubRenderer::default()), assets.path());

    let blocks = compose_markdown(THREE_DIAGRAMS, None, &config).await.unwrap();
    let kinds: Vec<&str> = blocks.iter().map(LayoutBlock::kind).collect();
    assert_eq!(kinds, vec!["paragraph", "image", "paragraph", "image", "paragraph"]);
    assert_eq!(
        blocks[2],
        LayoutBlock::paragraph("[Mermaid diagram could not be rendered]")
    );
    let fence_left = blocks.iter().any(|b| match b {
        LayoutBlock::Paragraph { text } => text.contains("```") || text.contains("mermaid"),
        _ => false,
    });
    assert!(!fence_left);
}

#[tokio::test]
async fn disabled_diagrams_leave_fences_as_code() {
    let stub = Arc::new(StubRenderer::default());
    let config = ConversionConfig::builder()
        .diagrams_enabled(false)
        .diagram_renderer(stub.clone())
        .build()
        .unwrap();

    let blocks = compose_markdown("```mermaid\ngraph TD; A-->B\n```\n", None, &config)
        .await
        .unwrap();
    assert!(stub.calls.lock().unwrap().is_empty());
    assert_eq!(blocks, vec![LayoutBlock::paragraph("graph TD; A-->B")]);
}

#[tokio::test]
async fn html_fences_are_not_substituted() {
    let stub = Arc::new(StubRenderer::default());
    let assets = tempfile::tempdir().unwrap();
    let config = config_with(stub.clone(), assets.path());

    compose_html("<pre>```mermaid\ngraph TD; A-->B\n```</pre>", None, &config)
        .await
        .unwrap();
    assert!(stub.calls.lock().unwrap().is_empty());
}

// ── Images ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn relative_and_percent_encoded_image_paths() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plain.png"), png(3, 3)).unwrap();
    std::fs::write(dir.path().join("with space.png"), png(5, 5)).unwrap();

    let html = r#"<img src="plain.png"><img src="with%20space.png"><img src="missing.png">"#;
    let blocks = compose_html(html, Some(dir.path()), &no_diagrams())
        .await
        .unwrap();
    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| matches!(b, LayoutBlock::Image { .. })));
}

#[tokio::test]
async fn skipped_images_are_counted() {
    let output = convert_markdown("![gone](nowhere.png)\n\ntext\n", None, None, &no_diagrams())
        .await
        .unwrap();
    assert_eq!(output.stats.images, 0);
    assert_eq!(output.stats.images_skipped, 1);
    assert_eq!(output.stats.blocks, 1);
}

#[tokio::test]
async fn svg_canvas_is_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let svg = |w: u32, h: u32| {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}"><rect width="{w}" height="{h}" fill="red"/></svg>"#
        )
    };
    std::fs::write(dir.path().join("tiny.svg"), svg(10, 10)).unwrap();
    std::fs::write(dir.path().join("wide.svg"), svg(5000, 300)).unwrap();

    let blocks = compose_html(
        r#"<img src="tiny.svg"><img src="wide.svg">"#,
        Some(dir.path()),
        &no_diagrams(),
    )
    .await
    .unwrap();

    let dims: Vec<(u32, u32)> = blocks
        .iter()
        .map(|b| match b {
            LayoutBlock::Image { data } => {
                let img = image::load_from_memory(data).unwrap();
                (img.width(), img.height())
            }
            other => panic!("expected image, got {other:?}"),
        })
        .collect();
    assert_eq!(dims, vec![(200, 150), (2000, 300)]);
}

// ── Output files and batches ─────────────────────────────────────────────────

#[tokio::test]
async fn convert_to_file_writes_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("doc.md");
    std::fs::write(&input, "# Title\n\nBody").unwrap();
    let output_path = dir.path().join("out/nested/doc.pdf");

    let output = convert_to_file(input.to_string_lossy(), &output_path, &no_diagrams())
        .await
        .unwrap();
    let written = std::fs::read(&output_path).unwrap();
    assert_eq!(written, output.pdf);
    assert!(!output_path.with_extension("pdf.tmp").exists());
}

#[tokio::test]
async fn cancellation_during_diagrams_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("doc.md");
    std::fs::write(&input, "```mermaid\ngraph TD; A-->B\n```\n").unwrap();
    let output_path = dir.path().join("doc.pdf");

    let token = CancellationToken::new();
    let stub = Arc::new(StubRenderer {
        cancel_on_render: Some(token.clone()),
        ..Default::default()
    });
    let config = ConversionConfig::builder()
        .diagram_renderer(stub)
        .diagram_asset_dir(dir.path())
        .cancellation_token(token)
        .build()
        .unwrap();

    let err = convert_to_file(input.to_string_lossy(), &output_path, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, Doc2PdfError::Cancelled));
    assert!(!output_path.exists());
    assert!(!output_path.with_extension("pdf.tmp").exists());
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl ConversionProgressCallback for RecordingProgress {
    fn on_batch_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }
    fn on_file_complete(&self, index: usize, _total: usize, _pdf_bytes: usize) {
        self.events.lock().unwrap().push(format!("ok {index}"));
    }
    fn on_file_error(&self, index: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {index}"));
    }
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total}"));
    }
}

#[tokio::test]
async fn batch_continues_past_a_bad_file() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("a.md"), "# A").unwrap();
    std::fs::write(input.path().join("b.docx"), b"garbage").unwrap();
    std::fs::write(input.path().join("c.txt"), "plain").unwrap();
    std::fs::write(input.path().join("d.png"), png(2, 2)).unwrap();

    let progress = Arc::new(RecordingProgress::default());
    let config = ConversionConfig::builder()
        .diagrams_enabled(false)
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let report = convert_directory(input.path(), output.path(), &config)
        .await
        .unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    let failed = report.files.iter().find(|f| !f.is_success()).unwrap();
    assert!(failed.input.ends_with("b.docx"));
    assert!(failed.error.as_deref().unwrap().contains("could not be read"));

    assert!(output.path().join("a.pdf").exists());
    assert!(output.path().join("c.pdf").exists());
    assert!(!output.path().join("b.pdf").exists());

    assert_eq!(
        *progress.events.lock().unwrap(),
        vec!["start 3", "ok 1", "err 2", "ok 3", "done 2/3"]
    );
}

// ── Live browser ─────────────────────────────────────────────────────────────

#[cfg(feature = "chromium")]
#[tokio::test]
async fn live_chromium_renders_mermaid() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run the live browser test");
        return;
    }
    let assets = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .diagram_asset_dir(assets.path())
        .diagram_timeout_ms(30_000)
        .build()
        .unwrap();

    let output = convert_markdown(
        "# Flow\n\n```mermaid\ngraph TD; Start-->Stop\n```\n",
        None,
        None,
        &config,
    )
    .await
    .unwrap();
    edgequake_doc2pdf::shutdown_shared_session().await;

    println!("diagrams: {:?}", output.diagrams);
    assert_eq!(output.stats.diagrams_rendered, 1);
    assert_eq!(output.stats.images, 1);
}
