//! PDF emission: layout blocks → paginated PDF bytes via printpdf.
//!
//! ## Two passes
//!
//! Layout runs first and produces a list of draw operations per page; only
//! then is the document emitted. The footer template can reference
//! `{pages}`, which is unknown until every block has been placed.
//!
//! Text is set in the builtin Times faces. Line breaking is greedy and uses an
//! average glyph width, which is close enough for Times at body sizes.
//! [`render_pdf`] runs a renderer inside `spawn_blocking`; emission is pure
//! CPU work.

use crate::config::PageConfig;
use crate::error::Doc2PdfError;
use crate::model::{LayoutBlock, TableCell};
use printpdf::image_crate::{self, DynamicImage, GenericImageView};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfLayerReference, Point, Rgb,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Emits the final artifact from an ordered block list.
pub trait PageRenderer: Send + Sync {
    fn render(
        &self,
        blocks: &[LayoutBlock],
        page: &PageConfig,
        title: &str,
    ) -> Result<Vec<u8>, Doc2PdfError>;
}

/// Default renderer backed by printpdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintPdfRenderer;

impl PageRenderer for PrintPdfRenderer {
    fn render(
        &self,
        blocks: &[LayoutBlock],
        page: &PageConfig,
        title: &str,
    ) -> Result<Vec<u8>, Doc2PdfError> {
        let pages = layout(blocks, page);
        debug!("Laid out {} blocks on {} page(s)", blocks.len(), pages.len());
        emit(&pages, page, title)
    }
}

/// Run `renderer` on the blocking pool.
///
/// PDF emission is CPU-bound and must not stall the async executor.
pub async fn render_pdf(
    renderer: Arc<dyn PageRenderer>,
    blocks: Vec<LayoutBlock>,
    page: PageConfig,
    title: String,
) -> Result<Vec<u8>, Doc2PdfError> {
    tokio::task::spawn_blocking(move || renderer.render(&blocks, &page, &title))
        .await
        .map_err(|e| Doc2PdfError::Internal(format!("spawn_blocking panicked: {}", e)))?
}

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_EM: f32 = 0.5;
const LINE_SPACING: f32 = 1.25;
const LIST_INDENT_PT: f32 = 20.0;
const CELL_PADDING_PT: f32 = 4.0;
/// Resolution assumed for image pixels.
const IMAGE_DPI: f32 = 96.0;

fn mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

fn heading_size(level: u8) -> f32 {
    match level {
        1 => 20.0,
        2 => 16.0,
        _ => 14.0,
    }
}

/// Approximate rendered width of `text` at `size` points.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * GLYPH_WIDTH_EM
}

/// Greedy word wrap to `max_width` points. Explicit `\n` always breaks;
/// words longer than a line are split. Leading spaces of each input line
/// are kept on its first output line when they fit beside the first word.
pub fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let max_chars = ((max_width / (size * GLYPH_WIDTH_EM)).floor() as usize).max(1);
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let mut indent = raw.len() - raw.trim_start_matches(' ').len();
        let mut current = String::new();
        let mut current_len = 0usize;
        let mut has_word = false;
        for word in raw.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(max_chars) {
                if indent > 0 {
                    if indent + chunk.len() <= max_chars {
                        current.push_str(&" ".repeat(indent));
                        current_len = indent;
                    }
                    indent = 0;
                }
                if has_word && current_len + 1 + chunk.len() > max_chars {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                    has_word = false;
                }
                if has_word {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chunk);
                current_len += chunk.len();
                has_word = true;
            }
        }
        lines.push(current);
    }
    lines
}

/// Substitute `{title}`, `{page}` and `{pages}` in a header/footer template.
pub fn expand_template(template: &str, title: &str, page: usize, pages: usize) -> String {
    template
        .replace("{title}", title)
        .replace("{pages}", &pages.to_string())
        .replace("{page}", &page.to_string())
}

// ── Layout ───────────────────────────────────────────────────────────────

/// One positioned drawing operation, coordinates in points from bottom-left.
enum DrawOp {
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    Rule {
        from: (f32, f32),
        to: (f32, f32),
    },
    Picture {
        image: DynamicImage,
        x: f32,
        y: f32,
        scale: f32,
    },
}

struct Layout {
    pages: Vec<Vec<DrawOp>>,
    y: f32,
    top: f32,
    bottom: f32,
    left: f32,
    width: f32,
    font_size: f32,
}

impl Layout {
    fn new(config: &PageConfig) -> Self {
        let (w, h) = config.size.dimensions_pt();
        let m = config.margin_pt;
        Self {
            pages: vec![Vec::new()],
            y: h - m,
            top: h - m,
            bottom: m,
            left: m,
            width: w - 2.0 * m,
            font_size: config.font_size,
        }
    }

    fn page_height(&self) -> f32 {
        self.top - self.bottom
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = self.top;
    }

    /// Start a new page unless `height` fits below the cursor. A fresh page
    /// is never abandoned, so oversized content overflows instead of looping.
    fn ensure(&mut self, height: f32) {
        if self.y - height < self.bottom && self.y < self.top {
            self.new_page();
        }
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.push(op);
        }
    }

    fn gap(&mut self, pt: f32) {
        self.y = (self.y - pt).max(self.bottom);
    }

    fn text_lines(&mut self, text: &str, size: f32, bold: bool, x: f32, width: f32) {
        let line_h = size * LINE_SPACING;
        for line in wrap_text(text, size, width) {
            self.ensure(line_h);
            self.y -= line_h;
            if !line.is_empty() {
                self.push(DrawOp::Text {
                    x,
                    y: self.y + size * 0.25,
                    size,
                    bold,
                    text: line,
                });
            }
        }
    }

    fn block(&mut self, block: &LayoutBlock) {
        let fs = self.font_size;
        match block {
            LayoutBlock::Heading { level, text } => {
                let size = heading_size(*level);
                self.gap(size * 0.5);
                self.text_lines(text, size, true, self.left, self.width);
                self.gap(size * 0.3);
            }
            LayoutBlock::Paragraph { text } => {
                self.text_lines(text, fs, false, self.left, self.width);
                self.gap(fs * 0.5);
            }
            LayoutBlock::ListItem { text } => {
                let line_h = fs * LINE_SPACING;
                self.ensure(line_h);
                self.push(DrawOp::Text {
                    x: self.left + LIST_INDENT_PT * 0.4,
                    y: self.y - line_h + fs * 0.25,
                    size: fs,
                    bold: false,
                    text: "-".to_string(),
                });
                let x = self.left + LIST_INDENT_PT;
                self.text_lines(text, fs, false, x, self.width - LIST_INDENT_PT);
                self.gap(fs * 0.25);
            }
            LayoutBlock::Table { columns, rows } => {
                self.table(*columns, rows);
                self.gap(fs * 0.5);
            }
            LayoutBlock::Image { data } => self.image(data),
        }
    }

    /// Rows wider than `columns` continue on extra grid rows; a table with
    /// no declared width takes its widest row.
    fn table(&mut self, columns: usize, rows: &[Vec<TableCell>]) {
        let grid = if columns > 0 {
            columns
        } else {
            rows.iter().map(Vec::len).max().unwrap_or(0)
        };
        if grid == 0 {
            return;
        }
        for row in rows {
            if row.is_empty() {
                self.table_row(grid, &[]);
                continue;
            }
            for chunk in row.chunks(grid) {
                self.table_row(grid, chunk);
            }
        }
    }

    fn table_row(&mut self, grid: usize, cells: &[TableCell]) {
        let fs = self.font_size;
        let line_h = fs * LINE_SPACING;
        let col_w = self.width / grid as f32;
        let text_w = (col_w - 2.0 * CELL_PADDING_PT).max(fs);
        let max_lines = ((self.page_height() - 2.0 * CELL_PADDING_PT) / line_h).floor().max(1.0) as usize;

        let wrapped: Vec<(Vec<String>, bool)> = cells
            .iter()
            .map(|cell| {
                let mut lines = wrap_text(&cell.text, fs, text_w);
                lines.truncate(max_lines);
                (lines, cell.is_header)
            })
            .collect();
        let n_lines = wrapped.iter().map(|(l, _)| l.len()).max().unwrap_or(0).max(1);
        let row_h = n_lines as f32 * line_h + 2.0 * CELL_PADDING_PT;

        self.ensure(row_h);
        let row_top = self.y;
        let row_bottom = row_top - row_h;

        for (i, (lines, bold)) in wrapped.into_iter().enumerate() {
            let cell_x = self.left + i as f32 * col_w;
            let mut y = row_top - CELL_PADDING_PT;
            for line in lines {
                y -= line_h;
                if !line.is_empty() {
                    self.push(DrawOp::Text {
                        x: cell_x + CELL_PADDING_PT,
                        y: y + fs * 0.25,
                        size: fs,
                        bold,
                        text: line,
                    });
                }
            }
        }

        let right = self.left + self.width;
        self.push(DrawOp::Rule { from: (self.left, row_top), to: (right, row_top) });
        self.push(DrawOp::Rule { from: (self.left, row_bottom), to: (right, row_bottom) });
        for i in 0..=grid {
            let x = self.left + i as f32 * col_w;
            self.push(DrawOp::Rule { from: (x, row_top), to: (x, row_bottom) });
        }
        self.y = row_bottom;
    }

    fn image(&mut self, data: &[u8]) {
        let image = match image_crate::load_from_memory(data) {
            Ok(img) => DynamicImage::ImageRgb8(img.to_rgb8()),
            Err(e) => {
                warn!("Skipping undecodable image ({} bytes): {}", data.len(), e);
                return;
            }
        };
        let (px_w, px_h) = image.dimensions();
        if px_w == 0 || px_h == 0 {
            return;
        }
        let w_pt = px_w as f32 * 72.0 / IMAGE_DPI;
        let h_pt = px_h as f32 * 72.0 / IMAGE_DPI;
        let scale = 1f32.min(self.width / w_pt).min(self.page_height() / h_pt);
        let height = h_pt * scale;

        self.ensure(height);
        self.y -= height;
        let (x, y) = (self.left, self.y);
        self.push(DrawOp::Picture { image, x, y, scale });
        self.gap(self.font_size * 0.5);
    }
}

fn layout(blocks: &[LayoutBlock], config: &PageConfig) -> Vec<Vec<DrawOp>> {
    let mut l = Layout::new(config);
    for block in blocks {
        l.block(block);
    }
    l.pages
}

// ── Emission ─────────────────────────────────────────────────────────────

fn pdf_err(e: impl std::fmt::Display) -> Doc2PdfError {
    Doc2PdfError::RenderFailed(e.to_string())
}

fn emit(pages: &[Vec<DrawOp>], config: &PageConfig, title: &str) -> Result<Vec<u8>, Doc2PdfError> {
    let (w, h) = config.size.dimensions_pt();
    let (doc, first_page, first_layer) = PdfDocument::new(title, mm(w), mm(h), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::TimesRoman).map_err(pdf_err)?;
    let bold = doc.add_builtin_font(BuiltinFont::TimesBold).map_err(pdf_err)?;

    let total = pages.len();
    for (i, ops) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(mm(w), mm(h), "Layer 1");
            doc.get_page(p).get_layer(l)
        };
        layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        layer.set_outline_thickness(0.5);

        let page_no = i + 1;
        if let Some(ref tpl) = config.header {
            let text = expand_template(tpl, title, page_no, total);
            draw_centered(&layer, &text, 16.0, &bold, w, h - config.margin_pt * 0.7);
        }
        if let Some(ref tpl) = config.footer {
            let text = expand_template(tpl, title, page_no, total);
            draw_centered(&layer, &text, 10.0, &regular, w, config.margin_pt * 0.4);
        }

        for op in ops {
            match op {
                DrawOp::Text { x, y, size, bold: is_bold, text } => {
                    let font = if *is_bold { &bold } else { &regular };
                    layer.use_text(text.as_str(), *size, mm(*x), mm(*y), font);
                }
                DrawOp::Rule { from, to } => {
                    layer.add_line(Line {
                        points: vec![
                            (Point::new(mm(from.0), mm(from.1)), false),
                            (Point::new(mm(to.0), mm(to.1)), false),
                        ],
                        is_closed: false,
                    });
                }
                DrawOp::Picture { image, x, y, scale } => {
                    Image::from_dynamic_image(image).add_to_layer(
                        layer.clone(),
                        ImageTransform {
                            translate_x: Some(mm(*x)),
                            translate_y: Some(mm(*y)),
                            scale_x: Some(*scale),
                            scale_y: Some(*scale),
                            dpi: Some(IMAGE_DPI),
                            ..Default::default()
                        },
                    );
                }
            }
        }
    }

    doc.save_to_bytes().map_err(pdf_err)
}

fn draw_centered(
    layer: &PdfLayerReference,
    text: &str,
    size: f32,
    font: &IndirectFontRef,
    page_w: f32,
    y: f32,
) {
    if text.trim().is_empty() {
        return;
    }
    let x = ((page_w - text_width(text, size)) / 2.0).max(0.0);
    layer.use_text(text, size, mm(x), mm(y), font);
}
