//! Document composer: markup tree → ordered [`LayoutBlock`] sequence.
//!
//! A depth-first, pre-order walk over the tree. Headings, paragraphs, lists
//! and tables emit their blocks and stop there (their text is flattened);
//! containers and unrecognised elements emit nothing themselves and splice in
//! whatever their children produce, in order.
//!
//! Image references resolve in this order:
//!
//! 1. key of the run's [`AssetMap`] (embedded DOCX media)
//! 2. `data:` URI
//! 3. file path relative to the base path, then its percent-decoded form
//!
//! A reference that yields no bytes is skipped with a warning. The composer
//! never fails.

use super::normalize::{self, SvgSizePolicy};
use super::tree::{Element, Node, Tag};
use crate::model::{AssetMap, LayoutBlock, TableCell};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Compose `root` into layout blocks.
pub fn compose(
    root: &Node,
    assets: &AssetMap,
    base_path: Option<&Path>,
    policy: &SvgSizePolicy,
) -> Vec<LayoutBlock> {
    Composer::new(assets, base_path, policy).compose(root)
}

/// Stateful walker; keeps counts for conversion stats.
pub struct Composer<'a> {
    assets: &'a AssetMap,
    base_path: Option<&'a Path>,
    policy: &'a SvgSizePolicy,
    skipped_images: usize,
}

impl<'a> Composer<'a> {
    pub fn new(assets: &'a AssetMap, base_path: Option<&'a Path>, policy: &'a SvgSizePolicy) -> Self {
        Self {
            assets,
            base_path,
            policy,
            skipped_images: 0,
        }
    }

    pub fn compose(&mut self, root: &Node) -> Vec<LayoutBlock> {
        let mut blocks = Vec::new();
        self.visit(root, &mut blocks);
        debug!(
            "Composed {} blocks ({} images skipped)",
            blocks.len(),
            self.skipped_images
        );
        blocks
    }

    /// Image references that resolved to no bytes so far.
    pub fn skipped_images(&self) -> usize {
        self.skipped_images
    }

    fn visit(&mut self, node: &Node, out: &mut Vec<LayoutBlock>) {
        let el = match node {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push(LayoutBlock::paragraph(trimmed));
                }
                return;
            }
            Node::Element(el) => el,
        };

        match el.tag {
            Tag::Heading(level) => out.push(LayoutBlock::heading(level, el.inner_text())),
            Tag::Paragraph => self.paragraph(el, out),
            Tag::List { .. } => {
                for item in el.child_elements().filter(|c| c.tag == Tag::ListItem) {
                    out.push(LayoutBlock::list_item(item.inner_text()));
                }
            }
            Tag::Table => out.push(table(el)),
            Tag::Image => {
                if let Some(block) = self.image(el) {
                    out.push(block);
                }
            }
            Tag::Metadata => {}
            Tag::Container
            | Tag::ListItem
            | Tag::Row
            | Tag::Cell { .. }
            | Tag::Other => {
                for child in &el.children {
                    self.visit(child, out);
                }
            }
        }
    }

    /// A paragraph is one text block; images inside it follow as their own
    /// blocks. An image-only paragraph emits no empty text block.
    fn paragraph(&mut self, el: &Element, out: &mut Vec<LayoutBlock>) {
        let text = el.inner_text();
        let mut images = Vec::new();
        collect_images(el, &mut images);

        if !text.is_empty() || images.is_empty() {
            out.push(LayoutBlock::paragraph(text));
        }
        for img in images {
            if let Some(block) = self.image(img) {
                out.push(block);
            }
        }
    }

    fn image(&mut self, el: &Element) -> Option<LayoutBlock> {
        let src = el.attr("src").map(str::trim).filter(|s| !s.is_empty());
        let data = src.and_then(|s| self.resolve_image(s));
        match data {
            Some(data) => Some(LayoutBlock::Image { data }),
            None => {
                self.skipped_images += 1;
                warn!("Skipping unresolvable image: {}", src.unwrap_or("<no src>"));
                None
            }
        }
    }

    fn resolve_image(&self, src: &str) -> Option<Vec<u8>> {
        if let Some(bytes) = self.assets.get(src) {
            return Some(bytes.clone());
        }
        if src.starts_with("data:") {
            let (kind, bytes) = normalize::decode_data_uri(src)?;
            return normalize::normalize(&bytes, kind, self.policy);
        }
        if src.starts_with("http://") || src.starts_with("https://") {
            debug!("Remote images are not fetched: {}", src);
            return None;
        }

        let local = src.strip_prefix("file://").unwrap_or(src);
        let mut candidates = vec![self.resolve_path(local)];
        if let Ok(decoded) = urlencoding::decode(local) {
            if decoded != local {
                candidates.push(self.resolve_path(&decoded));
            }
        }
        let path = candidates.into_iter().find(|p| p.is_file())?;
        normalize::normalize_file(&path, self.policy)
    }

    fn resolve_path(&self, reference: &str) -> PathBuf {
        match self.base_path {
            Some(base) => base.join(reference),
            None => PathBuf::from(reference),
        }
    }
}

fn collect_images<'e>(el: &'e Element, out: &mut Vec<&'e Element>) {
    for child in el.child_elements() {
        if child.tag == Tag::Image {
            out.push(child);
        } else {
            collect_images(child, out);
        }
    }
}

fn table(el: &Element) -> LayoutBlock {
    let mut row_elements = Vec::new();
    collect_rows(el, &mut row_elements);

    let rows: Vec<Vec<TableCell>> = row_elements
        .into_iter()
        .map(|row| {
            row.child_elements()
                .filter_map(|cell| match cell.tag {
                    Tag::Cell { header } => Some(TableCell::new(cell.inner_text(), header)),
                    _ => None,
                })
                .collect()
        })
        .collect();

    let columns = rows.first().map_or(0, Vec::len);
    LayoutBlock::Table { columns, rows }
}

/// `tr` descendants in document order, not descending into nested tables.
fn collect_rows<'e>(el: &'e Element, out: &mut Vec<&'e Element>) {
    for child in el.child_elements() {
        match child.tag {
            Tag::Row => out.push(child),
            Tag::Table => {}
            _ => collect_rows(child, out),
        }
    }
}
