//! DOCX container extraction: `word/document.xml` → HTML fragment + assets.
//!
//! The WordprocessingML body is streamed once with quick-xml and rewritten as
//! the small HTML subset the composer understands:
//!
//! | WordprocessingML                         | HTML                     |
//! |------------------------------------------|--------------------------|
//! | `w:p` with style `Title` / `Heading1..3` | `<h1>`..`<h3>`           |
//! | `w:p` with `w:numPr`                     | `<li>` grouped in `<ul>` |
//! | other `w:p`                              | `<p>`                    |
//! | `w:tbl` / `w:tr` / `w:tc`                | `<table>` / `<tr>` / `<td>` (`<th>` in `w:tblHeader` rows) |
//! | `a:blip r:embed`                         | `<img src="<uuid>">`     |
//!
//! Embedded media are read through `word/_rels/document.xml.rels`, normalised
//! and stored in the returned [`AssetMap`] under a fresh UUID, so keys can
//! never collide with a real file name.

use super::normalize::{self, ImageKind, SvgSizePolicy};
use crate::error::Doc2PdfError;
use crate::model::AssetMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: u64 = 16 << 20;

/// Extract the body of a `.docx` file as HTML plus its embedded images.
pub fn extract_docx(path: &Path, policy: &SvgSizePolicy) -> Result<(String, AssetMap), Doc2PdfError> {
    let mut archive = DocxArchive::open(path)?;
    let document = archive
        .read_text(DOCUMENT_PART)?
        .ok_or_else(|| archive.invalid(format!("missing {DOCUMENT_PART}")))?;
    let rels = match archive.read_text(RELS_PART)? {
        Some(xml) => parse_relationships(&xml),
        None => HashMap::new(),
    };

    let mut writer = HtmlWriter::new(&mut archive, &rels, policy);
    writer.run(&document)?;
    let (html, assets) = writer.finish();

    debug!(
        "Extracted DOCX {}: {} bytes of HTML, {} images",
        path.display(),
        html.len(),
        assets.len()
    );
    Ok((html, assets))
}

struct DocxArchive {
    zip: ZipArchive<File>,
    path: PathBuf,
}

impl DocxArchive {
    fn open(path: &Path) -> Result<Self, Doc2PdfError> {
        let file = File::open(path).map_err(|e| Doc2PdfError::InvalidDocx {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let zip = ZipArchive::new(file).map_err(|e| Doc2PdfError::InvalidDocx {
            path: path.to_path_buf(),
            detail: format!("not a zip container: {e}"),
        })?;
        Ok(Self {
            zip,
            path: path.to_path_buf(),
        })
    }

    fn invalid(&self, detail: impl Into<String>) -> Doc2PdfError {
        invalid(&self.path, detail)
    }

    /// `Ok(None)` when the part does not exist.
    fn read_text(&mut self, name: &str) -> Result<Option<String>, Doc2PdfError> {
        let path = &self.path;
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(invalid(path, format!("{name}: {e}"))),
        };
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| invalid(path, format!("{name}: {e}")))?;
        Ok(Some(text))
    }

    fn read_bytes(&mut self, name: &str) -> Option<Vec<u8>> {
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("DOCX media '{}' unavailable: {}", name, e);
                return None;
            }
        };
        let mut bytes = Vec::with_capacity(preallocation(entry.size()));
        match entry.read_to_end(&mut bytes) {
            Ok(_) => Some(bytes),
            Err(e) => {
                warn!("DOCX media '{}' unreadable: {}", name, e);
                None
            }
        }
    }
}

fn invalid(path: &Path, detail: impl Into<String>) -> Doc2PdfError {
    Doc2PdfError::InvalidDocx {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Relationship id → archive path, internal targets only.
fn parse_relationships(xml: &str) -> HashMap<String, String> {
    let mut rels = HashMap::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                let external = attr(&e, b"TargetMode").as_deref() == Some("External");
                if let (false, Some(id), Some(target)) = (external, attr(&e, b"Id"), attr(&e, b"Target")) {
                    let resolved = match target.strip_prefix('/') {
                        Some(abs) => abs.to_string(),
                        None => format!("word/{target}"),
                    };
                    rels.insert(id, resolved);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("Malformed DOCX relationships: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    rels
}

fn heading_level(style: &str) -> Option<u8> {
    match style.to_ascii_lowercase().replace(' ', "").as_str() {
        "title" | "heading1" => Some(1),
        "heading2" => Some(2),
        "heading3" => Some(3),
        _ => None,
    }
}

#[derive(Default)]
struct Paragraph {
    style: Option<String>,
    list: bool,
    html: String,
    images: Vec<String>,
}

#[derive(Default)]
struct Row {
    header: bool,
    cells: Vec<String>,
}

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    row: Option<Row>,
    cell: Option<String>,
}

impl Table {
    fn to_html(&self) -> String {
        let mut html = String::from("<table>");
        for row in &self.rows {
            let tag = if row.header { "th" } else { "td" };
            html.push_str("<tr>");
            for cell in &row.cells {
                html.push_str(&format!("<{tag}>{cell}</{tag}>"));
            }
            html.push_str("</tr>");
        }
        html.push_str("</table>");
        html
    }
}

struct HtmlWriter<'a> {
    archive: &'a mut DocxArchive,
    rels: &'a HashMap<String, String>,
    policy: &'a SvgSizePolicy,
    out: String,
    assets: AssetMap,
    in_list: bool,
    in_text: bool,
    para: Option<Paragraph>,
    tables: Vec<Table>,
}

impl<'a> HtmlWriter<'a> {
    fn new(
        archive: &'a mut DocxArchive,
        rels: &'a HashMap<String, String>,
        policy: &'a SvgSizePolicy,
    ) -> Self {
        Self {
            archive,
            rels,
            policy,
            out: String::new(),
            assets: AssetMap::new(),
            in_list: false,
            in_text: false,
            para: None,
            tables: Vec::new(),
        }
    }

    fn run(&mut self, xml: &str) -> Result<(), Doc2PdfError> {
        let mut reader = Reader::from_str(xml);
        // Run text keeps its own spacing (`xml:space="preserve"`).
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| self.archive.invalid(format!("{DOCUMENT_PART}: {e}")))?;
            match event {
                Event::Start(e) => self.start(&e, false),
                Event::Empty(e) => self.start(&e, true),
                Event::End(e) => self.end(e.name().as_ref()),
                Event::Text(t) if self.in_text => {
                    let text = t
                        .unescape()
                        .map_err(|e| self.archive.invalid(format!("{DOCUMENT_PART}: {e}")))?;
                    if let Some(p) = self.para.as_mut() {
                        p.html.push_str(&html_escape::encode_text(&text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(())
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) {
        match e.name().as_ref() {
            b"w:p" => {
                self.para = Some(Paragraph::default());
                if empty {
                    self.end_paragraph();
                }
            }
            b"w:pStyle" => {
                if let Some(p) = self.para.as_mut() {
                    p.style = attr(e, b"w:val");
                }
            }
            b"w:numPr" => {
                if let Some(p) = self.para.as_mut() {
                    p.list = true;
                }
            }
            b"w:t" if !empty => self.in_text = true,
            b"w:tab" => self.push_raw(" "),
            b"w:br" | b"w:cr" => self.push_raw("<br>"),
            b"a:blip" => {
                if let Some(id) = attr(e, b"r:embed") {
                    self.embed_image(&id);
                }
            }
            b"w:tbl" if !empty => self.tables.push(Table::default()),
            b"w:tr" => {
                if let Some(t) = self.tables.last_mut() {
                    t.row = Some(Row::default());
                }
                if empty {
                    self.end(b"w:tr");
                }
            }
            b"w:tblHeader" => {
                if let Some(row) = self.tables.last_mut().and_then(|t| t.row.as_mut()) {
                    let val = attr(e, b"w:val");
                    row.header = !matches!(val.as_deref(), Some("false") | Some("0"));
                }
            }
            b"w:tc" => {
                if let Some(t) = self.tables.last_mut() {
                    t.cell = Some(String::new());
                }
                if empty {
                    self.end(b"w:tc");
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, name: &[u8]) {
        match name {
            b"w:t" => self.in_text = false,
            b"w:p" => self.end_paragraph(),
            b"w:tc" => {
                if let Some(t) = self.tables.last_mut() {
                    if let (Some(cell), Some(row)) = (t.cell.take(), t.row.as_mut()) {
                        row.cells.push(cell);
                    }
                }
            }
            b"w:tr" => {
                if let Some(t) = self.tables.last_mut() {
                    if let Some(row) = t.row.take() {
                        t.rows.push(row);
                    }
                }
            }
            b"w:tbl" => {
                if let Some(table) = self.tables.pop() {
                    let html = table.to_html();
                    match self.current_cell() {
                        Some(cell) => cell.push_str(&html),
                        None => self.emit(html),
                    }
                }
            }
            _ => {}
        }
    }

    fn push_raw(&mut self, s: &str) {
        if let Some(p) = self.para.as_mut() {
            p.html.push_str(s);
        }
    }

    fn current_cell(&mut self) -> Option<&mut String> {
        self.tables.last_mut().and_then(|t| t.cell.as_mut())
    }

    fn embed_image(&mut self, rel_id: &str) {
        let Some(target) = self.rels.get(rel_id) else {
            warn!("DOCX image relationship '{}' not found", rel_id);
            return;
        };
        let Some(kind) = ImageKind::from_path(Path::new(target)) else {
            warn!("Unsupported DOCX media format: {}", target);
            return;
        };
        let Some(bytes) = self.archive.read_bytes(target) else {
            return;
        };
        let Some(png) = normalize::normalize(&bytes, kind, self.policy) else {
            warn!("Could not normalise DOCX media: {}", target);
            return;
        };
        let key = uuid::Uuid::new_v4().to_string();
        self.assets.insert(key.clone(), png);
        if let Some(p) = self.para.as_mut() {
            p.images.push(key);
        }
    }

    fn end_paragraph(&mut self) {
        self.in_text = false;
        let Some(p) = self.para.take() else {
            return;
        };
        let images: String = p
            .images
            .iter()
            .map(|key| format!("<img src=\"{key}\">"))
            .collect();

        if let Some(cell) = self.current_cell() {
            if !cell.is_empty() && !p.html.is_empty() {
                cell.push(' ');
            }
            cell.push_str(&p.html);
            cell.push_str(&images);
            return;
        }

        let level = p.style.as_deref().and_then(heading_level);
        if p.list && level.is_none() {
            if !self.in_list {
                self.out.push_str("<ul>");
                self.in_list = true;
            }
            self.out.push_str(&format!("<li>{}</li>", p.html));
            if !images.is_empty() {
                self.emit(format!("<p>{images}</p>"));
            }
            return;
        }

        match level {
            Some(n) => {
                self.emit(format!("<h{n}>{}</h{n}>", p.html));
                if !images.is_empty() {
                    self.emit(format!("<p>{images}</p>"));
                }
            }
            None => self.emit(format!("<p>{}{}</p>", p.html, images)),
        }
    }

    /// Append a top-level block, closing any open list first.
    fn emit(&mut self, html: String) {
        if self.in_list {
            self.out.push_str("</ul>");
            self.in_list = false;
        }
        self.out.push_str(&html);
    }

    fn finish(mut self) -> (String, AssetMap) {
        if self.in_list {
            self.out.push_str("</ul>");
        }
        (self.out, self.assets)
    }
}

/// The declared size comes from the archive and is not trusted.
fn preallocation(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn body(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
  xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
  xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <w:body>{inner}</w:body>
</w:document>"#
        )
    }

    fn write_docx(parts: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        {
            let mut zip = zip::ZipWriter::new(file.as_file_mut());
            for (name, data) in parts {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        file
    }

    fn extract(inner: &str) -> (String, AssetMap) {
        let xml = body(inner);
        let file = write_docx(&[(DOCUMENT_PART, xml.as_bytes())]);
        extract_docx(file.path(), &SvgSizePolicy::default()).unwrap()
    }

    fn para(style: Option<&str>, text: &str) -> String {
        let ppr = style
            .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
            .unwrap_or_default();
        format!("<w:p>{ppr}<w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    #[test]
    fn declared_entry_size_caps_the_reservation() {
        assert_eq!(preallocation(1024), 1024);
        assert_eq!(preallocation(u64::from(u32::MAX)), 16 << 20);
        assert_eq!(preallocation(u64::MAX), 16 << 20);
    }

    #[test]
    fn headings_and_paragraphs() {
        let inner = format!(
            "{}{}{}",
            para(Some("Title"), "Report"),
            para(Some("Heading2"), "Scope"),
            para(None, "Body text")
        );
        let (html, assets) = extract(&inner);
        assert_eq!(html, "<h1>Report</h1><h2>Scope</h2><p>Body text</p>");
        assert!(assets.is_empty());
    }

    #[test]
    fn runs_keep_their_spacing() {
        let (html, _) = extract(
            r#"<w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>"#,
        );
        assert_eq!(html, "<p>Hello world</p>");
    }

    #[test]
    fn text_is_escaped() {
        let (html, _) = extract(&para(None, "a &lt; b &amp; c"));
        assert_eq!(html, "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn list_paragraphs_are_grouped() {
        let item = |t: &str| {
            format!(r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>{t}</w:t></w:r></w:p>"#)
        };
        let inner = format!("{}{}{}", item("one"), item("two"), para(None, "after"));
        let (html, _) = extract(&inner);
        assert_eq!(html, "<ul><li>one</li><li>two</li></ul><p>after</p>");
    }

    #[test]
    fn trailing_list_is_closed() {
        let inner = r#"<w:p><w:pPr><w:numPr/></w:pPr><w:r><w:t>last</w:t></w:r></w:p>"#;
        let (html, _) = extract(inner);
        assert_eq!(html, "<ul><li>last</li></ul>");
    }

    #[test]
    fn tables_with_header_rows() {
        let inner = format!(
            "<w:tbl><w:tr><w:trPr><w:tblHeader/></w:trPr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>",
            para(None, "Name"),
            para(None, "Qty"),
            para(None, "Apples"),
            para(None, "3")
        );
        let (html, _) = extract(&inner);
        assert_eq!(
            html,
            "<table><tr><th>Name</th><th>Qty</th></tr><tr><td>Apples</td><td>3</td></tr></table>"
        );
    }

    #[test]
    fn embedded_images_get_uuid_keys() {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png).unwrap();

        let xml = body(
            r#"<w:p><w:r><w:drawing><a:graphic><a:graphicData><a:blip r:embed="rId7"/></a:graphicData></a:graphic></w:drawing></w:r></w:p>"#,
        );
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
</Relationships>"#;
        let file = write_docx(&[
            (DOCUMENT_PART, xml.as_bytes()),
            (RELS_PART, rels.as_bytes()),
            ("word/media/image1.png", &png),
        ]);

        let (html, assets) = extract_docx(file.path(), &SvgSizePolicy::default()).unwrap();
        assert_eq!(assets.len(), 1);
        let (key, bytes) = assets.iter().next().unwrap();
        assert!(uuid::Uuid::parse_str(key).is_ok());
        assert_eq!(bytes, &png);
        assert_eq!(html, format!("<p><img src=\"{key}\"></p>"));
    }

    #[test]
    fn missing_media_is_skipped() {
        let xml = body(r#"<w:p><w:r><w:t>pic</w:t><a:blip r:embed="rId1"/></w:r></w:p>"#);
        let file = write_docx(&[(DOCUMENT_PART, xml.as_bytes())]);
        let (html, assets) = extract_docx(file.path(), &SvgSizePolicy::default()).unwrap();
        assert!(assets.is_empty());
        assert_eq!(html, "<p>pic</p>");
    }

    #[test]
    fn non_zip_is_invalid() {
        let mut file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        file.write_all(b"plain text, not a container").unwrap();
        let err = extract_docx(file.path(), &SvgSizePolicy::default()).unwrap_err();
        assert!(matches!(err, Doc2PdfError::InvalidDocx { .. }));
    }

    #[test]
    fn missing_document_part_is_invalid() {
        let file = write_docx(&[("docProps/core.xml", b"<x/>")]);
        let err = extract_docx(file.path(), &SvgSizePolicy::default()).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn relationship_targets_resolve_under_word() {
        let rels = parse_relationships(
            r#"<Relationships><Relationship Id="a" Target="media/x.png"/><Relationship Id="b" Target="/word/media/y.png"/><Relationship Id="c" Target="http://x" TargetMode="External"/></Relationships>"#,
        );
        assert_eq!(rels.get("a").map(String::as_str), Some("word/media/x.png"));
        assert_eq!(rels.get("b").map(String::as_str), Some("word/media/y.png"));
        assert!(!rels.contains_key("c"));
    }
}
