//! Markup adapters: Markdown / plain text → HTML, HTML → [`Node`] tree.
//!
//! Markdown goes through pulldown-cmark's HTML writer and then the same
//! html5ever-backed parse as HTML sources, so the composer only ever sees
//! one tree shape. The returned root is a synthetic `body` container holding
//! the document body's children.

use super::tree::Node;
use pulldown_cmark::{html, Options, Parser};
use scraper::{ElementRef, Html};
use tracing::debug;

/// Elements nested deeper than this are flattened into their text content.
pub const MAX_DEPTH: usize = 256;

/// Render Markdown to HTML with tables, strikethrough, task lists and
/// footnotes enabled.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Wrap plain text in an escaped `<pre>` block, keeping its line breaks.
pub fn text_to_html(text: &str) -> String {
    format!("<pre>{}</pre>", html_escape::encode_text(text))
}

/// Parse an HTML document or fragment into an owned tree rooted at `body`.
///
/// html5ever recovers from any malformed input, so this never fails.
pub fn parse_html(source: &str) -> Node {
    let document = Html::parse_document(source);
    let html_el = document.root_element();
    let body = html_el
        .children()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "body")
        .unwrap_or(html_el);

    let children = convert_children(body, 1);
    debug!("Parsed HTML: {} top-level nodes", children.len());
    Node::el("body", children)
}

fn convert_children(element: ElementRef<'_>, depth: usize) -> Vec<Node> {
    if depth >= MAX_DEPTH {
        // ego_tree's text iterator walks without recursion.
        let text: String = element.text().collect();
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text)]
        };
    }
    let mut out = Vec::new();
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            let attributes = el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect();
            out.push(Node::element(
                el.value().name(),
                attributes,
                convert_children(el, depth + 1),
            ));
        } else if let Some(text) = child.value().as_text() {
            out.push(Node::text(&**text));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tree::Tag;

    fn top_tags(root: &Node) -> Vec<Tag> {
        root.as_element()
            .unwrap()
            .child_elements()
            .map(|e| e.tag)
            .collect()
    }

    #[test]
    fn markdown_heading_and_paragraph() {
        let html = markdown_to_html("# Title\n\nHello **world**");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>world</strong>"));
    }

    #[test]
    fn markdown_tables_enabled() {
        let html = markdown_to_html("| A | B |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>A</th>"));
    }

    #[test]
    fn text_is_escaped_into_pre() {
        assert_eq!(text_to_html("a < b\nc"), "<pre>a &lt; b\nc</pre>");
    }

    #[test]
    fn parse_full_document_roots_at_body() {
        let root = parse_html("<html><head><title>T</title></head><body><h2>X</h2><p>y</p></body></html>");
        assert_eq!(top_tags(&root), vec![Tag::Heading(2), Tag::Paragraph]);
    }

    #[test]
    fn parse_fragment_and_attributes() {
        let root = parse_html(r#"<div><img SRC="a.png" alt="A"></div>"#);
        let div = root.as_element().unwrap().child_elements().next().unwrap();
        let img = div.child_elements().next().unwrap();
        assert_eq!(img.tag, Tag::Image);
        assert_eq!(img.attr("src"), Some("a.png"));
    }

    #[test]
    fn parse_recovers_from_malformed_markup() {
        let root = parse_html("<p>open <b>bold</b><p>next");
        assert_eq!(top_tags(&root), vec![Tag::Paragraph, Tag::Paragraph]);
        let first = root.as_element().unwrap().child_elements().next().unwrap();
        assert_eq!(first.inner_text(), "open bold");
    }

    fn depth_of(node: &Node) -> usize {
        let mut depth = 0;
        let mut current = node.as_element();
        while let Some(el) = current {
            depth += 1;
            current = el.child_elements().next();
        }
        depth
    }

    #[test]
    fn deep_nesting_is_flattened_below_the_cap() {
        let n = 10_000;
        let source = format!("{}deep{}", "<div>".repeat(n), "</div>".repeat(n));
        let root = parse_html(&source);
        assert!(depth_of(&root) <= MAX_DEPTH);
        assert_eq!(root.inner_text(), "deep");
    }

    #[test]
    fn shallow_nesting_keeps_its_elements() {
        let source = format!("{}x{}", "<span>".repeat(50), "</span>".repeat(50));
        let root = parse_html(&source);
        assert_eq!(depth_of(&root), 51);
    }
}
