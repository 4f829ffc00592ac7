//! Owned, read-only markup tree consumed by the composer.
//!
//! Parsers ([`super::markup`]) build this tree once; the composer only reads
//! it. Element names are classified into a closed [`Tag`] set at build time
//! so composition is a single exhaustive `match` rather than repeated string
//! comparisons.

/// A node of the markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
}

/// An element with its classified tag, original name, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    /// Lower-case element name as it appeared in the markup.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Closed classification of element names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// `h1`..`h3`; deeper headings are [`Tag::Other`].
    Heading(u8),
    Paragraph,
    List { ordered: bool },
    ListItem,
    Table,
    Row,
    Cell { header: bool },
    Image,
    /// Pure grouping elements that never emit a block themselves.
    Container,
    /// Document metadata and scripts; never rendered.
    Metadata,
    Other,
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match name {
            "h1" => Tag::Heading(1),
            "h2" => Tag::Heading(2),
            "h3" => Tag::Heading(3),
            "p" => Tag::Paragraph,
            "ul" => Tag::List { ordered: false },
            "ol" => Tag::List { ordered: true },
            "li" => Tag::ListItem,
            "table" => Tag::Table,
            "tr" => Tag::Row,
            "th" => Tag::Cell { header: true },
            "td" => Tag::Cell { header: false },
            "img" => Tag::Image,
            "html" | "body" | "div" | "span" | "root" | "section" | "article" | "main"
            | "header" | "footer" | "thead" | "tbody" | "tfoot" => Tag::Container,
            "head" | "script" | "style" | "template" | "noscript" | "title" | "meta" | "link" => {
                Tag::Metadata
            }
            _ => Tag::Other,
        }
    }
}

impl Node {
    pub fn text(s: impl Into<String>) -> Self {
        Node::Text(s.into())
    }

    /// Build an element node, classifying `name`.
    pub fn element(name: &str, attributes: Vec<(String, String)>, children: Vec<Node>) -> Self {
        let name = name.to_ascii_lowercase();
        Node::Element(Element {
            tag: Tag::from_name(&name),
            name,
            attributes,
            children,
        })
    }

    /// Shorthand for an attribute-less element, mostly for tests.
    pub fn el(name: &str, children: Vec<Node>) -> Self {
        Self::element(name, Vec::new(), children)
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    /// Flattened text of this node and all its descendants, whitespace
    /// collapsed to single spaces and trimmed.
    pub fn inner_text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        collapse_whitespace(&raw)
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                // <br> separates words even though it carries no text.
                if e.name == "br" {
                    out.push(' ');
                }
                for child in &e.children {
                    child.collect_text(out);
                }
            }
        }
    }
}

impl Element {
    /// Attribute lookup by (lower-case) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Direct element children, skipping text nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn inner_text(&self) -> String {
        let mut raw = String::new();
        for child in &self.children {
            child.collect_text(&mut raw);
        }
        collapse_whitespace(&raw)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_classification() {
        assert_eq!(Tag::from_name("h2"), Tag::Heading(2));
        assert_eq!(Tag::from_name("h4"), Tag::Other);
        assert_eq!(Tag::from_name("th"), Tag::Cell { header: true });
        assert_eq!(Tag::from_name("div"), Tag::Container);
        assert_eq!(Tag::from_name("style"), Tag::Metadata);
        assert_eq!(Tag::from_name("blink"), Tag::Other);
    }

    #[test]
    fn element_name_is_lowercased() {
        let n = Node::el("H1", vec![Node::text("x")]);
        let e = n.as_element().unwrap();
        assert_eq!(e.name, "h1");
        assert_eq!(e.tag, Tag::Heading(1));
    }

    #[test]
    fn inner_text_flattens_and_collapses() {
        let n = Node::el(
            "p",
            vec![
                Node::text("Hello\n   "),
                Node::el("strong", vec![Node::text("bold")]),
                Node::text("  world "),
            ],
        );
        assert_eq!(n.inner_text(), "Hello bold world");
    }

    #[test]
    fn inner_text_treats_br_as_space() {
        let n = Node::el(
            "p",
            vec![Node::text("one"), Node::el("br", vec![]), Node::text("two")],
        );
        assert_eq!(n.inner_text(), "one two");
    }

    #[test]
    fn attr_lookup() {
        let n = Node::element(
            "img",
            vec![("src".into(), "a.png".into()), ("alt".into(), "A".into())],
            vec![],
        );
        let e = n.as_element().unwrap();
        assert_eq!(e.attr("src"), Some("a.png"));
        assert_eq!(e.attr("title"), None);
    }
}
