//! Pipeline stages for document-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested alone and the two external engines (headless browser, PDF writer)
//! sit behind traits.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ diagram ──▶ markup/docx ──▶ compose ──▶ textfit ──▶ render
//! (path/URL) (Mermaid)   (→ tree)      (→ blocks)   (ASCII)   (printpdf)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`diagram`]: replace Mermaid fences with rendered PNG references via a
//!    [`session::DiagramRenderer`]; [`chromium`] is the default backend
//! 3. [`markup`] / [`docx`]: turn the source into a [`tree::Node`] tree
//! 4. [`compose`]: walk the tree into layout blocks, loading images through
//!    [`normalize`]
//! 5. [`textfit`]: make block text printable with the builtin fonts
//! 6. [`render`]: paginate and emit the PDF; runs in `spawn_blocking`

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod compose;
pub mod diagram;
pub mod docx;
pub mod input;
pub mod markup;
pub mod normalize;
pub mod render;
pub mod session;
pub mod textfit;
pub mod tree;
