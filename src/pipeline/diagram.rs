//! Mermaid fence substitution for Markdown sources.
//!
//! ## Algorithm
//!
//! 1. Scan the text once, forward, collecting every ```` ```mermaid ```` fence
//!    with its byte span.
//! 2. No fences: return the text untouched without touching the renderer.
//! 3. Render the fences one at a time from the last to the first. A success
//!    writes `mermaid_<uuid>.png` into the asset directory and becomes an
//!    image reference; any failure becomes [`FAILURE_MARKER`].
//! 4. Apply all `(span, replacement)` edits to the original text with
//!    [`apply_edits`], highest offset first, so every recorded span stays
//!    valid.
//!
//! A failing diagram never affects its neighbours; only cancellation aborts.

use crate::config::DiagramOptions;
use crate::error::{DiagramError, Doc2PdfError};
use crate::pipeline::session::DiagramRenderer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inline text replacing a diagram that could not be rendered.
pub const FAILURE_MARKER: &str = "*[Mermaid diagram could not be rendered]*";

/// Alt text of the image reference replacing a rendered diagram.
pub const IMAGE_ALT: &str = "Mermaid Diagram";

static RE_MERMAID_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```mermaid\s*\n(.*?)\n```").unwrap());

/// A located diagram fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramMatch {
    /// Byte span of the whole fence in the original text.
    pub span: Range<usize>,
    /// Diagram description, trimmed.
    pub source: String,
}

/// Replace `span` of the original text by `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub span: Range<usize>,
    pub replacement: String,
}

/// What happened to one diagram, indexed in forward document order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiagramOutcome {
    Rendered { index: usize, path: PathBuf },
    Failed { index: usize, error: DiagramError },
}

impl DiagramOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, DiagramOutcome::Rendered { .. })
    }
}

/// Result of [`substitute_diagrams`].
#[derive(Debug, Clone)]
pub struct Substitution {
    pub text: String,
    /// One entry per fence, in forward order.
    pub outcomes: Vec<DiagramOutcome>,
}

impl Substitution {
    pub fn rendered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_rendered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.rendered()
    }
}

/// All non-overlapping diagram fences, in forward order.
pub fn find_diagrams(text: &str) -> Vec<DiagramMatch> {
    RE_MERMAID_FENCE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            Some(DiagramMatch {
                span: whole.range(),
                source: body.as_str().trim().to_string(),
            })
        })
        .collect()
}

/// Apply non-overlapping edits to `original`.
///
/// Edits are applied in descending start order regardless of input order.
/// An edit whose span is out of bounds, not on a char boundary, or overlaps
/// an already applied edit is skipped.
pub fn apply_edits(original: &str, mut edits: Vec<TextEdit>) -> String {
    edits.sort_by(|a, b| b.span.start.cmp(&a.span.start));
    let mut out = original.to_string();
    let mut floor = original.len();
    for edit in edits {
        let Range { start, end } = edit.span;
        if start > end
            || end > floor
            || !original.is_char_boundary(start)
            || !original.is_char_boundary(end)
        {
            warn!("Skipping invalid text edit {}..{}", start, end);
            continue;
        }
        out.replace_range(start..end, &edit.replacement);
        floor = start;
    }
    out
}

/// Markdown image reference to a rendered diagram file.
pub fn image_reference(path: &Path) -> String {
    let p = path.to_string_lossy();
    if p.chars().any(|c| c.is_whitespace() || c == '(' || c == ')') {
        format!("![{IMAGE_ALT}](<{p}>)")
    } else {
        format!("![{IMAGE_ALT}]({p})")
    }
}

/// Replace every diagram fence in `text` by an image reference or the
/// failure marker.
///
/// Only cancellation produces an `Err`; every per-diagram problem is
/// recorded in [`Substitution::outcomes`].
pub async fn substitute_diagrams(
    text: &str,
    renderer: &dyn DiagramRenderer,
    options: &DiagramOptions,
    cancel: Option<&CancellationToken>,
) -> Result<Substitution, Doc2PdfError> {
    let matches = find_diagrams(text);
    if matches.is_empty() {
        return Ok(Substitution {
            text: text.to_string(),
            outcomes: Vec::new(),
        });
    }
    info!("Found {} Mermaid diagram(s)", matches.len());

    let asset_dir = options.asset_dir();
    let mut edits = Vec::with_capacity(matches.len());
    let mut outcomes = Vec::with_capacity(matches.len());

    for (index, m) in matches.iter().enumerate().rev() {
        if cancel.is_some_and(|t| t.is_cancelled()) {
            return Err(Doc2PdfError::Cancelled);
        }

        let outcome = match render_to_asset(renderer, &m.source, &asset_dir).await {
            Ok(path) => {
                debug!("Diagram {} → {}", index + 1, path.display());
                edits.push(TextEdit {
                    span: m.span.clone(),
                    replacement: image_reference(&path),
                });
                DiagramOutcome::Rendered { index, path }
            }
            Err(error) => {
                warn!("Diagram {} failed: {}", index + 1, error);
                edits.push(TextEdit {
                    span: m.span.clone(),
                    replacement: FAILURE_MARKER.to_string(),
                });
                DiagramOutcome::Failed { index, error }
            }
        };
        outcomes.push(outcome);
    }

    outcomes.reverse();
    Ok(Substitution {
        text: apply_edits(text, edits),
        outcomes,
    })
}

async fn render_to_asset(
    renderer: &dyn DiagramRenderer,
    source: &str,
    asset_dir: &Path,
) -> Result<PathBuf, DiagramError> {
    let png = renderer.render(source).await?;
    let path = asset_dir.join(format!("mermaid_{}.png", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&path, &png)
        .await
        .map_err(|e| DiagramError::AssetWrite {
            path: path.clone(),
            detail: e.to_string(),
        })?;
    Ok(path)
}
