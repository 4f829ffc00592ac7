//! Configuration types for document-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so a
//! config can be shared across batch files and logged as a whole.

use crate::error::Doc2PdfError;
use crate::pipeline::normalize::SvgSizePolicy;
use crate::pipeline::render::PageRenderer;
use crate::pipeline::session::DiagramRenderer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Mermaid build loaded by the diagram page.
pub const DEFAULT_MERMAID_URL: &str = "https://cdn.jsdelivr.net/npm/mermaid@10.6.1/dist/mermaid.min.js";

/// Title used when the caller supplies none.
pub const DEFAULT_TITLE: &str = "Generated PDF";

/// Configuration for a document-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doc2pdf::{ConversionConfig, PageSize};
///
/// let config = ConversionConfig::builder()
///     .page_size(PageSize::Letter)
///     .margin_pt(36.0)
///     .diagrams_enabled(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Page geometry, base font size and header/footer templates.
    pub page: PageConfig,

    /// Canvas bounds for rasterised SVG images.
    pub svg_policy: SvgSizePolicy,

    /// Render ```` ```mermaid ```` fences in Markdown sources. Default: true.
    ///
    /// When false the fences stay in the text and are composed as ordinary
    /// code paragraphs.
    pub diagrams_enabled: bool,

    /// Diagram session settings (timeout, script, asset directory, browser).
    pub diagram: DiagramOptions,

    /// Pre-constructed diagram renderer. Takes precedence over the shared
    /// process-wide session.
    pub diagram_renderer: Option<Arc<dyn DiagramRenderer>>,

    /// Pre-constructed page renderer. If None, the built-in printpdf renderer.
    pub page_renderer: Option<Arc<dyn PageRenderer>>,

    /// Title used when neither the caller nor the file name supplies one.
    /// Default: "Generated PDF".
    pub default_title: String,

    /// Title forced onto file conversions instead of the file stem.
    pub title: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback for batch conversions.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation, checked before each diagram, before page
    /// rendering and before the output file is finalised.
    pub cancel: Option<CancellationToken>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            svg_policy: SvgSizePolicy::default(),
            diagrams_enabled: true,
            diagram: DiagramOptions::default(),
            diagram_renderer: None,
            page_renderer: None,
            default_title: DEFAULT_TITLE.to_string(),
            title: None,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("page", &self.page)
            .field("svg_policy", &self.svg_policy)
            .field("diagrams_enabled", &self.diagrams_enabled)
            .field("diagram", &self.diagram)
            .field("diagram_renderer", &self.diagram_renderer.as_ref().map(|_| "<renderer>"))
            .field("page_renderer", &self.page_renderer.as_ref().map(|_| "<renderer>"))
            .field("default_title", &self.default_title)
            .field("title", &self.title)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: ConversionConfig::default(),
        }
    }

    /// `true` when the configured token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// `Err(Cancelled)` when the configured token has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), Doc2PdfError> {
        if self.is_cancelled() {
            Err(Doc2PdfError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Page layout settings handed to the page renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub size: PageSize,
    /// Margin on all four sides, in points. Default: 50.
    pub margin_pt: f32,
    /// Body font size in points. Default: 12.
    pub font_size: f32,
    /// Header line template; `{title}`, `{page}` and `{pages}` are
    /// substituted. None disables the header. Default: `"{title}"`.
    pub header: Option<String>,
    /// Footer line template. Default: `"{page} / {pages}"`.
    pub footer: Option<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: PageSize::default(),
            margin_pt: 50.0,
            font_size: 12.0,
            header: Some("{title}".to_string()),
            footer: Some("{page} / {pages}".to_string()),
        }
    }
}

/// Physical page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// 210 × 297 mm. (default)
    #[default]
    A4,
    /// 8.5 × 11 in.
    Letter,
}

impl PageSize {
    /// Width and height in points.
    pub fn dimensions_pt(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

impl std::str::FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            other => Err(format!("unknown page size '{other}' (expected a4 or letter)")),
        }
    }
}

/// Settings for the Mermaid diagram session and its output assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramOptions {
    /// Bound on waiting for a diagram to finish drawing. Default: 10 000 ms.
    pub render_timeout_ms: u64,
    /// Script URL embedded in the diagram page.
    pub script_url: String,
    /// Directory for rendered `mermaid_<uuid>.png` files. None = system temp dir.
    pub asset_dir: Option<PathBuf>,
    /// Browser executable. None = auto-detect.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for DiagramOptions {
    fn default() -> Self {
        Self {
            render_timeout_ms: 10_000,
            script_url: DEFAULT_MERMAID_URL.to_string(),
            asset_dir: None,
            chrome_executable: None,
        }
    }
}

impl DiagramOptions {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Directory rendered diagrams are written to.
    ///
    /// A relative directory is anchored at the current working directory so
    /// the image references written into the source stay resolvable.
    pub fn asset_dir(&self) -> PathBuf {
        let dir = self.asset_dir.clone().unwrap_or_else(std::env::temp_dir);
        if dir.is_absolute() {
            return dir;
        }
        std::env::current_dir()
            .map(|cwd| cwd.join(&dir))
            .unwrap_or(dir)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn page(mut self, page: PageConfig) -> Self {
        self.config.page = page;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page.size = size;
        self
    }

    pub fn margin_pt(mut self, margin: f32) -> Self {
        self.config.page.margin_pt = margin;
        self
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.config.page.font_size = size.clamp(6.0, 72.0);
        self
    }

    pub fn header(mut self, template: Option<String>) -> Self {
        self.config.page.header = template;
        self
    }

    pub fn footer(mut self, template: Option<String>) -> Self {
        self.config.page.footer = template;
        self
    }

    pub fn svg_policy(mut self, policy: SvgSizePolicy) -> Self {
        self.config.svg_policy = policy;
        self
    }

    pub fn diagrams_enabled(mut self, v: bool) -> Self {
        self.config.diagrams_enabled = v;
        self
    }

    pub fn diagram_timeout_ms(mut self, ms: u64) -> Self {
        self.config.diagram.render_timeout_ms = ms;
        self
    }

    pub fn mermaid_script_url(mut self, url: impl Into<String>) -> Self {
        self.config.diagram.script_url = url.into();
        self
    }

    pub fn diagram_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.diagram.asset_dir = Some(dir.into());
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.diagram.chrome_executable = Some(path.into());
        self
    }

    pub fn diagram_renderer(mut self, renderer: Arc<dyn DiagramRenderer>) -> Self {
        self.config.diagram_renderer = Some(renderer);
        self
    }

    pub fn page_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.config.page_renderer = Some(renderer);
        self
    }

    pub fn default_title(mut self, title: impl Into<String>) -> Self {
        self.config.default_title = title.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2PdfError> {
        let c = &self.config;
        let (w, h) = c.page.size.dimensions_pt();
        if !(c.page.margin_pt >= 0.0) || c.page.margin_pt * 2.0 >= w.min(h) - 72.0 {
            return Err(Doc2PdfError::InvalidConfig(format!(
                "Margin {}pt leaves no room for content on {:?}",
                c.page.margin_pt, c.page.size
            )));
        }
        if !(6.0..=72.0).contains(&c.page.font_size) {
            return Err(Doc2PdfError::InvalidConfig(format!(
                "Font size must be 6–72pt, got {}",
                c.page.font_size
            )));
        }
        let p = &c.svg_policy;
        if p.min_width > p.max_width || p.min_height > p.max_height || p.max_width == 0 || p.max_height == 0 {
            return Err(Doc2PdfError::InvalidConfig(format!(
                "SVG bounds invalid: min {}x{} / max {}x{}",
                p.min_width, p.min_height, p.max_width, p.max_height
            )));
        }
        if c.diagram.render_timeout_ms == 0 {
            return Err(Doc2PdfError::InvalidConfig(
                "Diagram timeout must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}
