//! Diagram rendering through a lazily launched headless browser session.
//!
//! [`DiagramRenderer`] is the seam the substitution stage depends on; tests
//! plug in stubs, production uses [`RenderSession`] over a
//! [`HeadlessEngine`] (Chromium via `chromiumoxide` with the `chromium`
//! feature).
//!
//! ## Session lifecycle
//!
//! ```text
//! first render ──▶ launch (exactly once, concurrent callers share it)
//!                    ├─ Ok  ──▶ session reused by every later render
//!                    └─ Err ──▶ remembered; every later render is Unavailable
//! close()      ──▶ session closed once; later renders report SessionClosed
//!                    (a launch still in flight is closed as soon as it lands)
//! ```
//!
//! A failed launch is never retried within the lifetime of the
//! `RenderSession`.

use crate::config::DiagramOptions;
use crate::error::DiagramError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Element that wraps the diagram; only this element is captured.
pub const CAPTURE_SELECTOR: &str = "#mermaid-diagram";

/// Present once Mermaid has either drawn the SVG or reported an error.
pub const READY_SELECTOR: &str = "#mermaid-diagram[data-rendered] svg, #mermaid-diagram[data-error]";

/// Attribute the page shell sets on [`CAPTURE_SELECTOR`] when Mermaid fails.
pub const ERROR_ATTRIBUTE: &str = "data-error";

/// Turns one diagram description into PNG bytes.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, source: &str) -> Result<Vec<u8>, DiagramError>;

    /// Release any held engine resources. Must be idempotent.
    async fn close(&self) {}
}

/// Launches headless sessions.
#[async_trait]
pub trait HeadlessEngine: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn HeadlessSession>, DiagramError>;
}

/// A live headless engine instance.
#[async_trait]
pub trait HeadlessSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn HeadlessPage>, DiagramError>;

    async fn close(&self) -> Result<(), DiagramError>;
}

/// An isolated rendering context (one browser tab).
#[async_trait]
pub trait HeadlessPage: Send {
    async fn set_content(&mut self, html: &str) -> Result<(), DiagramError>;

    /// Wait until `selector` matches, failing with [`DiagramError::Timeout`]
    /// after `timeout`.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DiagramError>;

    /// Value of attribute `name` on the first element matching `selector`.
    async fn attribute(
        &mut self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, DiagramError>;

    /// PNG screenshot clipped to the first element matching `selector`.
    async fn screenshot_element(&mut self, selector: &str) -> Result<Vec<u8>, DiagramError>;

    async fn close(self: Box<Self>);
}

/// Renderer used when no engine can exist (feature disabled).
pub struct UnavailableRenderer {
    reason: String,
}

impl UnavailableRenderer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl DiagramRenderer for UnavailableRenderer {
    async fn render(&self, _source: &str) -> Result<Vec<u8>, DiagramError> {
        Err(DiagramError::SessionUnavailable {
            detail: self.reason.clone(),
        })
    }
}

/// Once-initialised headless session rendering Mermaid diagrams.
pub struct RenderSession {
    engine: Box<dyn HeadlessEngine>,
    options: DiagramOptions,
    session: OnceCell<Result<Box<dyn HeadlessSession>, String>>,
    closed: AtomicBool,
    launch_started: AtomicBool,
}

impl RenderSession {
    pub fn new(engine: Box<dyn HeadlessEngine>, options: DiagramOptions) -> Self {
        Self {
            engine,
            options,
            session: OnceCell::new(),
            closed: AtomicBool::new(false),
            launch_started: AtomicBool::new(false),
        }
    }

    /// `true` once the single launch attempt has been made, whatever its outcome.
    pub fn launch_attempted(&self) -> bool {
        self.session.initialized()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> Result<&dyn HeadlessSession, DiagramError> {
        let slot = self.session.get_or_init(|| self.launch()).await;
        match slot {
            Ok(s) => Ok(s.as_ref()),
            Err(_) if self.is_closed() => Err(DiagramError::SessionClosed),
            Err(detail) => Err(DiagramError::SessionUnavailable {
                detail: detail.clone(),
            }),
        }
    }

    async fn launch(&self) -> Result<Box<dyn HeadlessSession>, String> {
        self.launch_started.store(true, Ordering::SeqCst);
        info!("Launching headless diagram session");
        let session = match self.engine.launch().await {
            Ok(s) => s,
            Err(e) => {
                warn!("Diagram session unavailable for this run: {}", e);
                return Err(e.to_string());
            }
        };
        // close() ran during the launch and saw no session to close.
        if self.is_closed() {
            if let Err(e) = session.close().await {
                warn!("Error closing diagram session: {}", e);
            }
            info!("Diagram session closed as soon as it launched");
            return Err("session closed during launch".to_string());
        }
        Ok(session)
    }

    async fn render_on_page(
        &self,
        page: &mut dyn HeadlessPage,
        source: &str,
    ) -> Result<Vec<u8>, DiagramError> {
        let html = diagram_page_html(source, &self.options.script_url);
        page.set_content(&html).await?;
        page.wait_for_selector(READY_SELECTOR, self.options.render_timeout())
            .await?;
        if let Some(message) = page.attribute(CAPTURE_SELECTOR, ERROR_ATTRIBUTE).await? {
            return Err(DiagramError::Engine {
                detail: format!("Mermaid: {message}"),
            });
        }
        page.screenshot_element(CAPTURE_SELECTOR).await
    }
}

#[async_trait]
impl DiagramRenderer for RenderSession {
    async fn render(&self, source: &str) -> Result<Vec<u8>, DiagramError> {
        if self.is_closed() {
            return Err(DiagramError::SessionClosed);
        }
        let session = self.acquire().await?;
        let mut page = session.new_page().await?;
        let result = self.render_on_page(page.as_mut(), source).await;
        page.close().await;
        match &result {
            Ok(png) => debug!("Diagram rendered: {} bytes", png.len()),
            Err(e) => debug!("Diagram render failed: {}", e),
        }
        result
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.launch_started.load(Ordering::SeqCst) {
            return;
        }
        // Waits for a launch still in flight.
        let slot = self
            .session
            .get_or_init(|| async { Err("closed before launch".to_string()) })
            .await;
        if let Ok(session) = slot {
            match session.close().await {
                Ok(()) => info!("Diagram session closed"),
                Err(e) => warn!("Error closing diagram session: {}", e),
            }
        }
    }
}

/// Minimal HTML page that draws `source` with Mermaid and flags completion.
pub fn diagram_page_html(source: &str, script_url: &str) -> String {
    let code = html_escape::encode_text(source);
    let url = html_escape::encode_double_quoted_attribute(script_url);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<script src="{url}"></script>
<style>
  body {{ margin: 0; background: #ffffff; }}
  #mermaid-diagram {{ display: inline-block; padding: 8px; background: #ffffff; }}
</style>
</head>
<body>
<div id="mermaid-diagram"><pre class="mermaid">{code}</pre></div>
<script>
  (function () {{
    var host = document.getElementById('mermaid-diagram');
    try {{
      mermaid.initialize({{ startOnLoad: false, theme: 'default' }});
      mermaid.run({{ querySelector: '#mermaid-diagram .mermaid' }})
        .then(function () {{ host.setAttribute('data-rendered', 'true'); }})
        .catch(function (e) {{ host.setAttribute('data-error', String(e)); }});
    }} catch (e) {{
      host.setAttribute('data-error', String(e));
    }}
  }})();
</script>
</body>
</html>"#
    )
}

// ── Process-wide default session ─────────────────────────────────────────

#[cfg(feature = "chromium")]
static SHARED_SESSION: once_cell::sync::OnceCell<Arc<RenderSession>> =
    once_cell::sync::OnceCell::new();

/// The renderer used when the caller injects none.
///
/// With the `chromium` feature this is one process-wide [`RenderSession`],
/// created on first call with the options given then; later calls reuse it
/// regardless of their options. Dispose it with [`shutdown_shared_session`].
#[cfg(feature = "chromium")]
pub fn default_renderer(options: &DiagramOptions) -> Arc<dyn DiagramRenderer> {
    let session = SHARED_SESSION.get_or_init(|| {
        let engine = super::chromium::ChromiumEngine::new(options.chrome_executable.clone());
        Arc::new(RenderSession::new(Box::new(engine), options.clone()))
    });
    Arc::clone(session) as Arc<dyn DiagramRenderer>
}

#[cfg(not(feature = "chromium"))]
pub fn default_renderer(_options: &DiagramOptions) -> Arc<dyn DiagramRenderer> {
    Arc::new(UnavailableRenderer::new("built without the `chromium` feature"))
}

/// Close the process-wide session if it was ever created. Safe to call
/// repeatedly and when no conversion ran.
#[cfg(feature = "chromium")]
pub async fn shutdown_shared_session() {
    if let Some(session) = SHARED_SESSION.get() {
        session.close().await;
    }
}

#[cfg(not(feature = "chromium"))]
pub async fn shutdown_shared_session() {}
