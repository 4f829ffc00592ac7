//! Chromium backend for [`super::session::HeadlessEngine`] via `chromiumoxide`.
//!
//! The CDP handler stream must be polled for the browser to make progress, so
//! [`ChromiumEngine::launch`] spawns a task draining it for the lifetime of
//! the session. Closing the session closes the browser, waits for the child
//! process and aborts the task.

use super::session::{HeadlessEngine, HeadlessPage, HeadlessSession};
use crate::error::DiagramError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launches a headless Chrome/Chromium found on the system (or at an
/// explicit executable path).
pub struct ChromiumEngine {
    executable: Option<PathBuf>,
}

impl ChromiumEngine {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl HeadlessEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Box<dyn HeadlessSession>, DiagramError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu");
        if let Some(ref path) = self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| DiagramError::SessionUnavailable { detail: e })?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| DiagramError::SessionUnavailable {
                    detail: e.to_string(),
                })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        debug!("Chromium launched");
        Ok(Box::new(ChromiumSession {
            browser: Mutex::new(Some(browser)),
            handler_task: std::sync::Mutex::new(Some(handler_task)),
        }))
    }
}

struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    handler_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl HeadlessSession for ChromiumSession {
    async fn new_page(&self) -> Result<Box<dyn HeadlessPage>, DiagramError> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(DiagramError::SessionClosed)?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(DiagramError::engine)?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), DiagramError> {
        let browser = self.browser.lock().await.take();
        let mut result = Ok(());
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                result = Err(DiagramError::engine(e));
            }
            if let Err(e) = browser.wait().await {
                warn!("Waiting for Chromium to exit failed: {}", e);
            }
        }
        let task = match self.handler_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
        result
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl HeadlessPage for ChromiumPage {
    async fn set_content(&mut self, html: &str) -> Result<(), DiagramError> {
        self.page
            .set_content(html)
            .await
            .map_err(DiagramError::engine)?;
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DiagramError> {
        let page = &self.page;
        let poll = async {
            loop {
                if page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| DiagramError::Timeout {
                ms: timeout.as_millis() as u64,
            })
    }

    async fn attribute(
        &mut self,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, DiagramError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(DiagramError::engine)?;
        element.attribute(name).await.map_err(DiagramError::engine)
    }

    async fn screenshot_element(&mut self, selector: &str) -> Result<Vec<u8>, DiagramError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(DiagramError::engine)?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(DiagramError::engine)
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.page.close().await {
            debug!("Closing diagram page failed: {}", e);
        }
    }
}
