//! Browser session abstraction and its Chrome DevTools implementation.

use crate::errors::AutomationError;
use crate::selector::Selector;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use crate::wait::poll_until;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// The page-level operations the sign-in flow needs from a browser.
///
/// Implementations report a missing element as
/// [`AutomationError::ElementNotFound`]; waiting is the caller's business
/// (see [`crate::Locator`]).
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url` and wait, at most `timeout`, for the document to load.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError>;

    /// URL currently shown by the page.
    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Whether an element matching `selector` is currently in the document.
    async fn is_present(&self, selector: &Selector) -> Result<bool, AutomationError>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// Replace the value of the input matching `selector`.
    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError>;

    /// Write a PNG of the full page to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), AutomationError>;

    /// Tear the browser down. Called once, by the session owner.
    async fn close(&mut self) -> Result<(), AutomationError>;
}

/// Produces a fresh [`BrowserSession`] for one sign-in attempt.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, AutomationError>;
}

/// Launches a local Chrome/Chromium over the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub window: (u32, u32),
    pub request_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            window: (1920, 1080),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ChromeLauncher {
    fn config(&self) -> Result<BrowserConfig, AutomationError> {
        let (width, height) = self.window;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Default::default()
            })
            .request_timeout(self.request_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(AutomationError::Launch)
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    #[instrument(level = "debug", skip(self), fields(headless = self.headless))]
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, AutomationError> {
        let (browser, mut handler) = Browser::launch(self.config()?)
            .await
            .map_err(|e| AutomationError::Launch(e.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler stopped: {e}");
                    break;
                }
            }
        });
        let page = browser.new_page("about:blank").await?;
        info!("browser session started");
        Ok(Box::new(ChromeSession {
            browser,
            handler_task,
            page,
            closed: false,
        }))
    }
}

/// One Chrome instance with a single page.
pub struct ChromeSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    closed: bool,
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

const NETWORK_QUIET: Duration = Duration::from_millis(500);
const NETWORK_POLL: Duration = Duration::from_millis(100);

/// Tracks the page's resource count and reports idle once it has stayed
/// unchanged for the quiet period.
#[derive(Debug)]
struct NetworkQuiet {
    quiet: Duration,
    last: Option<(u64, Instant)>,
}

impl NetworkQuiet {
    fn new(quiet: Duration) -> Self {
        Self { quiet, last: None }
    }

    fn observe(&mut self, resources: u64, now: Instant) -> bool {
        match self.last {
            Some((count, since)) if count == resources => now.duration_since(since) >= self.quiet,
            _ => {
                self.last = Some((resources, now));
                false
            }
        }
    }
}

impl ChromeSession {
    /// Resources fetched so far, or `None` while the document is still loading.
    async fn resource_count(&self) -> Option<u64> {
        let js = "document.readyState === 'complete' \
                  ? performance.getEntriesByType('resource').length : -1";
        let count = self
            .page
            .evaluate(js)
            .await
            .ok()?
            .into_value::<i64>()
            .ok()?;
        u64::try_from(count).ok()
    }

    /// Wait, at most `timeout`, until no new resource was fetched for `NETWORK_QUIET`.
    async fn wait_for_network_idle(&self, timeout: Duration) -> bool {
        let tracker = Mutex::new(NetworkQuiet::new(NETWORK_QUIET));
        let tracker = &tracker;
        poll_until(timeout, NETWORK_POLL, move || async move {
            let count = self.resource_count().await?;
            let mut tracker = tracker.lock().ok()?;
            tracker.observe(count, Instant::now()).then_some(())
        })
        .await
        .is_some()
    }

    async fn eval_bool(&self, js: String) -> Result<bool, AutomationError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| AutomationError::Script(e.to_string()))?
            .into_value::<bool>()
            .map_err(|e| AutomationError::Script(e.to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    #[instrument(level = "debug", skip(self))]
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError> {
        let started = Instant::now();
        // `goto` resolves once the load event fired.
        let navigate = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| AutomationError::Navigation(e.to_string()))?;
            Ok::<(), AutomationError>(())
        };
        tokio::time::timeout(timeout, navigate)
            .await
            .map_err(|_| AutomationError::Timeout(format!("loading {url} took over {timeout:?}")))??;

        let remaining = timeout.saturating_sub(started.elapsed());
        if !self.wait_for_network_idle(remaining).await {
            warn!("network still busy {timeout:?} after opening {url}, continuing");
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn is_present(&self, selector: &Selector) -> Result<bool, AutomationError> {
        if let Selector::Invalid(reason) = selector {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }
        self.eval_bool(format!("({}) !== null", selector.to_js())).await
    }

    #[instrument(level = "debug", skip(self), fields(selector = %selector))]
    async fn click(&self, selector: &Selector) -> Result<(), AutomationError> {
        let js = format!(
            "(() => {{ const el = {}; if (!el) return false; \
             try {{ el.scrollIntoView({{ block: 'center' }}); }} catch (_) {{}} \
             el.click(); return true; }})()",
            selector.to_js()
        );
        if self.eval_bool(js).await? {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound(selector.to_string()))
        }
    }

    #[instrument(level = "debug", skip(self, value), fields(selector = %selector))]
    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        let value = serde_json::to_string(value)
            .map_err(|e| AutomationError::Script(e.to_string()))?;
        // Frameworks listen for input/change rather than reading .value directly.
        let js = format!(
            "(() => {{ const el = {}; if (!el) return false; \
             try {{ el.focus(); }} catch (_) {{}} \
             el.value = {value}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true; }})()",
            selector.to_js()
        );
        if self.eval_bool(js).await? {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound(selector.to_string()))
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn screenshot(&self, path: &Path) -> Result<(), AutomationError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(|e| AutomationError::Screenshot(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        if self.closed {
            warn!("browser session already closed");
            return Ok(());
        }
        self.closed = true;
        self.browser.close().await?;
        if let Err(e) = self.browser.wait().await {
            warn!("browser process did not exit cleanly: {e}");
        }
        self.handler_task.abort();
        info!("browser session closed");
        Ok(())
    }
}
