// browser/chrome.rs
use crate::browser::{BrowserSession, USER_AGENT};
use crate::errors::CrawlError;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How the Chromium process is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Browser binary; found on the usual install paths when `None`.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub page_load_timeout: Duration,
}

/// One Chromium tab driven over the DevTools protocol.
///
/// The protocol client is async; the session owns a small runtime and blocks
/// on each call so the crawl loop stays synchronous.
pub struct ChromeSession {
    runtime: Runtime,
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    page_load_timeout: Duration,
    closed: bool,
}

impl ChromeSession {
    pub fn launch(options: &LaunchOptions) -> Result<Self, CrawlError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(options.page_load_timeout + Duration::from_secs(20))
            .window_size(1920, 1080)
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-notifications")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        builder = if options.headless {
            builder.headless_mode(HeadlessMode::default())
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| CrawlError::Browser(format!("Failed to build browser config: {e}")))?;

        let (browser, page, handler) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(config).await?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        debug!("Browser handler event error: {e}");
                    }
                }
                debug!("Browser handler task completed");
            });

            let page = browser.new_page("about:blank").await?;
            Ok::<_, CrawlError>((browser, page, handler))
        })?;

        info!(headless = options.headless, "Browser launched");

        Ok(Self {
            runtime,
            browser,
            page,
            handler,
            page_load_timeout: options.page_load_timeout,
            closed: false,
        })
    }

    fn evaluate<T: DeserializeOwned>(&self, expression: String) -> Result<T, CrawlError> {
        let result = self.runtime.block_on(self.page.evaluate(expression))?;
        result
            .into_value()
            .map_err(|e| CrawlError::Browser(format!("Unexpected script result: {e}")))
    }

    fn run_script(&self, expression: String) -> Result<(), CrawlError> {
        self.runtime.block_on(self.page.evaluate(expression))?;
        Ok(())
    }
}

/// `document.querySelector` call with `css` quoted as a JS string literal.
fn query(css: &str) -> String {
    let literal = serde_json::Value::from(css).to_string();
    format!("document.querySelector({literal})")
}

fn displayed_script(css: &str) -> String {
    let el = query(css);
    format!(
        "!!{el} && {el}.getClientRects().length > 0 \
         && window.getComputedStyle({el}).visibility !== 'hidden'"
    )
}

fn click_script(css: &str) -> String {
    let el = query(css);
    format!("{el} ? ({el}.click(), true) : false")
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), CrawlError> {
        debug!(url, "navigate");
        let page = &self.page;
        let loaded = self.runtime.block_on(async {
            tokio::time::timeout(self.page_load_timeout, async {
                page.goto(url).await?;
                page.wait_for_navigation().await?;
                Ok::<_, CrawlError>(())
            })
            .await
        });
        match loaded {
            Ok(result) => result,
            Err(_) => Err(CrawlError::Browser(format!(
                "page load of {url} exceeded {:?}",
                self.page_load_timeout
            ))),
        }
    }

    fn current_url(&mut self) -> Result<String, CrawlError> {
        self.runtime
            .block_on(self.page.url())?
            .ok_or_else(|| CrawlError::Browser("page has no url".into()))
    }

    fn page_source(&mut self) -> Result<String, CrawlError> {
        Ok(self.runtime.block_on(self.page.content())?)
    }

    fn is_present(&mut self, css: &str) -> Result<bool, CrawlError> {
        self.evaluate(format!("{} !== null", query(css)))
    }

    fn is_displayed(&mut self, css: &str) -> Result<bool, CrawlError> {
        self.evaluate(displayed_script(css))
    }

    fn click(&mut self, css: &str) -> Result<(), CrawlError> {
        let clicked: bool = self.evaluate(click_script(css))?;
        if clicked {
            Ok(())
        } else {
            Err(CrawlError::Browser(format!("no such element: {css}")))
        }
    }

    fn scroll_to_bottom(&mut self) -> Result<(), CrawlError> {
        self.run_script("window.scrollTo(0, document.body.scrollHeight)".into())
    }

    fn scroll_by(&mut self, pixels: i64) -> Result<(), CrawlError> {
        self.run_script(format!("window.scrollBy(0, {pixels})"))
    }

    fn document_height(&mut self) -> Result<i64, CrawlError> {
        self.evaluate("document.body.scrollHeight".into())
    }

    fn quit(&mut self) -> Result<(), CrawlError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let browser = &mut self.browser;
        let closed = self.runtime.block_on(async {
            browser.close().await?;
            browser.wait().await?;
            Ok::<_, CrawlError>(())
        });
        self.handler.abort();
        closed?;

        info!("Browser closed");
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.quit() {
                warn!("Failed to close browser on drop: {e}");
            }
        }
    }
}
