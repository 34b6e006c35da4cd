use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use harvest_core::error::AppError;

use crate::fetcher::{Fetcher, random_user_agent};
use crate::listing::RESULT_SELECTOR;

/// Options for launching the browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Navigation plus render budget per page.
    pub timeout: Duration,
    /// Element whose presence marks a page as rendered.
    pub ready_selector: String,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: Duration::from_secs(30),
            ready_selector: RESULT_SELECTOR.to_string(),
        }
    }
}

/// Fetcher driving a Chromium instance over the DevTools protocol.
///
/// Pages are rendered before their HTML is returned, for result pages that
/// only fill in through scripts. One browser process is shared by all
/// clones; every fetch opens and closes its own tab.
///
/// ```rust,no_run
/// use harvest_client::{BrowserFetcher, BrowserOptions, Fetcher};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = BrowserFetcher::launch(BrowserOptions::default()).await?;
/// let html = fetcher.fetch("https://www.amazon.in/s?k=laptop&page=1").await?;
/// println!("{} bytes", html.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    options: BrowserOptions,
}

impl BrowserFetcher {
    /// Launch Chromium. Needs a Chrome/Chromium binary on `$PATH`, in a
    /// well-known location, or named by `CHROME_BIN`.
    pub async fn launch(options: BrowserOptions) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .window_size(1920, 1080);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        if options.headless {
            builder = builder.arg("--headless=new");
        }

        let config = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg(format!("--user-agent={}", random_user_agent()))
            .build()
            .map_err(|e| AppError::SetupError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::SetupError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            options,
        })
    }
}

/// Chrome/Chromium binary to use, or `None` to let chromiumoxide search.
///
/// The snap wrapper at `/snap/bin/chromium` drops unknown flags, so the
/// real binary inside the snap is preferred.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }
    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let timeout = self.options.timeout;
        let ready = self.options.ready_selector.as_str();

        let result = tokio::time::timeout(timeout, async {
            let page = self
                .browser
                .new_page(url)
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to navigate to {url}: {e}")))?;

            if let Err(e) = page.find_element(ready).await {
                // An empty result page still returns its HTML.
                tracing::debug!(%url, selector = ready, error = %e, "Ready marker not found");
            }

            let html = page
                .content()
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")));
            let _ = page.close().await;
            html
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }
}
