use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use futures::future::BoxFuture;
use jobsift_core::error::AppError;
use jobsift_core::traits::Fetcher;

/// Headless Chromium renderer for JS-heavy job pages.
///
/// Used as the renderer of the rendered-fallback step. One Chromium process
/// is shared by all clones; every fetch opens a tab, waits for `<body>`,
/// reads the DOM and closes the tab. `navigation_timeout` bounds the tab
/// work only; the pipeline applies its own outer wall-clock limit. A tab
/// whose fetch is dropped by that outer limit is closed in the background.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    navigation_timeout: Duration,
}

impl BrowserFetcher {
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(navigation_timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();
        if let Some(bin) = find_chrome_binary() {
            tracing::info!(path = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::Generic(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            navigation_timeout,
        })
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to open tab: {e}")))?;
        let tab = CloseOnDrop::new(page.clone(), close_page);

        let rendered = match tokio::time::timeout(self.navigation_timeout, read_page(&page, url)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.navigation_timeout.as_secs())),
        };

        tab.close().await;
        rendered
    }
}

async fn read_page(page: &Page, url: &str) -> Result<String, AppError> {
    page.goto(url)
        .await
        .map_err(|e| AppError::HttpError(format!("Failed to navigate to {url}: {e}")))?;
    page.find_element("body")
        .await
        .map_err(|e| AppError::HttpError(format!("Page did not render body: {e}")))?;
    page.content()
        .await
        .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))
}

fn close_page(page: Page) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close tab");
        }
    })
}

/// Owns a resource that needs an async close. `close` awaits it; dropping
/// without `close` spawns it on the current runtime.
struct CloseOnDrop<T: Send + 'static> {
    item: Option<T>,
    closer: fn(T) -> BoxFuture<'static, ()>,
}

impl<T: Send + 'static> CloseOnDrop<T> {
    fn new(item: T, closer: fn(T) -> BoxFuture<'static, ()>) -> Self {
        Self {
            item: Some(item),
            closer,
        }
    }

    async fn close(mut self) {
        if let Some(item) = self.item.take() {
            (self.closer)(item).await;
        }
    }
}

impl<T: Send + 'static> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take()
            && let Ok(runtime) = tokio::runtime::Handle::try_current()
        {
            runtime.spawn((self.closer)(item));
        }
    }
}

/// `CHROME_BIN`, then the real binary inside a snap (the snap wrapper drops
/// headless flags), then common install paths. `None` lets chromiumoxide look.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
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
        match tokio::time::timeout(self.navigation_timeout, self.render(url)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.navigation_timeout.as_secs())),
        }
    }
}
