use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::Handler;
use chromiumoxide::{Browser, BrowserConfig, Page};
use flathunt_core::error::AppError;
use flathunt_core::traits::{PageRenderer, RenderRequest, RenderedPage};
use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/93.0.4577.82 Safari/537.36";

const FORBIDDEN: i64 = 403;

/// Headless-browser renderer using Chromium via the Chrome DevTools Protocol.
///
/// Every [`PageRenderer::render`] call launches its own Chromium process,
/// renders one page and shuts the process down again, so no cookies or
/// storage survive between listings.
///
/// # Example
///
/// ```rust,no_run
/// use flathunt_client::BrowserRenderer;
/// use flathunt_core::traits::{PageRenderer, RenderRequest};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let renderer = BrowserRenderer::new();
/// let page = renderer
///     .render(RenderRequest {
///         url: "https://example.com",
///         script: "() => document.title",
///     })
///     .await?;
/// println!("{:?}", page.script_result);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BrowserRenderer {
    timeout: Duration,
    chrome_binary: Option<PathBuf>,
}

impl BrowserRenderer {
    /// Renderer with a **30 s** page timeout.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH` (or the
    /// default locations checked by `chromiumoxide`).
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Renderer with a custom page timeout, covering navigation, script
    /// evaluation and content retrieval.
    pub fn with_timeout(timeout: Duration) -> Self {
        let chrome_binary = Self::find_chrome_binary();
        if let Some(bin) = &chrome_binary {
            tracing::info!("Using Chrome binary: {}", bin.display());
        }
        Self {
            timeout,
            chrome_binary,
        }
    }

    /// Launch a fresh browser and keep its CDP handler polled.
    async fn launch(&self) -> Result<(Browser, JoinHandle<()>), AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .request_timeout(self.timeout);
        if let Some(bin) = &self.chrome_binary {
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .arg(format!("--user-agent={USER_AGENT}"))
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        Ok((browser, tokio::spawn(drive_handler(handler))))
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via **snap**, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
    /// We look for the real binary inside the snap first, then fall back to
    /// well-known system paths. If nothing is found we return `None` and let
    /// `chromiumoxide` do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }
}

impl Default for BrowserRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for BrowserRenderer {
    async fn render(&self, request: RenderRequest<'_>) -> Result<RenderedPage, AppError> {
        let (mut browser, handler_task) = self.launch().await?;

        let result =
            tokio::time::timeout(self.timeout, load_page(&browser, request, self.timeout)).await;

        // Tear the session down whatever happened to the page.
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Failed to close browser");
        }
        let _ = browser.wait().await;
        handler_task.abort();

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}

/// The CDP handler must be polled continuously for the connection to work.
async fn drive_handler(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if event.is_err() {
            tracing::debug!("Browser CDP handler error: {event:?}");
            break;
        }
    }
}

/// Map a CDP failure, keeping chromiumoxide's own request deadline a timeout.
fn page_error(error: CdpError, timeout: Duration, context: impl FnOnce(CdpError) -> AppError) -> AppError {
    match error {
        CdpError::Timeout => AppError::Timeout(timeout.as_secs()),
        other => context(other),
    }
}

async fn load_page(
    browser: &Browser,
    request: RenderRequest<'_>,
    timeout: Duration,
) -> Result<RenderedPage, AppError> {
    let url = request.url;
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| {
            page_error(e, timeout, |e| AppError::BrowserError(format!("Failed to open tab: {e}")))
        })?;

    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| AppError::BrowserError(format!("Failed to watch responses: {e}")))?;

    let navigation = page.goto(url).await.map(|_| ());

    // Responses arrive before navigation completes, so they are already queued.
    while let Some(Some(event)) = responses.next().now_or_never() {
        if event.response.url == url && event.response.status == FORBIDDEN {
            return Err(AppError::PermissionDenied {
                url: url.to_string(),
            });
        }
    }

    navigation.map_err(|e| {
        page_error(e, timeout, |e| {
            AppError::HttpError(format!("Failed to navigate to {url}: {e}"))
        })
    })?;

    let script_result = evaluate(&page, request.script, timeout).await?;
    let content = page.content().await.map_err(|e| {
        page_error(e, timeout, |e| {
            AppError::BrowserError(format!("Failed to read page content: {e}"))
        })
    })?;

    Ok(RenderedPage {
        script_result,
        content,
    })
}

/// Call a JavaScript function in the page and keep a string result.
async fn evaluate(page: &Page, script: &str, timeout: Duration) -> Result<Option<String>, AppError> {
    let params = EvaluateParams::builder()
        .expression(format!("({script})()"))
        .return_by_value(true)
        .await_promise(true)
        .build()
        .map_err(|e| AppError::BrowserError(format!("Invalid script: {e}")))?;

    let result = page
        .evaluate_expression(params)
        .await
        .map_err(|e| {
            page_error(e, timeout, |e| {
                AppError::BrowserError(format!("Script evaluation failed: {e}"))
            })
        })?;

    Ok(result
        .value()
        .and_then(|v| v.as_str())
        .map(str::to_string))
}
