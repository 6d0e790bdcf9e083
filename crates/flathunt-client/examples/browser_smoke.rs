/// Smoke-test for `BrowserRenderer`.
///
/// Launches a headless Chromium against a listing URL (default
/// <https://example.com>) and prints what the source strategy script and the
/// page content look like.
///
/// Run with:
///   cargo run -p flathunt-client --example browser_smoke -- [URL]
use flathunt_client::BrowserRenderer;
use flathunt_core::traits::{PageRenderer, RenderRequest};

const TITLE_SCRIPT: &str = "() => document.querySelector('h1')?.innerText ?? null";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());

    println!("Rendering {url} in a fresh browser session");
    let renderer = BrowserRenderer::new();
    let page = renderer
        .render(RenderRequest {
            url: &url,
            script: TITLE_SCRIPT,
        })
        .await?;

    println!("Script result: {:?}", page.script_result);
    println!("Content: {} bytes", page.content.len());
    anyhow::ensure!(!page.content.is_empty(), "rendered page is empty");
    Ok(())
}
