use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::config::ExtractionConfig;
use crate::extraction::{
    ChromiumPage, DomSnapshot, ExtractionResult, PageDriver, PageMetrics, ScrollTarget,
    WaitStrategy,
};
use crate::utils::constants::CHROME_USER_AGENT;

/// Hides the most common automation fingerprints before any page script runs.
const MASK_AUTOMATION_SCRIPT: &str = r"
    Object.defineProperty(navigator, 'webdriver', { get: () => false });
    Object.defineProperty(navigator, 'languages', { get: () => ['pt-BR', 'pt', 'en-US', 'en'] });
    if (!window.chrome) { window.chrome = {}; }
    if (!window.chrome.runtime) { window.chrome.runtime = {}; }
";

/// Environment variable naming an explicit browser binary
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

#[cfg(target_os = "windows")]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files\Chromium\Application\chrome.exe",
];

#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "~/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/homebrew/bin/chromium",
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/snap/bin/chromium",
    "/usr/local/bin/chromium",
    "/opt/google/chrome/chrome",
];

/// Binary names probed on `PATH` when no install location matches
const PATH_NAMES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

/// Flags every mission browser starts with
///
/// They keep the page stable under long unattended scrolling: no
/// throttling of background renderers, no prompts, no first-run UI.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-dev-shm-usage",
    "--disable-setuid-sandbox",
    "--no-sandbox",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--disable-extensions",
    "--disable-features=TranslateUI",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--use-mock-keychain",
    "--mute-audio",
];

/// Locate an installed Chrome or Chromium.
///
/// Order: `CHROMIUM_PATH`, the platform install locations, then `PATH`.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from) {
        if path.exists() {
            info!(path = %path.display(), "Using browser from {CHROMIUM_PATH_ENV}");
            return Ok(path);
        }
        warn!(path = %path.display(), "{CHROMIUM_PATH_ENV} does not exist, ignoring it");
    }

    if let Some(path) = INSTALL_LOCATIONS
        .iter()
        .filter_map(|candidate| resolve_location(candidate))
        .find(|path| path.exists())
    {
        info!(path = %path.display(), "Found installed browser");
        return Ok(path);
    }

    if let Some(path) = PATH_NAMES.iter().find_map(|name| which(name)) {
        info!(path = %path.display(), "Found browser on PATH");
        return Ok(path);
    }

    Err(anyhow::anyhow!("no Chrome/Chromium executable found"))
}

/// Expand `~/` and `%VAR%` in an install location
fn resolve_location(candidate: &str) -> Option<PathBuf> {
    if let Some(rest) = candidate.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    if candidate.contains('%') {
        return Some(PathBuf::from(expand_windows_env_vars(candidate)));
    }
    Some(PathBuf::from(candidate))
}

fn which(name: &str) -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return None;
    }
    let output = Command::new("which").arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!found.is_empty()).then(|| PathBuf::from(found))
}

/// Expand `%VAR%` tokens. Unknown variables and unterminated tokens are kept as-is.
fn expand_windows_env_vars(path: &str) -> String {
    let mut expanded = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(open) = rest.find('%') {
        expanded.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('%') else {
            expanded.push_str(&rest[open..]);
            return expanded;
        };
        let name = &after[..close];
        match std::env::var(name) {
            Ok(value) if !name.is_empty() => expanded.push_str(&value),
            _ if name.is_empty() => expanded.push('%'),
            _ => {
                expanded.push('%');
                expanded.push_str(name);
                expanded.push('%');
            }
        }
        rest = &after[close + 1..];
    }

    expanded.push_str(rest);
    expanded
}

/// Fetch a managed Chromium into `<cache>/mission_scrape/chromium`.
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mission_scrape")
        .join("chromium");
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create {}", cache_dir.display()))?;

    info!(dir = %cache_dir.display(), "No local browser, downloading Chromium");
    let options = BrowserFetcherOptions::builder()
        .with_path(&cache_dir)
        .build()
        .context("Invalid browser fetcher options")?;
    let installed = BrowserFetcher::new(options)
        .fetch()
        .await
        .context("Chromium download failed")?;

    info!(path = %installed.executable_path.display(), "Chromium ready");
    Ok(installed.executable_path)
}

/// CDP errors chromiumoxide raises for events it cannot deserialize
fn is_benign_cdp_error(message: &str) -> bool {
    message.contains("data did not match any variant of untagged enum Message")
        || message.contains("Failed to deserialize WS response")
}

/// Start a browser with the given profile directory.
///
/// Falls back to a managed download when nothing is installed. The returned
/// task drives the CDP connection and must outlive every page.
pub async fn launch_browser(
    headless: bool,
    user_data_dir: PathBuf,
) -> Result<(Browser, JoinHandle<()>)> {
    let executable = match find_browser_executable().await {
        Ok(path) => path,
        Err(e) => {
            debug!("{e}");
            download_managed_browser().await?
        }
    };
    std::fs::create_dir_all(&user_data_dir)
        .with_context(|| format!("Failed to create profile {}", user_data_dir.display()))?;

    let mut builder = BrowserConfigBuilder::default()
        .chrome_executable(executable)
        .user_data_dir(user_data_dir)
        .window_size(1920, 1080)
        .request_timeout(Duration::from_secs(30))
        .arg(format!("--user-agent={CHROME_USER_AGENT}"));
    builder = if headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };
    for arg in LAUNCH_ARGS {
        builder = builder.arg(*arg);
    }
    let browser_config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            match event {
                Err(e) if is_benign_cdp_error(&e.to_string()) => trace!("Ignored CDP error: {e}"),
                Err(e) => error!("CDP handler error: {e:?}"),
                Ok(()) => {}
            }
        }
        debug!("CDP handler finished");
    });

    Ok((browser, handler_task))
}

/// One browser with one page, owned by a single mission worker.
///
/// Dropping the session stops the CDP handler and removes the profile
/// directory. The browser process itself is killed when `Browser` drops.
pub struct BrowserSession {
    page: ChromiumPage,
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
}

impl BrowserSession {
    pub async fn open(config: &ExtractionConfig) -> Result<Self> {
        let user_data_dir =
            std::env::temp_dir().join(format!("mission_scrape_chrome_{}", uuid::Uuid::new_v4()));

        let (browser, handler) = launch_browser(config.headless(), user_data_dir.clone()).await?;

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;
        page.evaluate_on_new_document(MASK_AUTOMATION_SCRIPT)
            .await
            .context("Failed to install automation mask")?;

        info!(profile = %user_data_dir.display(), "Browser session ready");
        Ok(Self {
            page: ChromiumPage::new(page, config),
            browser,
            handler,
            user_data_dir,
        })
    }

    /// Close the browser gracefully
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {e}");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            trace!("Profile directory not removed: {e}");
        }
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, url: &str, strategy: WaitStrategy) -> ExtractionResult<()> {
        self.page.navigate(url, strategy).await
    }

    async fn reload(&self) -> ExtractionResult<()> {
        self.page.reload().await
    }

    async fn scroll(&self, target: ScrollTarget) -> ExtractionResult<()> {
        self.page.scroll(target).await
    }

    async fn metrics(&self) -> ExtractionResult<PageMetrics> {
        self.page.metrics().await
    }

    async fn snapshot(&self) -> ExtractionResult<DomSnapshot> {
        self.page.snapshot().await
    }
}
