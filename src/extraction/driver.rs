//! Browser boundary
//!
//! The engine only talks to the page through [`PageDriver`]. `ChromiumPage`
//! is the production implementation; tests drive the engine with scripted
//! snapshots instead.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use log::{debug, warn};
use serde::Deserialize;

use super::errors::{ExtractionError, ExtractionResult};
use super::js_scripts::{
    PAGE_METRICS_SCRIPT, SNAPSHOT_SCRIPT, scroll_by_script, scroll_to_bottom_script,
    scroll_to_script,
};
use super::page_timeout::with_page_timeout;
use super::snapshot::{DomSnapshot, RawNode};

/// How long navigation waits before handing the page to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// `goto` plus the load event, bounded by the navigation timeout
    Full,
    /// `goto` without waiting for load, then a fixed settle delay
    Degraded,
}

/// Where to scroll
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    Top,
    /// Past the current document height by `margin` pixels
    Bottom { margin: u32 },
    /// Relative offset, negative scrolls up
    By(f64),
}

/// Scroll geometry of the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct PageMetrics {
    pub scroll_height: f64,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default)]
    pub viewport_height: f64,
}

/// Operations the extraction engine needs from a browser page
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, strategy: WaitStrategy) -> ExtractionResult<()>;

    async fn reload(&self) -> ExtractionResult<()>;

    async fn scroll(&self, target: ScrollTarget) -> ExtractionResult<()>;

    async fn metrics(&self) -> ExtractionResult<PageMetrics>;

    async fn snapshot(&self) -> ExtractionResult<DomSnapshot>;
}

/// Navigate with the full strategy, falling back once to the degraded one
///
/// # Errors
///
/// Returns `ExtractionError::Navigation` when both attempts fail.
pub async fn open_with_fallback(driver: &dyn PageDriver, url: &str) -> ExtractionResult<()> {
    let first = match driver.navigate(url, WaitStrategy::Full).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    warn!("Full navigation to {url} failed ({first}), retrying with degraded wait");

    driver
        .navigate(url, WaitStrategy::Degraded)
        .await
        .map_err(|second| ExtractionError::Navigation {
            url: url.to_string(),
            reason: format!("{first}; degraded retry: {second}"),
        })
}

/// [`PageDriver`] over a chromiumoxide page
#[derive(Debug, Clone)]
pub struct ChromiumPage {
    page: Page,
    navigation_timeout: Duration,
    script_timeout: Duration,
    degraded_settle: Duration,
}

impl ChromiumPage {
    #[must_use]
    pub fn new(page: Page, config: &crate::config::ExtractionConfig) -> Self {
        Self {
            page,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs()),
            script_timeout: Duration::from_secs(config.script_timeout_secs()),
            degraded_settle: config.degraded_settle(),
        }
    }

    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(
        &self,
        script: &str,
        name: &str,
    ) -> ExtractionResult<T> {
        let result = with_page_timeout(
            async {
                self.page
                    .evaluate(script)
                    .await
                    .map_err(|e| ExtractionError::Browser(format!("{name}: {e}")))
            },
            self.script_timeout,
            name,
        )
        .await?;

        result
            .into_value::<T>()
            .map_err(|e| ExtractionError::Script(format!("{name}: {e}")))
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str, strategy: WaitStrategy) -> ExtractionResult<()> {
        match strategy {
            WaitStrategy::Full => {
                with_page_timeout(
                    async {
                        self.page
                            .goto(url)
                            .await
                            .map_err(|e| ExtractionError::Browser(e.to_string()))?;
                        self.page
                            .wait_for_navigation()
                            .await
                            .map_err(|e| ExtractionError::Browser(e.to_string()))?;
                        Ok(())
                    },
                    self.navigation_timeout,
                    "Page navigation",
                )
                .await
            }
            WaitStrategy::Degraded => {
                let target = serde_json::to_string(url)
                    .map_err(|e| ExtractionError::Config(e.to_string()))?;
                let script = format!("(() => {{ window.location.href = {target}; return true; }})()");
                let _: bool = self.evaluate(&script, "Degraded navigation").await?;
                debug!("Degraded navigation issued, settling {:?}", self.degraded_settle);
                tokio::time::sleep(self.degraded_settle).await;
                Ok(())
            }
        }
    }

    async fn reload(&self) -> ExtractionResult<()> {
        with_page_timeout(
            async {
                self.page
                    .reload()
                    .await
                    .map_err(|e| ExtractionError::Browser(e.to_string()))?;
                self.page
                    .wait_for_navigation()
                    .await
                    .map_err(|e| ExtractionError::Browser(e.to_string()))?;
                Ok(())
            },
            self.navigation_timeout,
            "Page reload",
        )
        .await
    }

    async fn scroll(&self, target: ScrollTarget) -> ExtractionResult<()> {
        let script = match target {
            ScrollTarget::Top => scroll_to_script(0.0),
            ScrollTarget::Bottom { margin } => scroll_to_bottom_script(margin),
            ScrollTarget::By(dy) => scroll_by_script(dy),
        };
        let _: bool = self.evaluate(&script, "Scroll").await?;
        Ok(())
    }

    async fn metrics(&self) -> ExtractionResult<PageMetrics> {
        self.evaluate(PAGE_METRICS_SCRIPT, "Page metrics").await
    }

    async fn snapshot(&self) -> ExtractionResult<DomSnapshot> {
        let raw: Vec<RawNode> = self.evaluate(SNAPSHOT_SCRIPT, "DOM snapshot").await?;
        DomSnapshot::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct FlakyNav {
        fail_full: bool,
        fail_degraded: bool,
        calls: Mutex<Vec<WaitStrategy>>,
    }

    #[async_trait]
    impl PageDriver for FlakyNav {
        async fn navigate(&self, _url: &str, strategy: WaitStrategy) -> ExtractionResult<()> {
            self.calls.lock().unwrap().push(strategy);
            let fail = match strategy {
                WaitStrategy::Full => self.fail_full,
                WaitStrategy::Degraded => self.fail_degraded,
            };
            if fail {
                Err(ExtractionError::Timeout { operation: "nav".into(), timeout_ms: 1 })
            } else {
                Ok(())
            }
        }
        async fn reload(&self) -> ExtractionResult<()> {
            Ok(())
        }
        async fn scroll(&self, _target: ScrollTarget) -> ExtractionResult<()> {
            Ok(())
        }
        async fn metrics(&self) -> ExtractionResult<PageMetrics> {
            Ok(PageMetrics::default())
        }
        async fn snapshot(&self) -> ExtractionResult<DomSnapshot> {
            Ok(DomSnapshot::default())
        }
    }

    #[tokio::test]
    async fn degraded_retry_rescues_navigation() {
        let driver = FlakyNav { fail_full: true, ..FlakyNav::default() };
        open_with_fallback(&driver, "https://example.com").await.unwrap();
        assert_eq!(
            *driver.calls.lock().unwrap(),
            vec![WaitStrategy::Full, WaitStrategy::Degraded]
        );
    }

    #[tokio::test]
    async fn second_failure_is_navigation_error() {
        let driver = FlakyNav { fail_full: true, fail_degraded: true, ..FlakyNav::default() };
        let err = open_with_fallback(&driver, "https://example.com").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Navigation { .. }));
        assert!(err.is_fatal());
    }
}
