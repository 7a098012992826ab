//! Scroll-driven pagination
//!
//! The record list is virtualized and loads more entries when the viewport
//! nears the bottom. One pagination cycle scrolls down and waits for growth,
//! escalating through a jiggle and a full reset before declaring a stall.

use log::{debug, trace};
use tokio::time::Instant;

use super::discovery::DiscoveryChain;
use super::driver::{PageDriver, ScrollTarget};
use super::errors::ExtractionResult;
use crate::config::ExtractionConfig;

/// Page height and discovered record count at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrowthProbe {
    pub height: f64,
    pub records: usize,
}

impl GrowthProbe {
    #[must_use]
    pub fn grew_since(&self, before: &Self) -> bool {
        self.height > before.height || self.records > before.records
    }
}

/// Which step of a cycle produced growth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    Grew,
    GrewAfterJiggle,
    GrewAfterReset,
    Stalled,
}

impl ScrollOutcome {
    #[must_use]
    pub const fn is_stalled(self) -> bool {
        matches!(self, Self::Stalled)
    }
}

pub struct Paginator<'a> {
    driver: &'a dyn PageDriver,
    chain: &'a DiscoveryChain,
    config: &'a ExtractionConfig,
}

impl<'a> Paginator<'a> {
    #[must_use]
    pub fn new(
        driver: &'a dyn PageDriver,
        chain: &'a DiscoveryChain,
        config: &'a ExtractionConfig,
    ) -> Self {
        Self {
            driver,
            chain,
            config,
        }
    }

    /// Measure the page right now
    pub async fn probe(&self) -> ExtractionResult<GrowthProbe> {
        let metrics = self.driver.metrics().await?;
        let snapshot = self.driver.snapshot().await?;
        Ok(GrowthProbe {
            height: metrics.scroll_height,
            records: self.chain.discover(&snapshot).len(),
        })
    }

    /// Run one pagination cycle starting from `before`
    pub async fn advance(&self, before: GrowthProbe) -> ExtractionResult<ScrollOutcome> {
        let bottom = ScrollTarget::Bottom {
            margin: self.config.scroll_margin_px(),
        };

        self.driver.scroll(bottom).await?;
        if self.wait_for_growth(&before).await? {
            return Ok(ScrollOutcome::Grew);
        }

        trace!("No growth after scroll, jiggling");
        self.driver
            .scroll(ScrollTarget::By(-f64::from(self.config.jiggle_offset_px())))
            .await?;
        tokio::time::sleep(self.config.jiggle_pause()).await;
        self.driver.scroll(bottom).await?;
        if self.wait_for_growth(&before).await? {
            return Ok(ScrollOutcome::GrewAfterJiggle);
        }

        trace!("No growth after jiggle, resetting scroll position");
        self.driver.scroll(ScrollTarget::Top).await?;
        tokio::time::sleep(self.config.jiggle_pause()).await;
        self.driver.scroll(bottom).await?;
        if self.wait_for_growth(&before).await? {
            return Ok(ScrollOutcome::GrewAfterReset);
        }

        debug!(
            "Scroll cycle stalled at height {} with {} records",
            before.height, before.records
        );
        Ok(ScrollOutcome::Stalled)
    }

    /// Poll until height or record count grows, bounded by `max_wait`
    async fn wait_for_growth(&self, before: &GrowthProbe) -> ExtractionResult<bool> {
        let deadline = Instant::now() + self.config.max_wait();
        loop {
            tokio::time::sleep(self.config.poll_interval()).await;
            if self.probe().await?.grew_since(before) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::extraction::driver::{PageMetrics, WaitStrategy};
    use crate::extraction::snapshot::DomSnapshot;

    /// Page whose height only grows after a given number of scroll-to-top calls
    struct LazyPage {
        grow_after_tops: usize,
        tops: Mutex<usize>,
        scrolls: Mutex<Vec<ScrollTarget>>,
    }

    #[async_trait]
    impl PageDriver for LazyPage {
        async fn navigate(&self, _: &str, _: WaitStrategy) -> ExtractionResult<()> {
            Ok(())
        }
        async fn reload(&self) -> ExtractionResult<()> {
            Ok(())
        }
        async fn scroll(&self, target: ScrollTarget) -> ExtractionResult<()> {
            if target == ScrollTarget::Top {
                *self.tops.lock().unwrap() += 1;
            }
            self.scrolls.lock().unwrap().push(target);
            Ok(())
        }
        async fn metrics(&self) -> ExtractionResult<PageMetrics> {
            let grown = *self.tops.lock().unwrap() >= self.grow_after_tops;
            Ok(PageMetrics {
                scroll_height: if grown { 2000.0 } else { 1000.0 },
                ..PageMetrics::default()
            })
        }
        async fn snapshot(&self) -> ExtractionResult<DomSnapshot> {
            Ok(DomSnapshot::default())
        }
    }

    fn setup(grow_after_tops: usize) -> (LazyPage, DiscoveryChain, ExtractionConfig) {
        let config = ExtractionConfig::default();
        let chain = DiscoveryChain::from_config(config.discovery());
        let page = LazyPage {
            grow_after_tops,
            tops: Mutex::new(0),
            scrolls: Mutex::new(Vec::new()),
        };
        (page, chain, config)
    }

    #[tokio::test(start_paused = true)]
    async fn reset_rescues_a_stuck_list() {
        let (page, chain, config) = setup(1);
        let paginator = Paginator::new(&page, &chain, &config);
        let before = paginator.probe().await.unwrap();
        let outcome = paginator.advance(before).await.unwrap();
        assert_eq!(outcome, ScrollOutcome::GrewAfterReset);

        let scrolls = page.scrolls.lock().unwrap();
        assert!(scrolls.contains(&ScrollTarget::By(-600.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn no_growth_is_stalled() {
        let (page, chain, config) = setup(usize::MAX);
        let paginator = Paginator::new(&page, &chain, &config);
        let before = paginator.probe().await.unwrap();
        assert!(paginator.advance(before).await.unwrap().is_stalled());
    }
}
