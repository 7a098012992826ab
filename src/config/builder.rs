//! Fluent builder for `ExtractionConfig`
//!
//! Every field has a default, so unlike a typestate builder there is no
//! required ordering. `build()` is where ranges are validated and the contact
//! pattern is compiled.

use regex::Regex;

use super::types::{DiscoveryConfig, ExtractionConfig, FieldConfig};
use crate::extraction::{ExtractionError, ExtractionResult};
use crate::utils::DEFAULT_SEARCH_URL;

#[derive(Debug, Clone)]
pub struct ExtractionConfigBuilder {
    search_url: String,
    headless: bool,
    poll_interval_ms: u64,
    max_wait_ms: u64,
    scroll_margin_px: u32,
    jiggle_offset_px: u32,
    jiggle_pause_ms: u64,
    empty_poll_patience: u32,
    stall_patience: u32,
    max_reloads: u32,
    batch_size: usize,
    reload_every_saved: u64,
    max_scroll_attempts: u32,
    max_execution_secs: u64,
    quota_check_every_saved: u64,
    navigation_timeout_secs: u64,
    degraded_settle_ms: u64,
    script_timeout_secs: u64,
    discovery: DiscoveryConfig,
    fields: FieldConfig,
}

impl Default for ExtractionConfigBuilder {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            headless: true,
            poll_interval_ms: 250,
            max_wait_ms: 4_000,
            scroll_margin_px: 1_000,
            jiggle_offset_px: 600,
            jiggle_pause_ms: 500,
            empty_poll_patience: 5,
            stall_patience: 5,
            max_reloads: 3,
            batch_size: 25,
            reload_every_saved: 200,
            max_scroll_attempts: 400,
            max_execution_secs: 30 * 60,
            quota_check_every_saved: 10,
            navigation_timeout_secs: 30,
            degraded_settle_ms: 3_000,
            script_timeout_secs: 15,
            discovery: DiscoveryConfig::default(),
            fields: FieldConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Create a builder for configuring an `ExtractionConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder::default()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let defaults = ExtractionConfigBuilder::default();
        Self {
            phone_regex: super::default_phone_regex().clone(),
            search_url: defaults.search_url,
            headless: defaults.headless,
            poll_interval_ms: defaults.poll_interval_ms,
            max_wait_ms: defaults.max_wait_ms,
            scroll_margin_px: defaults.scroll_margin_px,
            jiggle_offset_px: defaults.jiggle_offset_px,
            jiggle_pause_ms: defaults.jiggle_pause_ms,
            empty_poll_patience: defaults.empty_poll_patience,
            stall_patience: defaults.stall_patience,
            max_reloads: defaults.max_reloads,
            batch_size: defaults.batch_size,
            reload_every_saved: defaults.reload_every_saved,
            max_scroll_attempts: defaults.max_scroll_attempts,
            max_execution_secs: defaults.max_execution_secs,
            quota_check_every_saved: defaults.quota_check_every_saved,
            navigation_timeout_secs: defaults.navigation_timeout_secs,
            degraded_settle_ms: defaults.degraded_settle_ms,
            script_timeout_secs: defaults.script_timeout_secs,
            discovery: defaults.discovery,
            fields: defaults.fields,
        }
    }
}

impl ExtractionConfigBuilder {
    #[must_use]
    pub fn search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait_ms = ms;
        self
    }

    #[must_use]
    pub fn scroll_margin_px(mut self, px: u32) -> Self {
        self.scroll_margin_px = px;
        self
    }

    /// Set the jiggle step: how far to scroll up and how long to pause
    #[must_use]
    pub fn jiggle(mut self, offset_px: u32, pause_ms: u64) -> Self {
        self.jiggle_offset_px = offset_px;
        self.jiggle_pause_ms = pause_ms;
        self
    }

    #[must_use]
    pub fn empty_poll_patience(mut self, polls: u32) -> Self {
        self.empty_poll_patience = polls;
        self
    }

    #[must_use]
    pub fn stall_patience(mut self, cycles: u32) -> Self {
        self.stall_patience = cycles;
        self
    }

    #[must_use]
    pub fn max_reloads(mut self, reloads: u32) -> Self {
        self.max_reloads = reloads;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Force a maintenance reload every `saved` records (0 disables it)
    #[must_use]
    pub fn reload_every_saved(mut self, saved: u64) -> Self {
        self.reload_every_saved = saved;
        self
    }

    #[must_use]
    pub fn max_scroll_attempts(mut self, attempts: u32) -> Self {
        self.max_scroll_attempts = attempts;
        self
    }

    #[must_use]
    pub fn max_execution_secs(mut self, secs: u64) -> Self {
        self.max_execution_secs = secs;
        self
    }

    #[must_use]
    pub fn quota_check_every_saved(mut self, saved: u64) -> Self {
        self.quota_check_every_saved = saved;
        self
    }

    #[must_use]
    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.navigation_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn degraded_settle_ms(mut self, ms: u64) -> Self {
        self.degraded_settle_ms = ms;
        self
    }

    #[must_use]
    pub fn script_timeout_secs(mut self, secs: u64) -> Self {
        self.script_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    #[must_use]
    pub fn fields(mut self, fields: FieldConfig) -> Self {
        self.fields = fields;
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns `ExtractionError::Config` for zero-sized budgets, an
    /// unparseable search URL or an invalid contact pattern.
    pub fn build(self) -> ExtractionResult<ExtractionConfig> {
        url::Url::parse(&self.search_url).map_err(|e| {
            ExtractionError::Config(format!("invalid search_url '{}': {e}", self.search_url))
        })?;

        let non_zero = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("max_wait_ms", self.max_wait_ms),
            ("batch_size", self.batch_size as u64),
            ("max_scroll_attempts", u64::from(self.max_scroll_attempts)),
            ("max_execution_secs", self.max_execution_secs),
            ("quota_check_every_saved", self.quota_check_every_saved),
            ("navigation_timeout_secs", self.navigation_timeout_secs),
            ("script_timeout_secs", self.script_timeout_secs),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ExtractionError::Config(format!("{name} must be greater than zero")));
        }
        if self.poll_interval_ms > self.max_wait_ms {
            return Err(ExtractionError::Config(
                "poll_interval_ms cannot exceed max_wait_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.discovery.sibling_card_ratio) {
            return Err(ExtractionError::Config(
                "sibling_card_ratio must be within 0.0..=1.0".to_string(),
            ));
        }

        let phone_regex = Regex::new(&self.fields.phone_pattern).map_err(|e| {
            ExtractionError::Config(format!(
                "invalid phone pattern '{}': {e}",
                self.fields.phone_pattern
            ))
        })?;

        let mut fields = self.fields;
        for stopword in &mut fields.advertiser_stopwords {
            *stopword = stopword.to_lowercase();
        }

        Ok(ExtractionConfig {
            search_url: self.search_url,
            headless: self.headless,
            poll_interval_ms: self.poll_interval_ms,
            max_wait_ms: self.max_wait_ms,
            scroll_margin_px: self.scroll_margin_px,
            jiggle_offset_px: self.jiggle_offset_px,
            jiggle_pause_ms: self.jiggle_pause_ms,
            empty_poll_patience: self.empty_poll_patience,
            stall_patience: self.stall_patience,
            max_reloads: self.max_reloads,
            batch_size: self.batch_size,
            reload_every_saved: self.reload_every_saved,
            max_scroll_attempts: self.max_scroll_attempts,
            max_execution_secs: self.max_execution_secs,
            quota_check_every_saved: self.quota_check_every_saved,
            navigation_timeout_secs: self.navigation_timeout_secs,
            degraded_settle_ms: self.degraded_settle_ms,
            script_timeout_secs: self.script_timeout_secs,
            discovery: self.discovery,
            fields,
            phone_regex,
        })
    }
}
