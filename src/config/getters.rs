//! Getter methods for `ExtractionConfig`

use std::time::Duration;

use regex::Regex;

use super::types::{DiscoveryConfig, ExtractionConfig, FieldConfig};

impl ExtractionConfig {
    #[must_use]
    pub fn search_url(&self) -> &str {
        &self.search_url
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    #[must_use]
    pub fn scroll_margin_px(&self) -> u32 {
        self.scroll_margin_px
    }

    #[must_use]
    pub fn jiggle_offset_px(&self) -> u32 {
        self.jiggle_offset_px
    }

    #[must_use]
    pub fn jiggle_pause(&self) -> Duration {
        Duration::from_millis(self.jiggle_pause_ms)
    }

    #[must_use]
    pub fn empty_poll_patience(&self) -> u32 {
        self.empty_poll_patience
    }

    #[must_use]
    pub fn stall_patience(&self) -> u32 {
        self.stall_patience
    }

    #[must_use]
    pub fn max_reloads(&self) -> u32 {
        self.max_reloads
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn reload_every_saved(&self) -> u64 {
        self.reload_every_saved
    }

    #[must_use]
    pub fn max_scroll_attempts(&self) -> u32 {
        self.max_scroll_attempts
    }

    #[must_use]
    pub fn max_execution(&self) -> Duration {
        Duration::from_secs(self.max_execution_secs)
    }

    #[must_use]
    pub fn quota_check_every_saved(&self) -> u64 {
        self.quota_check_every_saved
    }

    #[must_use]
    pub fn navigation_timeout_secs(&self) -> u64 {
        self.navigation_timeout_secs
    }

    #[must_use]
    pub fn degraded_settle(&self) -> Duration {
        Duration::from_millis(self.degraded_settle_ms)
    }

    #[must_use]
    pub fn script_timeout_secs(&self) -> u64 {
        self.script_timeout_secs
    }

    #[must_use]
    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    #[must_use]
    pub fn fields(&self) -> &FieldConfig {
        &self.fields
    }

    #[must_use]
    pub fn phone_regex(&self) -> &Regex {
        &self.phone_regex
    }
}
