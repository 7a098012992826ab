//! Core configuration types for extraction missions
//!
//! `ExtractionConfig` carries every engine tunable. It is built through
//! [`ExtractionConfigBuilder`](super::builder::ExtractionConfigBuilder), which
//! validates ranges and compiles the contact pattern once.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::{
    ADVERTISER_STOPWORDS, DEFAULT_CARD_CLASS_FRAGMENTS, DEFAULT_DETAIL_PHRASES,
    DEFAULT_MARKER_ATTRIBUTE, DEFAULT_MARKER_VALUE, DESCRIPTION_MIN_LEN,
    DETAIL_LINK_MAX_ANCESTORS, MIN_CARD_HEIGHT_PX, MIN_CARD_WIDTH_PX, SCOPED_MIN_TEXT_LEN,
    SIBLING_CARD_RATIO, SIBLING_MAX_CHILDREN, SIBLING_MIN_CARDS, SIBLING_MIN_CHILDREN,
    SIBLING_MIN_HEIGHT_PX, SIBLING_MIN_TEXT_LEN,
};

/// Tunables for the record-container discovery chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub marker_attribute: String,
    /// `None` matches any element carrying `marker_attribute`
    pub marker_value: Option<String>,
    pub detail_phrases: Vec<String>,
    pub max_ancestor_levels: usize,
    pub min_card_width: f64,
    pub min_card_height: f64,
    pub card_class_fragments: Vec<String>,
    pub scoped_min_text_len: usize,
    pub sibling_min_children: usize,
    pub sibling_max_children: usize,
    pub sibling_min_text_len: usize,
    pub sibling_min_height: f64,
    pub sibling_card_ratio: f64,
    pub sibling_min_cards: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
            marker_value: Some(DEFAULT_MARKER_VALUE.to_string()),
            detail_phrases: DEFAULT_DETAIL_PHRASES.iter().map(ToString::to_string).collect(),
            max_ancestor_levels: DETAIL_LINK_MAX_ANCESTORS,
            min_card_width: MIN_CARD_WIDTH_PX,
            min_card_height: MIN_CARD_HEIGHT_PX,
            card_class_fragments: DEFAULT_CARD_CLASS_FRAGMENTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            scoped_min_text_len: SCOPED_MIN_TEXT_LEN,
            sibling_min_children: SIBLING_MIN_CHILDREN,
            sibling_max_children: SIBLING_MAX_CHILDREN,
            sibling_min_text_len: SIBLING_MIN_TEXT_LEN,
            sibling_min_height: SIBLING_MIN_HEIGHT_PX,
            sibling_card_ratio: SIBLING_CARD_RATIO,
            sibling_min_cards: SIBLING_MIN_CARDS,
        }
    }
}

/// Tunables for per-record field extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Link and button texts that never name an advertiser, lowercase
    pub advertiser_stopwords: Vec<String>,
    pub description_min_len: usize,
    pub phone_pattern: String,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            advertiser_stopwords: ADVERTISER_STOPWORDS.iter().map(ToString::to_string).collect(),
            description_min_len: DESCRIPTION_MIN_LEN,
            phone_pattern: crate::utils::DEFAULT_PHONE_PATTERN.to_string(),
        }
    }
}

/// Main configuration for one extraction engine run
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub(crate) search_url: String,
    pub(crate) headless: bool,

    /// Interval between growth checks while waiting after a scroll
    pub(crate) poll_interval_ms: u64,
    /// Upper bound of one growth wait
    pub(crate) max_wait_ms: u64,
    /// Extra distance scrolled past the current document height
    pub(crate) scroll_margin_px: u32,
    pub(crate) jiggle_offset_px: u32,
    pub(crate) jiggle_pause_ms: u64,

    /// Consecutive empty polls tolerated before a reload
    pub(crate) empty_poll_patience: u32,
    /// Consecutive stalled scroll cycles tolerated before a reload
    pub(crate) stall_patience: u32,
    /// Stall-driven reloads before the run ends as `Stalled`
    pub(crate) max_reloads: u32,

    pub(crate) batch_size: usize,
    /// Saved-record interval between forced maintenance reloads
    pub(crate) reload_every_saved: u64,
    pub(crate) max_scroll_attempts: u32,
    pub(crate) max_execution_secs: u64,
    pub(crate) quota_check_every_saved: u64,

    /// Timeout for `page.goto()` plus the load event
    ///
    /// Default: 30 seconds
    pub(crate) navigation_timeout_secs: u64,
    /// Settle delay after a degraded navigation
    pub(crate) degraded_settle_ms: u64,
    /// Timeout for a single in-page script evaluation
    pub(crate) script_timeout_secs: u64,

    pub(crate) discovery: DiscoveryConfig,
    pub(crate) fields: FieldConfig,

    /// Compiled from `fields.phone_pattern` at build time
    pub(crate) phone_regex: Regex,
}
