//! Shared configuration constants for mission_scrape
//!
//! Default values used across the extraction engine, the supervisor and the
//! scheduler. Everything here can be overridden through the config types.

/// Sentinel advertiser name used when no field strategy produced a value.
pub const UNKNOWN_ADVERTISER: &str = "unknown";

/// Default search endpoint the engine builds its target URL from.
pub const DEFAULT_SEARCH_URL: &str = "https://www.facebook.com/ads/library/";

/// Structural marker attribute for record containers: `data-testid="ad-card"`.
pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-testid";
pub const DEFAULT_MARKER_VALUE: &str = "ad-card";

/// Link phrases that sit inside every record card on the target page.
pub const DEFAULT_DETAIL_PHRASES: &[&str] =
    &["See ad details", "See summary details", "View ad details"];

/// Maximum number of ancestors walked from a detail link to its card.
pub const DETAIL_LINK_MAX_ANCESTORS: usize = 12;

/// Minimum bounding box for a detail-link ancestor to count as a card.
pub const MIN_CARD_WIDTH_PX: f64 = 300.0;
pub const MIN_CARD_HEIGHT_PX: f64 = 150.0;

/// Class-name fragments used by the scoped class heuristic.
pub const DEFAULT_CARD_CLASS_FRAGMENTS: &[&str] = &["card", "result", "item"];

/// Minimum text length for scoped class candidates.
pub const SCOPED_MIN_TEXT_LEN: usize = 40;

/// Sibling homogeneity heuristic bounds.
pub const SIBLING_MIN_CHILDREN: usize = 3;
pub const SIBLING_MAX_CHILDREN: usize = 200;
pub const SIBLING_MIN_TEXT_LEN: usize = 30;
pub const SIBLING_MIN_HEIGHT_PX: f64 = 80.0;
pub const SIBLING_CARD_RATIO: f64 = 0.6;
pub const SIBLING_MIN_CARDS: usize = 3;

/// Minimum length for a text node to be a description candidate.
pub const DESCRIPTION_MIN_LEN: usize = 20;

/// Link/button texts that are never an advertiser name (compared lowercase).
pub const ADVERTISER_STOPWORDS: &[&str] = &[
    "sponsored",
    "active",
    "inactive",
    "learn more",
    "see ad details",
    "see summary details",
    "view ad details",
    "send message",
    "shop now",
    "sign up",
    "book now",
    "contact us",
    "download",
    "apply now",
    "get offer",
    "watch more",
    "open dropdown",
];

/// Brazilian landline/mobile numbers with optional +55 and area code.
pub const DEFAULT_PHONE_PATTERN: &str =
    r"(?:\+?55[\s.-]?)?(?:\(?\d{2}\)?[\s.-]?)?9?\d{4}[\s.-]?\d{4}";

/// Line-protocol tags shared by the worker and the supervisor.
pub const TAG_RECORD_SAVED: &str = "[RECORD_SAVED]";
pub const TAG_DUPLICATE_SKIPPED: &str = "[DUPLICATE_SKIPPED]";
pub const TAG_RECORDS_FOUND: &str = "[RECORDS_FOUND]";
pub const TAG_RECORD_FAILED: &str = "[RECORD_FAILED]";
pub const TAG_SUMMARY: &str = "[MISSION_SUMMARY]";

/// Chrome user agent string used for every automation session.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
