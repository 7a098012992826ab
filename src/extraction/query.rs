//! Target URL construction
//!
//! The filter set is kept generic: `query_pairs()` yields plain key/value
//! pairs and any site-specific translation happens outside the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::{ExtractionError, ExtractionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    #[default]
    All,
    Active,
    Inactive,
}

impl ActiveStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// Inclusive date window, either end optional
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Search filters attached to a mission
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSet {
    pub language: Option<String>,
    pub advertiser: Option<String>,
    pub platforms: Vec<String>,
    pub media_type: Option<String>,
    pub active_status: Option<ActiveStatus>,
    pub date_range: Option<DateRange>,
    pub region: Option<String>,
}

impl FilterSet {
    /// Generic key/value pairs in a stable order
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(language) = &self.language {
            pairs.push(("language", language.clone()));
        }
        if let Some(advertiser) = &self.advertiser {
            pairs.push(("advertiser", advertiser.clone()));
        }
        if !self.platforms.is_empty() {
            pairs.push(("platforms", self.platforms.join(",")));
        }
        if let Some(media_type) = &self.media_type {
            pairs.push(("media_type", media_type.clone()));
        }
        if let Some(status) = self.active_status {
            pairs.push(("active_status", status.as_str().to_string()));
        }
        if let Some(range) = &self.date_range {
            if let Some(start) = range.start {
                pairs.push(("start_date", start.format("%Y-%m-%d").to_string()));
            }
            if let Some(end) = range.end {
                pairs.push(("end_date", end.format("%Y-%m-%d").to_string()));
            }
        }
        if let Some(region) = &self.region {
            pairs.push(("region", region.clone()));
        }
        pairs
    }

    /// Raise the date-range start to `cutoff`
    ///
    /// Used when resuming: records older than the last successful run are
    /// already persisted. An existing later start is kept.
    #[must_use]
    pub fn with_resume_cutoff(mut self, cutoff: Option<NaiveDate>) -> Self {
        if let Some(cutoff) = cutoff {
            let range = self.date_range.get_or_insert_with(DateRange::default);
            range.start = Some(range.start.map_or(cutoff, |start| start.max(cutoff)));
        }
        self
    }
}

/// Build the page URL for a keyword and filter set
///
/// # Errors
///
/// Returns `ExtractionError::Config` if `search_url` is not a valid URL.
pub fn build_url(search_url: &str, keyword: &str, filters: &FilterSet) -> ExtractionResult<Url> {
    let mut url = Url::parse(search_url)
        .map_err(|e| ExtractionError::Config(format!("invalid search_url '{search_url}': {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("q", keyword);
        for (key, value) in filters.query_pairs() {
            query.append_pair(key, &value);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn url_carries_keyword_and_filters() {
        let filters = FilterSet {
            language: Some("pt".into()),
            platforms: vec!["facebook".into(), "instagram".into()],
            active_status: Some(ActiveStatus::Active),
            region: Some("BR".into()),
            ..FilterSet::default()
        };
        let url = build_url("https://www.facebook.com/ads/library/", "tênis corrida", &filters).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("q".into(), "tênis corrida".into()));
        assert!(pairs.contains(&("platforms".into(), "facebook,instagram".into())));
        assert!(pairs.contains(&("active_status".into(), "active".into())));
        assert!(pairs.contains(&("region".into(), "BR".into())));
    }

    #[test]
    fn resume_cutoff_only_raises_start() {
        let filters = FilterSet::default().with_resume_cutoff(Some(date("2024-05-01")));
        assert_eq!(filters.date_range.unwrap().start, Some(date("2024-05-01")));

        let later = FilterSet {
            date_range: Some(DateRange { start: Some(date("2024-06-01")), end: None }),
            ..FilterSet::default()
        }
        .with_resume_cutoff(Some(date("2024-05-01")));
        assert_eq!(later.date_range.unwrap().start, Some(date("2024-06-01")));
    }

    #[test]
    fn bad_search_url_is_config_error() {
        assert!(matches!(
            build_url("not a url", "x", &FilterSet::default()),
            Err(ExtractionError::Config(_))
        ));
    }
}
