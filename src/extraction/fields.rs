//! Per-record field extraction
//!
//! Each field is read by a short list of strategies over the record's
//! subtree, first match wins. Only a missing description is an error.

use once_cell::sync::Lazy;
use regex::Regex;

use super::errors::{ExtractionError, ExtractionResult};
use super::snapshot::{DomSnapshot, NodeId};
use crate::config::ExtractionConfig;
use crate::utils::{UNKNOWN_ADVERTISER, normalize_whitespace, safe_truncate_chars, tidy_multiline};

const MAX_ADVERTISER_CHARS: usize = 200;
const MAX_LOCATION_CHARS: usize = 200;

static LOCATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[Ll]ocation:\s*(.+?)\s*$").expect("Invalid location regex"));

/// Fields read from one record container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    pub advertiser: String,
    pub description: String,
    pub contact: Option<String>,
    pub location: Option<String>,
}

/// Read all fields of the record rooted at `card`
///
/// # Errors
///
/// Returns `ExtractionError::Parse` when no description can be found.
pub fn extract_fields(
    snapshot: &DomSnapshot,
    card: NodeId,
    config: &ExtractionConfig,
) -> ExtractionResult<RecordFields> {
    let advertiser = advertiser(snapshot, card, &config.fields().advertiser_stopwords);
    let description = description(snapshot, card, &advertiser, config.fields().description_min_len)
        .ok_or_else(|| ExtractionError::Parse(format!("no description in record node {}", card.0)))?;
    let contact = contact(&description, config.phone_regex());
    let location = location(snapshot, card);

    Ok(RecordFields {
        advertiser,
        description,
        contact,
        location,
    })
}

/// Heading, then first non-stopword link or button, then bold text
#[must_use]
pub fn advertiser(snapshot: &DomSnapshot, card: NodeId, stopwords: &[String]) -> String {
    let descendants = snapshot.descendants(card);
    let is_stopword = |text: &str| {
        let lower = text.to_lowercase();
        stopwords.iter().any(|s| *s == lower)
    };

    let heading = descendants.iter().find_map(|id| {
        let node = snapshot.node(*id);
        matches!(node.tag.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
            .then(|| snapshot.visible_text(*id))
            .filter(|text| !text.is_empty())
    });

    let link = || {
        descendants.iter().find_map(|id| {
            let node = snapshot.node(*id);
            let clickable = matches!(node.tag.as_str(), "a" | "button")
                || matches!(node.attr("role"), Some("link" | "button"));
            if !clickable {
                return None;
            }
            let text = snapshot.visible_text(*id);
            (!text.is_empty() && !is_stopword(&text)).then_some(text)
        })
    };

    let bold = || {
        descendants.iter().find_map(|id| {
            let node = snapshot.node(*id);
            if !node.is_text() || !node.bold {
                return None;
            }
            let text = normalize_whitespace(&node.text);
            (!text.is_empty() && !is_stopword(&text)).then_some(text)
        })
    };

    heading
        .or_else(link)
        .or_else(bold)
        .map_or_else(
            || UNKNOWN_ADVERTISER.to_string(),
            |name| safe_truncate_chars(&name, MAX_ADVERTISER_CHARS).to_string(),
        )
}

/// Preformatted block, else the longest text node above `min_len`
#[must_use]
pub fn description(
    snapshot: &DomSnapshot,
    card: NodeId,
    advertiser: &str,
    min_len: usize,
) -> Option<String> {
    let descendants = snapshot.descendants(card);

    let preformatted = descendants.iter().find_map(|id| {
        let node = snapshot.node(*id);
        let outermost = node
            .parent
            .is_none_or(|p| p == card || !snapshot.node(p).preformatted);
        if node.is_text() || !node.preformatted || !outermost {
            return None;
        }
        let text = tidy_multiline(&snapshot.text_content(*id));
        (!text.is_empty() && text != advertiser).then_some(text)
    });
    if preformatted.is_some() {
        return preformatted;
    }

    descendants
        .iter()
        .filter(|id| snapshot.node(**id).is_text())
        .map(|id| normalize_whitespace(&snapshot.node(*id).text))
        .filter(|text| text.chars().count() > min_len && text != advertiser)
        .fold(None, |best: Option<String>, text| match best {
            Some(current) if current.chars().count() >= text.chars().count() => Some(current),
            _ => Some(text),
        })
}

/// First regional phone number in the description
#[must_use]
pub fn contact(description: &str, pattern: &Regex) -> Option<String> {
    pattern
        .find(description)
        .map(|m| m.as_str().trim().to_string())
        .filter(|m| !m.is_empty())
}

/// `data-location` element text, else a `Location:` line
#[must_use]
pub fn location(snapshot: &DomSnapshot, card: NodeId) -> Option<String> {
    let tagged = snapshot.descendants(card).into_iter().find_map(|id| {
        let node = snapshot.node(id);
        let value = node.attr("data-location")?;
        let text = snapshot.visible_text(id);
        let chosen = if text.is_empty() { normalize_whitespace(value) } else { text };
        (!chosen.is_empty()).then_some(chosen)
    });

    tagged
        .or_else(|| {
            LOCATION_LINE
                .captures(&snapshot.text_content(card))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .map(|loc| safe_truncate_chars(&loc, MAX_LOCATION_CHARS).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(html: &str) -> (DomSnapshot, NodeId) {
        let snap = DomSnapshot::from_html(&format!("<body>{html}</body>"));
        let card = snap.element_children(NodeId(0)).next().unwrap();
        (snap, card)
    }

    #[test]
    fn heading_beats_links() {
        let (snap, id) = card(
            r#"<div><a>Sponsored</a><h4>Padaria Central</h4><p>Pão fresquinho todos os dias da semana</p></div>"#,
        );
        let fields = extract_fields(&snap, id, &ExtractionConfig::default()).unwrap();
        assert_eq!(fields.advertiser, "Padaria Central");
        assert_eq!(fields.description, "Pão fresquinho todos os dias da semana");
    }

    #[test]
    fn stopword_links_are_skipped() {
        let (snap, id) = card(
            r#"<div><a>Sponsored</a><a>Learn more</a><a href="/p">Loja do Zé</a><span>Ofertas de verão com desconto</span></div>"#,
        );
        let fields = extract_fields(&snap, id, &ExtractionConfig::default()).unwrap();
        assert_eq!(fields.advertiser, "Loja do Zé");
    }

    #[test]
    fn bold_then_unknown_fallback() {
        let (snap, id) =
            card(r#"<div><strong>Mercado Bom</strong><p>Promoções imperdíveis nesta semana</p></div>"#);
        let fields = extract_fields(&snap, id, &ExtractionConfig::default()).unwrap();
        assert_eq!(fields.advertiser, "Mercado Bom");

        let (snap, id) = card(r#"<div><p>Promoções imperdíveis nesta semana</p></div>"#);
        let fields = extract_fields(&snap, id, &ExtractionConfig::default()).unwrap();
        assert_eq!(fields.advertiser, UNKNOWN_ADVERTISER);
    }

    #[test]
    fn preformatted_description_keeps_lines_and_contact() {
        let (snap, id) = card(
            r#"<div><h3>Clínica Sorriso</h3><div style="white-space: pre-wrap">Agende sua consulta
Ligue (11) 98765-4321</div><p>a much longer sibling paragraph that would otherwise win the length contest</p></div>"#,
        );
        let fields = extract_fields(&snap, id, &ExtractionConfig::default()).unwrap();
        assert_eq!(fields.description, "Agende sua consulta\nLigue (11) 98765-4321");
        assert_eq!(fields.contact.as_deref(), Some("(11) 98765-4321"));
    }

    #[test]
    fn missing_description_is_parse_error() {
        let (snap, id) = card(r#"<div><h3>Only a name</h3><span>short</span></div>"#);
        let err = extract_fields(&snap, id, &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn location_from_attribute_or_line() {
        let (snap, id) = card(r#"<div><span data-location="x">Campinas, SP</span></div>"#);
        assert_eq!(location(&snap, id).as_deref(), Some("Campinas, SP"));

        let (snap, id) = card(r#"<div><p>Location: Recife</p></div>"#);
        assert_eq!(location(&snap, id).as_deref(), Some("Recife"));
    }
}
