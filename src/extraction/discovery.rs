//! Record-container discovery
//!
//! The target page renders its records inside an unstable, virtualized list
//! whose markup changes between deployments and sometimes between polls. A
//! fixed selector is not enough, so discovery is an ordered chain of
//! strategies. The chain is re-evaluated on every poll and the first
//! strategy returning a non-empty set wins.

use std::collections::HashSet;
use std::fmt;

use log::trace;

use super::snapshot::{DomSnapshot, NodeId};
use crate::config::DiscoveryConfig;
use crate::utils::normalize_whitespace;

/// A pluggable strategy that finds repeated record containers
pub trait Discoverer: Send + Sync + fmt::Debug {
    /// Short name used in logs and in [`Discovery::strategy`]
    fn name(&self) -> &'static str;

    /// Record containers under `scope`, in document order
    fn discover(&self, snapshot: &DomSnapshot, scope: NodeId) -> Vec<NodeId>;
}

/// Result of running the chain once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Name of the strategy that produced `records`, `None` if all came up empty
    pub strategy: Option<&'static str>,
    pub records: Vec<NodeId>,
}

impl Discovery {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordered fallback chain of discoverers
#[derive(Debug)]
pub struct DiscoveryChain {
    strategies: Vec<Box<dyn Discoverer>>,
}

impl DiscoveryChain {
    /// Marker, detail link, scoped class, sibling homogeneity, in that order
    #[must_use]
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::with_strategies(vec![
            Box::new(MarkerDiscoverer::new(config)),
            Box::new(DetailLinkDiscoverer::new(config)),
            Box::new(ScopedClassDiscoverer::new(config)),
            Box::new(SiblingHomogeneityDiscoverer::new(config)),
        ])
    }

    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn Discoverer>>) -> Self {
        Self { strategies }
    }

    /// Strategy names in evaluation order
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain from the document root
    #[must_use]
    pub fn discover(&self, snapshot: &DomSnapshot) -> Discovery {
        match snapshot.root() {
            Some(root) => self.discover_in(snapshot, root),
            None => Discovery::default(),
        }
    }

    /// Run the chain under an explicit scope
    #[must_use]
    pub fn discover_in(&self, snapshot: &DomSnapshot, scope: NodeId) -> Discovery {
        for strategy in &self.strategies {
            let records = strategy.discover(snapshot, scope);
            if !records.is_empty() {
                trace!(
                    "Discovery strategy '{}' matched {} records",
                    strategy.name(),
                    records.len()
                );
                return Discovery {
                    strategy: Some(strategy.name()),
                    records,
                };
            }
        }
        Discovery::default()
    }
}

/// Elements carrying the exact structural marker attribute
#[derive(Debug, Clone)]
pub struct MarkerDiscoverer {
    attribute: String,
    value: Option<String>,
}

impl MarkerDiscoverer {
    #[must_use]
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            attribute: config.marker_attribute.clone(),
            value: config.marker_value.clone(),
        }
    }
}

impl Discoverer for MarkerDiscoverer {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn discover(&self, snapshot: &DomSnapshot, scope: NodeId) -> Vec<NodeId> {
        let matches: Vec<NodeId> = snapshot
            .descendants(scope)
            .into_iter()
            .filter(|id| {
                let node = snapshot.node(*id);
                match (node.attr(&self.attribute), &self.value) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            })
            .collect();
        outermost(snapshot, matches)
    }
}

/// Cards located from the "details" link every card contains
///
/// The innermost element holding a detail phrase is found first, then its
/// ancestors are walked until one is large enough to be a whole card.
#[derive(Debug, Clone)]
pub struct DetailLinkDiscoverer {
    phrases: Vec<String>,
    max_levels: usize,
    min_width: f64,
    min_height: f64,
}

impl DetailLinkDiscoverer {
    #[must_use]
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            phrases: config
                .detail_phrases
                .iter()
                .map(|p| normalize_whitespace(p))
                .collect(),
            max_levels: config.max_ancestor_levels,
            min_width: config.min_card_width,
            min_height: config.min_card_height,
        }
    }
}

impl Discoverer for DetailLinkDiscoverer {
    fn name(&self) -> &'static str {
        "detail_link"
    }

    fn discover(&self, snapshot: &DomSnapshot, scope: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut cards = Vec::new();

        for text_id in snapshot.text_nodes(scope) {
            let text = normalize_whitespace(&snapshot.node(text_id).text);
            if !self.phrases.iter().any(|p| *p == text) {
                continue;
            }
            let Some(link) = snapshot.node(text_id).parent else {
                continue;
            };

            let card = std::iter::once(link)
                .chain(snapshot.ancestors(link))
                .take_while(|a| *a != scope)
                .take(self.max_levels + 1)
                .find(|a| snapshot.node(*a).rect.exceeds(self.min_width, self.min_height));

            if let Some(card) = card
                && seen.insert(card)
            {
                cards.push(card);
            }
        }

        cards
    }
}

/// Class-name heuristic, only meaningful under a narrowed scope
///
/// Page-wide class matching picks up navigation and footer blocks, so this
/// strategy refuses to run from the document root.
#[derive(Debug, Clone)]
pub struct ScopedClassDiscoverer {
    fragments: Vec<String>,
    min_text_len: usize,
}

impl ScopedClassDiscoverer {
    #[must_use]
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            fragments: config
                .card_class_fragments
                .iter()
                .map(|f| f.to_ascii_lowercase())
                .collect(),
            min_text_len: config.scoped_min_text_len,
        }
    }
}

impl Discoverer for ScopedClassDiscoverer {
    fn name(&self) -> &'static str {
        "scoped_class"
    }

    fn discover(&self, snapshot: &DomSnapshot, scope: NodeId) -> Vec<NodeId> {
        if snapshot.root() == Some(scope) || self.fragments.is_empty() {
            return Vec::new();
        }

        let matches: Vec<NodeId> = snapshot
            .descendants(scope)
            .into_iter()
            .filter(|id| {
                let node = snapshot.node(*id);
                !node.is_text()
                    && node.classes().any(|class| {
                        let class = class.to_ascii_lowercase();
                        self.fragments.iter().any(|f| class.contains(f.as_str()))
                    })
            })
            .filter(|id| snapshot.visible_text(*id).chars().count() > self.min_text_len)
            .collect();
        outermost(snapshot, matches)
    }
}

/// Generic "list of similar children" heuristic
#[derive(Debug, Clone)]
pub struct SiblingHomogeneityDiscoverer {
    min_children: usize,
    max_children: usize,
    min_text_len: usize,
    min_height: f64,
    card_ratio: f64,
    min_cards: usize,
}

impl SiblingHomogeneityDiscoverer {
    #[must_use]
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            min_children: config.sibling_min_children,
            max_children: config.sibling_max_children,
            min_text_len: config.sibling_min_text_len,
            min_height: config.sibling_min_height,
            card_ratio: config.sibling_card_ratio,
            min_cards: config.sibling_min_cards,
        }
    }

    fn is_card_like(&self, snapshot: &DomSnapshot, id: NodeId) -> bool {
        let node = snapshot.node(id);
        if node.rect.height <= self.min_height {
            return false;
        }
        let has_link = node.tag == "a"
            || snapshot
                .descendants(id)
                .iter()
                .any(|d| snapshot.node(*d).tag == "a");
        has_link && snapshot.visible_text(id).chars().count() > self.min_text_len
    }
}

impl Discoverer for SiblingHomogeneityDiscoverer {
    fn name(&self) -> &'static str {
        "sibling_homogeneity"
    }

    fn discover(&self, snapshot: &DomSnapshot, scope: NodeId) -> Vec<NodeId> {
        let mut best: Vec<NodeId> = Vec::new();

        let parents = std::iter::once(scope).chain(snapshot.descendants(scope));
        for parent in parents {
            if snapshot.node(parent).is_text() {
                continue;
            }
            let children: Vec<NodeId> = snapshot.element_children(parent).collect();
            if children.len() < self.min_children || children.len() > self.max_children {
                continue;
            }

            let cards: Vec<NodeId> = children
                .iter()
                .copied()
                .filter(|c| self.is_card_like(snapshot, *c))
                .collect();

            #[allow(clippy::cast_precision_loss)]
            let ratio = cards.len() as f64 / children.len() as f64;
            if cards.len() >= self.min_cards && ratio >= self.card_ratio && cards.len() > best.len()
            {
                best = cards;
            }
        }

        best
    }
}

/// Drop matches nested inside another match
fn outermost(snapshot: &DomSnapshot, matches: Vec<NodeId>) -> Vec<NodeId> {
    let set: HashSet<NodeId> = matches.iter().copied().collect();
    matches
        .into_iter()
        .filter(|id| !snapshot.ancestors(*id).any(|a| set.contains(&a)))
        .collect()
}
