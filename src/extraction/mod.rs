//! Adaptive extraction over an unstable, virtualized DOM
//!
//! The browser is reached only through [`PageDriver`]. Each poll freezes the
//! page into a [`DomSnapshot`], the [`DiscoveryChain`] finds record
//! containers, and [`fields`] reads them. Scrolling, stall handling and
//! persistence are orchestrated by [`ExtractionEngine`].

pub mod discovery;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod fields;
pub mod js_scripts;
pub mod page_timeout;
pub mod pagination;
pub mod progress;
pub mod query;
pub mod snapshot;
pub mod types;

pub use discovery::{
    DetailLinkDiscoverer, Discoverer, Discovery, DiscoveryChain, MarkerDiscoverer,
    ScopedClassDiscoverer, SiblingHomogeneityDiscoverer,
};
pub use driver::{ChromiumPage, PageDriver, PageMetrics, ScrollTarget, WaitStrategy, open_with_fallback};
pub use engine::ExtractionEngine;
pub use errors::{ExtractionError, ExtractionResult};
pub use fields::{RecordFields, extract_fields};
pub use page_timeout::with_page_timeout;
pub use pagination::{GrowthProbe, Paginator, ScrollOutcome};
pub use progress::{ChannelProgress, LineProgress, NoOpProgress, ProgressEvent, ProgressReporter};
pub use query::{ActiveStatus, DateRange, FilterSet, build_url};
pub use snapshot::{DomNode, DomSnapshot, NodeId, RawNode, Rect};
pub use types::{ExtractedRecord, MissionSummary, StopReason, WorkerInvocation, fingerprint};
