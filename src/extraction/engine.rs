//! The extraction engine
//!
//! One engine run drives one page: it navigates to the search URL, then
//! alternates between reading unseen records from a fresh snapshot and
//! scrolling for more, until one of the stop conditions holds. Every accepted
//! record is persisted immediately and reported through the
//! [`ProgressReporter`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::time::Instant;
use xxhash_rust::xxh3::xxh3_64;

use super::discovery::DiscoveryChain;
use super::driver::{PageDriver, open_with_fallback};
use super::errors::ExtractionResult;
use super::fields::{RecordFields, extract_fields};
use super::pagination::{GrowthProbe, Paginator};
use super::progress::ProgressReporter;
use super::query::build_url;
use super::snapshot::{DomSnapshot, NodeId};
use super::types::{ExtractedRecord, MissionSummary, StopReason, WorkerInvocation, fingerprint};
use crate::config::ExtractionConfig;
use crate::persistence::PersistenceGateway;

/// Counters and escalation state of one run
#[derive(Debug, Default)]
struct RunState {
    seen: HashSet<u64>,
    /// Cards that failed to parse, keyed by a hash of their text
    failed: HashSet<u64>,
    found: u64,
    saved: u64,
    duplicates: u64,
    processed: u64,
    empty_polls: u32,
    stalled_cycles: u32,
    reloads: u32,
    attempts: u32,
    since_quota_check: u64,
    since_maintenance: u64,
}

impl RunState {
    fn summary(&self, target: u64, stop_reason: Option<StopReason>) -> MissionSummary {
        MissionSummary {
            found: self.found,
            saved: self.saved,
            duplicates: self.duplicates,
            processed: self.processed,
            target,
            achieved: self.saved >= target,
            stop_reason,
        }
    }
}

/// What the batch loop asks the main loop to do next
enum BatchOutcome {
    Continue { maintenance_reload: bool },
    Stop(StopReason),
}

pub struct ExtractionEngine {
    config: Arc<ExtractionConfig>,
    chain: DiscoveryChain,
    store: Arc<dyn PersistenceGateway>,
}

impl ExtractionEngine {
    #[must_use]
    pub fn new(config: Arc<ExtractionConfig>, store: Arc<dyn PersistenceGateway>) -> Self {
        let chain = DiscoveryChain::from_config(config.discovery());
        Self {
            config,
            chain,
            store,
        }
    }

    /// Replace the default discovery chain
    #[must_use]
    pub fn with_chain(mut self, chain: DiscoveryChain) -> Self {
        self.chain = chain;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run one mission to completion
    ///
    /// The summary is reported exactly once, including when the run ends
    /// with a fatal error.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the run: navigation failure after
    /// the degraded retry, or a browser/script error while polling.
    pub async fn run(
        &self,
        driver: &dyn PageDriver,
        invocation: &WorkerInvocation,
        reporter: &dyn ProgressReporter,
    ) -> ExtractionResult<MissionSummary> {
        let mut state = RunState::default();
        let result = self.run_inner(driver, invocation, reporter, &mut state).await;

        let stop_reason = result.as_ref().ok().copied();
        let summary = state.summary(invocation.max_records, stop_reason);
        reporter.report_summary(summary);

        match result {
            Ok(reason) => {
                info!(
                    "Mission {} finished ({reason:?}): saved {}/{}, duplicates {}, processed {}",
                    invocation.mission_id,
                    summary.saved,
                    summary.target,
                    summary.duplicates,
                    summary.processed
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("Mission {} aborted: {e}", invocation.mission_id);
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        driver: &dyn PageDriver,
        invocation: &WorkerInvocation,
        reporter: &dyn ProgressReporter,
        state: &mut RunState,
    ) -> ExtractionResult<StopReason> {
        let config = &*self.config;
        let url = build_url(
            config.search_url(),
            &invocation.keyword,
            &invocation.effective_filters(),
        )?;
        let started = Instant::now();

        info!("Mission {} navigating to {url}", invocation.mission_id);
        open_with_fallback(driver, url.as_str()).await?;

        if self.quota_reached(invocation).await {
            return Ok(StopReason::QuotaReached);
        }

        let paginator = Paginator::new(driver, &self.chain, config);

        loop {
            if state.saved >= invocation.max_records {
                return Ok(StopReason::TargetReached);
            }
            if started.elapsed() >= config.max_execution() {
                return Ok(StopReason::TimeLimit);
            }
            if state.attempts >= config.max_scroll_attempts() {
                return Ok(StopReason::AttemptBudgetExhausted);
            }

            let snapshot = driver.snapshot().await?;
            let discovery = self.chain.discover(&snapshot);
            debug!(
                "Poll found {} record containers via {:?}",
                discovery.len(),
                discovery.strategy
            );

            // Already-seen containers are not empty; scrolling moves past them
            if discovery.is_empty() {
                state.empty_polls += 1;
            } else {
                state.empty_polls = 0;
            }

            let batch = self.collect_batch(&snapshot, &discovery.records, state, reporter);
            if !batch.is_empty() {
                state.reloads = 0;
                let new = batch.len() as u64;
                reporter.report_records_found(new);
                state.found += new;
            }

            match self
                .persist_batch(batch, invocation, url.as_str(), state, reporter)
                .await
            {
                BatchOutcome::Stop(reason) => return Ok(reason),
                BatchOutcome::Continue {
                    maintenance_reload: true,
                } => {
                    info!("Maintenance reload after {} saved records", state.saved);
                    driver.reload().await?;
                    continue;
                }
                BatchOutcome::Continue { .. } => {}
            }

            if state.empty_polls > config.empty_poll_patience() {
                if !self.escalate_reload(driver, state, "empty polls").await? {
                    return Ok(StopReason::Stalled);
                }
                state.empty_polls = 0;
                continue;
            }

            state.attempts += 1;
            let before = GrowthProbe {
                height: driver.metrics().await?.scroll_height,
                records: discovery.len(),
            };
            if paginator.advance(before).await?.is_stalled() {
                state.stalled_cycles += 1;
                if state.stalled_cycles > config.stall_patience() {
                    if !self.escalate_reload(driver, state, "stalled scrolling").await? {
                        return Ok(StopReason::Stalled);
                    }
                    state.stalled_cycles = 0;
                }
            } else {
                state.stalled_cycles = 0;
            }
        }
    }

    /// Read up to `batch_size` unseen records from the discovered containers
    fn collect_batch(
        &self,
        snapshot: &DomSnapshot,
        cards: &[NodeId],
        state: &mut RunState,
        reporter: &dyn ProgressReporter,
    ) -> Vec<RecordFields> {
        let mut batch = Vec::new();
        for card in cards {
            if batch.len() >= self.config.batch_size() {
                break;
            }
            match extract_fields(snapshot, *card, &self.config) {
                Ok(fields) => {
                    if state.seen.insert(fingerprint(&fields.advertiser, &fields.description)) {
                        batch.push(fields);
                    }
                }
                Err(e) => {
                    let key = xxh3_64(snapshot.visible_text(*card).as_bytes());
                    if state.failed.insert(key) {
                        debug!("Skipping unreadable record: {e}");
                        state.processed += 1;
                        reporter.report_failed();
                    }
                }
            }
        }
        batch
    }

    async fn persist_batch(
        &self,
        batch: Vec<RecordFields>,
        invocation: &WorkerInvocation,
        source: &str,
        state: &mut RunState,
        reporter: &dyn ProgressReporter,
    ) -> BatchOutcome {
        let config = &*self.config;
        let mut maintenance_reload = false;

        for fields in batch {
            if state.saved >= invocation.max_records {
                return BatchOutcome::Stop(StopReason::TargetReached);
            }

            let record = ExtractedRecord {
                advertiser: fields.advertiser,
                description: fields.description,
                contact: fields.contact,
                location: fields.location,
                source: source.to_string(),
                keyword: invocation.keyword.clone(),
                captured_at: Utc::now(),
            };

            state.processed += 1;
            match self.store.save_record(&record, &invocation.owner_id).await {
                Ok(true) => {
                    state.saved += 1;
                    state.since_quota_check += 1;
                    state.since_maintenance += 1;
                    reporter.report_saved();
                }
                Ok(false) => {
                    state.duplicates += 1;
                    reporter.report_duplicate();
                }
                Err(e) => {
                    warn!("Failed to persist record from '{}': {e}", record.advertiser);
                    reporter.report_failed();
                    continue;
                }
            }

            if state.since_quota_check >= config.quota_check_every_saved() {
                state.since_quota_check = 0;
                if self.quota_reached(invocation).await {
                    return BatchOutcome::Stop(StopReason::QuotaReached);
                }
            }
            if config.reload_every_saved() > 0
                && state.since_maintenance >= config.reload_every_saved()
            {
                state.since_maintenance = 0;
                maintenance_reload = true;
            }
        }

        if state.saved >= invocation.max_records {
            return BatchOutcome::Stop(StopReason::TargetReached);
        }
        BatchOutcome::Continue { maintenance_reload }
    }

    /// Advisory daily quota check; a zero quota means unlimited
    async fn quota_reached(&self, invocation: &WorkerInvocation) -> bool {
        if invocation.daily_quota == 0 {
            return false;
        }
        match self.store.count_today(&invocation.owner_id).await {
            Ok(count) if count >= invocation.daily_quota => {
                info!(
                    "Owner {} reached daily quota ({count}/{})",
                    invocation.owner_id, invocation.daily_quota
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Quota check failed, continuing: {e}");
                false
            }
        }
    }

    /// Spend one stall reload; `false` when the budget is exhausted
    async fn escalate_reload(
        &self,
        driver: &dyn PageDriver,
        state: &mut RunState,
        cause: &str,
    ) -> ExtractionResult<bool> {
        if state.reloads >= self.config.max_reloads() {
            info!("Reload budget exhausted after {cause}, ending with partial results");
            return Ok(false);
        }
        state.reloads += 1;
        warn!(
            "Reloading page after {cause} ({}/{})",
            state.reloads,
            self.config.max_reloads()
        );
        driver.reload().await?;
        Ok(true)
    }
}
