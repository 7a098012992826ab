//! Test utilities shared by the mission_scrape integration tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use mission_scrape::config::ExtractionConfig;
use mission_scrape::extraction::{
    DomSnapshot, ExtractionError, ExtractionResult, PageDriver, PageMetrics, ProgressEvent,
    ScrollTarget, WaitStrategy, WorkerInvocation,
};
use mission_scrape::mission::{
    DriverFactory, MissionSupervisor, SupervisorError, SupervisorResult, WorkerExit,
    WorkerHandle, WorkerLauncher,
};
use mission_scrape::config::SupervisorConfig;
use mission_scrape::persistence::MemoryGateway;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Card carrying the structural marker attribute
#[allow(dead_code)]
pub fn marker_card(advertiser: &str, description: &str) -> String {
    format!(r#"<div data-testid="ad-card"><h3>{advertiser}</h3><p>{description}</p></div>"#)
}

/// Card recognizable only through its "See ad details" link and size
#[allow(dead_code)]
pub fn detail_link_card(advertiser: &str, description: &str) -> String {
    format!(
        r#"<div class="x8t9es0" style="width:480px;height:320px">
             <div class="x1lliihq" style="width:480px;height:40px"><a href="/p">{advertiser}</a></div>
             <div class="x6ikm8r" style="width:480px;height:200px"><span>{description}</span></div>
             <div class="xh8yej3" style="width:140px;height:32px"><a role="link"><span>See ad details</span></a></div>
           </div>"#
    )
}

/// Full page around a list of cards
#[allow(dead_code)]
pub fn page_html(cards: &[String]) -> String {
    format!(
        r#"<html><body><div role="main" style="width:1200px;height:9000px"><div class="x1dr75xp" style="width:1000px;height:8000px">{}</div></div></body></html>"#,
        cards.concat()
    )
}

/// Page driver over fixed HTML that never grows
#[allow(dead_code)]
pub struct StaticPage {
    html: String,
    pub reloads: AtomicU32,
    pub navigations: AtomicU32,
    fail_navigation: bool,
}

#[allow(dead_code)]
impl StaticPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            reloads: AtomicU32::new(0),
            navigations: AtomicU32::new(0),
            fail_navigation: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_navigation: true,
            ..Self::new("<body></body>")
        }
    }
}

#[async_trait]
impl PageDriver for StaticPage {
    async fn navigate(&self, url: &str, _strategy: WaitStrategy) -> ExtractionResult<()> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        if self.fail_navigation {
            return Err(ExtractionError::Browser(format!("cannot reach {url}")));
        }
        Ok(())
    }

    async fn reload(&self) -> ExtractionResult<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scroll(&self, _target: ScrollTarget) -> ExtractionResult<()> {
        Ok(())
    }

    async fn metrics(&self) -> ExtractionResult<PageMetrics> {
        Ok(PageMetrics {
            scroll_height: 9000.0,
            scroll_y: 0.0,
            viewport_height: 900.0,
        })
    }

    async fn snapshot(&self) -> ExtractionResult<DomSnapshot> {
        Ok(DomSnapshot::from_html(&self.html))
    }
}

/// Hands every in-process worker a fresh [`StaticPage`]
#[allow(dead_code)]
pub struct StaticDrivers {
    pub html: String,
}

#[async_trait]
impl DriverFactory for StaticDrivers {
    async fn open(&self) -> ExtractionResult<Box<dyn PageDriver>> {
        Ok(Box::new(StaticPage::new(self.html.clone())))
    }
}

/// Engine settings that make static pages finish in milliseconds
#[allow(dead_code)]
pub fn fast_config() -> Arc<ExtractionConfig> {
    Arc::new(
        ExtractionConfig::builder()
            .poll_interval_ms(5)
            .max_wait_ms(10)
            .jiggle(600, 1)
            .build()
            .expect("valid test config"),
    )
}

#[allow(dead_code)]
pub fn invocation(max_records: u64) -> WorkerInvocation {
    WorkerInvocation {
        mission_id: "m-test".into(),
        owner_id: "u1".into(),
        keyword: "oferta".into(),
        max_records,
        daily_quota: 0,
        filters: Default::default(),
        resume_cutoff: None,
    }
}

/// How a scripted worker ends after emitting its events
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Ending {
    Exit(WorkerExit),
    /// Keep running until the supervisor terminates it
    HoldUntilCancelled,
    Panic,
    /// Fail at launch time
    LaunchError,
}

#[derive(Debug, Clone)]
pub struct WorkerScript {
    pub events: Vec<ProgressEvent>,
    pub ending: Ending,
}

#[allow(dead_code)]
impl WorkerScript {
    pub fn completes_with(events: Vec<ProgressEvent>) -> Self {
        Self {
            events,
            ending: Ending::Exit(WorkerExit::Normal),
        }
    }

    pub fn fails(reason: &str) -> Self {
        Self {
            events: Vec::new(),
            ending: Ending::Exit(WorkerExit::Error(reason.to_string())),
        }
    }

    pub fn holds() -> Self {
        Self {
            events: Vec::new(),
            ending: Ending::HoldUntilCancelled,
        }
    }
}

/// Launcher replaying one script per launch, in order
///
/// With the queue empty, workers complete immediately with no events.
#[derive(Default)]
pub struct ScriptedLauncher {
    scripts: Mutex<VecDeque<WorkerScript>>,
    launches: Mutex<Vec<WorkerInvocation>>,
}

#[allow(dead_code)]
impl ScriptedLauncher {
    pub fn new(scripts: Vec<WorkerScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            launches: Mutex::new(Vec::new()),
        })
    }

    pub fn launches(&self) -> Vec<WorkerInvocation> {
        self.launches.lock().clone()
    }
}

#[async_trait]
impl WorkerLauncher for ScriptedLauncher {
    async fn launch(&self, invocation: WorkerInvocation) -> SupervisorResult<WorkerHandle> {
        self.launches.lock().push(invocation);
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| WorkerScript::completes_with(Vec::new()));

        if matches!(script.ending, Ending::LaunchError) {
            return Err(SupervisorError::Launch("scripted launch failure".into()));
        }

        let (tx, events) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let exit = tokio::spawn(async move {
            for event in script.events {
                let _ = tx.send(event);
            }
            match script.ending {
                Ending::Exit(exit) => exit,
                Ending::HoldUntilCancelled => {
                    token.cancelled().await;
                    WorkerExit::Killed
                }
                Ending::Panic => panic!("scripted worker panic"),
                Ending::LaunchError => unreachable!(),
            }
        });

        Ok(WorkerHandle {
            events,
            exit,
            cancel,
        })
    }
}

/// Supervisor over an in-memory store and the given launcher
#[allow(dead_code)]
pub fn supervisor(launcher: Arc<dyn WorkerLauncher>) -> (MissionSupervisor, Arc<MemoryGateway>) {
    let store = Arc::new(MemoryGateway::new());
    let supervisor = MissionSupervisor::new(store.clone(), launcher, SupervisorConfig::default());
    (supervisor, store)
}

/// Yield until `owner` has `count` live missions
#[allow(dead_code)]
pub async fn until_active(supervisor: &MissionSupervisor, owner: &str, count: usize) {
    for _ in 0..10_000 {
        if supervisor.status(owner).await.len() == count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("owner {owner} never reached {count} active missions");
}
