//! Worker launchers
//!
//! A worker runs one extraction engine for one mission. The supervisor only
//! sees a [`WorkerHandle`]: a stream of typed progress events, a join handle
//! resolving to the exit disposition, and a token that terminates it.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{SupervisorError, SupervisorResult};
use super::protocol::ProgressLineDecoder;
use super::types::MissionStatus;
use crate::browser_setup::BrowserSession;
use crate::config::ExtractionConfig;
use crate::extraction::{
    ChannelProgress, ExtractionEngine, ExtractionError, ExtractionResult, PageDriver,
    ProgressEvent, WorkerInvocation,
};
use crate::persistence::PersistenceGateway;

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Ran to completion
    Normal,
    /// Terminated by a signal or by the supervisor
    Killed,
    /// Fatal error, with its description
    Error(String),
}

impl WorkerExit {
    /// Terminal mission status for this exit
    #[must_use]
    pub fn status(&self) -> MissionStatus {
        match self {
            Self::Normal => MissionStatus::Completed,
            Self::Killed => MissionStatus::Stopped,
            Self::Error(_) => MissionStatus::Failed,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

/// A running worker as seen by the supervisor
pub struct WorkerHandle {
    pub events: UnboundedReceiver<ProgressEvent>,
    pub exit: JoinHandle<WorkerExit>,
    pub cancel: CancellationToken,
}

/// Starts workers for missions
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start a worker. Errors mean nothing is running.
    async fn launch(&self, invocation: WorkerInvocation) -> SupervisorResult<WorkerHandle>;
}

/// Opens the page an in-process worker extracts from
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self) -> ExtractionResult<Box<dyn PageDriver>>;
}

/// Launches a fresh Chromium per mission
#[derive(Debug, Clone)]
pub struct ChromiumDrivers {
    config: Arc<ExtractionConfig>,
}

impl ChromiumDrivers {
    #[must_use]
    pub fn new(config: Arc<ExtractionConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for ChromiumDrivers {
    async fn open(&self) -> ExtractionResult<Box<dyn PageDriver>> {
        let session = BrowserSession::open(&self.config)
            .await
            .map_err(|e| ExtractionError::Browser(format!("{e:#}")))?;
        Ok(Box::new(session))
    }
}

/// Runs the engine as a tokio task with a typed progress channel
///
/// Termination drops the engine future, which closes the page.
pub struct InProcessLauncher {
    engine: Arc<ExtractionEngine>,
    drivers: Arc<dyn DriverFactory>,
}

impl InProcessLauncher {
    #[must_use]
    pub fn new(engine: Arc<ExtractionEngine>, drivers: Arc<dyn DriverFactory>) -> Self {
        Self { engine, drivers }
    }

    /// Launcher over a real browser
    #[must_use]
    pub fn chromium(config: Arc<ExtractionConfig>, store: Arc<dyn PersistenceGateway>) -> Self {
        let drivers = Arc::new(ChromiumDrivers::new(Arc::clone(&config)));
        Self::new(Arc::new(ExtractionEngine::new(config, store)), drivers)
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, invocation: WorkerInvocation) -> SupervisorResult<WorkerHandle> {
        let driver = self
            .drivers
            .open()
            .await
            .map_err(|e| SupervisorError::Launch(e.to_string()))?;

        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let engine = Arc::clone(&self.engine);
        let token = cancel.clone();

        let exit = tokio::spawn(async move {
            let reporter = ChannelProgress::new(tx);
            tokio::select! {
                () = token.cancelled() => {
                    debug!(mission_id = %invocation.mission_id, "In-process worker cancelled");
                    WorkerExit::Killed
                }
                result = engine.run(driver.as_ref(), &invocation, &reporter) => match result {
                    Ok(summary) => {
                        info!(
                            mission_id = %invocation.mission_id,
                            saved = summary.saved,
                            achieved = summary.achieved,
                            "Worker finished"
                        );
                        WorkerExit::Normal
                    }
                    Err(e) => WorkerExit::Error(e.to_string()),
                }
            }
        });

        Ok(WorkerHandle {
            events,
            exit,
            cancel,
        })
    }
}

/// Runs `<binary> worker --invocation <json>` and decodes its stdout
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: PathBuf,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Launcher that re-executes the running binary
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Launch` if the current executable cannot be
    /// resolved.
    pub fn current_exe() -> SupervisorResult<Self> {
        std::env::current_exe()
            .map(Self::new)
            .map_err(|e| SupervisorError::Launch(format!("cannot resolve current executable: {e}")))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, invocation: WorkerInvocation) -> SupervisorResult<WorkerHandle> {
        let payload = serde_json::to_string(&invocation)
            .map_err(|e| SupervisorError::Launch(format!("invalid invocation: {e}")))?;

        let mut child = Command::new(&self.binary)
            .arg("worker")
            .arg("--invocation")
            .arg(payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Launch(format!("{}: {e}", self.binary.display())))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::Launch("worker stdout was not captured".to_string()))?;

        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mission_id = invocation.mission_id;

        let exit = tokio::spawn(async move {
            if !pump_stdout(stdout, &tx, &token).await {
                return kill(&mut child, &mission_id).await;
            }
            drop(tx);

            tokio::select! {
                () = token.cancelled() => kill(&mut child, &mission_id).await,
                status = child.wait() => match status {
                    Ok(status) if status.success() => WorkerExit::Normal,
                    // No exit code means a signal ended the process
                    Ok(status) if status.code().is_none() => WorkerExit::Killed,
                    Ok(status) => WorkerExit::Error(format!("worker exited with {status}")),
                    Err(e) => WorkerExit::Error(format!("failed to wait for worker: {e}")),
                },
            }
        });

        Ok(WorkerHandle {
            events,
            exit,
            cancel,
        })
    }
}

/// Forward decoded stdout events until EOF. Returns false if cancelled.
async fn pump_stdout(
    mut stdout: tokio::process::ChildStdout,
    tx: &UnboundedSender<ProgressEvent>,
    token: &CancellationToken,
) -> bool {
    let mut decoder = ProgressLineDecoder::new();
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            () = token.cancelled() => return false,
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    for event in decoder.feed(&buf[..n]) {
                        let _ = tx.send(event);
                    }
                }
                Err(e) => {
                    warn!("Failed to read worker stdout: {e}");
                    break;
                }
            },
        }
    }

    if let Some(event) = decoder.finish() {
        let _ = tx.send(event);
    }
    true
}

async fn kill(child: &mut tokio::process::Child, mission_id: &str) -> WorkerExit {
    if let Err(e) = child.kill().await {
        warn!(mission_id = %mission_id, "Failed to kill worker process: {e}");
    }
    WorkerExit::Killed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_dispositions_map_to_statuses() {
        assert_eq!(WorkerExit::Normal.status(), MissionStatus::Completed);
        assert_eq!(WorkerExit::Killed.status(), MissionStatus::Stopped);
        let error = WorkerExit::Error("boom".into());
        assert_eq!(error.status(), MissionStatus::Failed);
        assert_eq!(error.error(), Some("boom"));
        assert_eq!(WorkerExit::Normal.error(), None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let launcher = ProcessLauncher::new(PathBuf::from("/nonexistent/mission_scrape"));
        let invocation = WorkerInvocation {
            mission_id: "m1".into(),
            owner_id: "u1".into(),
            keyword: "shoes".into(),
            max_records: 1,
            daily_quota: 0,
            filters: Default::default(),
            resume_cutoff: None,
        };
        assert!(matches!(
            launcher.launch(invocation).await,
            Err(SupervisorError::Launch(_))
        ));
    }
}
