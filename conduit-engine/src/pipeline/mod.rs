//! Pipeline
//!
//! A single subprocess-backed job and its lifecycle state machine:
//!
//! ```text
//! Pending --start ok--> Running --exit--> Finished
//!    |  \--start err--> Failed      \---kill--> Killed
//!    \----kill--------> Killed
//! ```
//!
//! Every pipeline carries its own lock. The start routine spawns the process
//! while holding it, the supervisor records the natural exit under it as soon
//! as the process is reaped, and `kill` signals the process under it.
//! Whichever of "exit observed" and "kill delivered" takes the lock first
//! decides the final status; a terminal status is never overwritten.
//!
//! The status is mirrored in an atomic so that registry listings can filter
//! on it without waiting for a pipeline lock.

pub mod launcher;
pub mod output;
pub mod signal;

use chrono::{DateTime, Utc};
use conduit_core::domain::pipeline::{
    PipelineDefinition, PipelineId, PipelineInfo, PipelineStatus,
};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::launcher::Launcher;
use crate::pipeline::output::{CaptureError, OutputBuffer};
use crate::pipeline::signal::Delivery;

/// How long output readers may keep draining after the process exited.
/// Background processes that inherited the pipes would otherwise keep a
/// finished pipeline in `Running` forever.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised by pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("start precondition failed: {0}")]
    StartPrecondition(String),

    #[error("no pipeline identities left to allocate")]
    IdentitiesExhausted,

    #[error("failed to kill pipeline {id}: {source}")]
    KillFailed {
        id: PipelineId,
        #[source]
        source: io::Error,
    },

    #[error("output of pipeline {id} is unavailable: {source}")]
    OutputUnavailable {
        id: PipelineId,
        #[source]
        source: CaptureError,
    },
}

/// Mutable part of a pipeline, guarded by the pipeline lock
struct PipelineState {
    status: PipelineStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    error: Option<String>,
}

/// Status readable without the pipeline lock. Only written while the lock
/// is held, right after `PipelineState::status` changes.
struct StatusCell(AtomicU8);

impl StatusCell {
    fn new(status: PipelineStatus) -> Self {
        Self(AtomicU8::new(Self::encode(status)))
    }

    fn load(&self) -> PipelineStatus {
        match self.0.load(Ordering::Acquire) {
            0 => PipelineStatus::Pending,
            1 => PipelineStatus::Running,
            2 => PipelineStatus::Failed,
            3 => PipelineStatus::Killed,
            _ => PipelineStatus::Finished,
        }
    }

    fn store(&self, status: PipelineStatus) {
        self.0.store(Self::encode(status), Ordering::Release);
    }

    fn encode(status: PipelineStatus) -> u8 {
        match status {
            PipelineStatus::Pending => 0,
            PipelineStatus::Running => 1,
            PipelineStatus::Failed => 2,
            PipelineStatus::Killed => 3,
            PipelineStatus::Finished => 4,
        }
    }
}

/// One subprocess-backed job
pub struct Pipeline {
    id: PipelineId,
    definition: PipelineDefinition,
    delay: Duration,
    kill_timeout: Duration,
    created_at: DateTime<Utc>,
    state: Mutex<PipelineState>,
    status: StatusCell,
    output: Arc<OutputBuffer>,
    /// Cancels the scheduled start while the pipeline is still pending
    start_cancel: CancellationToken,
    /// Flips to `true` once no process exists or will ever exist
    exited: watch::Sender<bool>,
}

impl Pipeline {
    /// Creates a pending pipeline
    ///
    /// # Arguments
    /// * `id` - Identity issued by the registry
    /// * `definition` - Script and extra parameters
    /// * `delay` - How long to wait before launching the process
    /// * `kill_timeout` - How long `kill` waits for the process to be reaped
    pub fn new(
        id: PipelineId,
        definition: PipelineDefinition,
        delay: Duration,
        kill_timeout: Duration,
    ) -> Self {
        let (exited, _) = watch::channel(false);
        Self {
            id,
            definition,
            delay,
            kill_timeout,
            created_at: Utc::now(),
            state: Mutex::new(PipelineState {
                status: PipelineStatus::Pending,
                started_at: None,
                finished_at: None,
                pid: None,
                exit_code: None,
                error: None,
            }),
            status: StatusCell::new(PipelineStatus::Pending),
            output: Arc::new(OutputBuffer::new()),
            start_cancel: CancellationToken::new(),
            exited,
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Current status; never blocks on the pipeline lock
    pub fn status(&self) -> PipelineStatus {
        self.status.load()
    }

    /// Representation served by the API
    pub fn info(&self) -> PipelineInfo {
        let state = self.state.lock();
        PipelineInfo {
            id: self.id,
            definition: self.definition.clone(),
            delay_ms: u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
            status: state.status,
            created_at: self.created_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
            pid: state.pid,
            exit_code: state.exit_code,
            error: state.error.clone(),
        }
    }

    /// Output collected so far
    ///
    /// Empty while pending, partial while running, complete once the
    /// process is gone.
    pub fn output(&self) -> Result<Vec<u8>, PipelineError> {
        self.output
            .snapshot()
            .map_err(|source| PipelineError::OutputUnavailable {
                id: self.id,
                source,
            })
    }

    /// Moves to `next` if the state machine allows it
    ///
    /// Takes the locked state so that the atomic mirror is only ever written
    /// under the pipeline lock.
    fn transition(&self, state: &mut PipelineState, next: PipelineStatus) -> bool {
        if !state.status.can_transition_to(next) {
            debug!(
                "Pipeline {} ignoring transition {} -> {}",
                self.id, state.status, next
            );
            return false;
        }
        state.status = next;
        self.status.store(next);
        if next.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
        true
    }

    /// Schedules the process start after the pipeline delay
    ///
    /// The returned task outlives the caller. `kill` on a pending pipeline
    /// cancels it before the process is ever spawned.
    pub fn schedule_start(self: &Arc<Self>, launcher: Arc<Launcher>) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = pipeline.start_cancel.cancelled() => {
                    debug!("Start of pipeline {} cancelled", pipeline.id);
                }
                _ = tokio::time::sleep(pipeline.delay) => {
                    pipeline.run(&launcher).await;
                }
            }
        })
    }

    /// Spawns the process and supervises it until it exits
    async fn run(&self, launcher: &Launcher) {
        let mut command = launcher.command(&self.definition);

        let spawned = {
            let mut state = self.state.lock();
            if state.status != PipelineStatus::Pending {
                debug!(
                    "Pipeline {} is {} when its start fired, not starting",
                    self.id, state.status
                );
                return;
            }

            match command.spawn() {
                Ok(child) => {
                    self.transition(&mut state, PipelineStatus::Running);
                    state.started_at = Some(Utc::now());
                    state.pid = child.id();
                    info!(
                        "Pipeline {} started (pid {:?})",
                        self.id,
                        state.pid
                    );
                    Some(child)
                }
                Err(e) => {
                    warn!("Pipeline {} failed to start: {}", self.id, e);
                    self.transition(&mut state, PipelineStatus::Failed);
                    state.error = Some(format!(
                        "failed to spawn '{}': {}",
                        launcher.executable(),
                        e
                    ));
                    None
                }
            }
        };

        let Some(mut child) = spawned else {
            self.output.seal();
            self.exited.send_replace(true);
            return;
        };

        let mut readers = Vec::with_capacity(2);
        match child.stdout.take() {
            Some(stdout) => readers.push(tokio::spawn(output::capture(
                stdout,
                self.output.clone(),
                "stdout",
            ))),
            None => self.output.fail("stdout pipe was not established"),
        }
        match child.stderr.take() {
            Some(stderr) => readers.push(tokio::spawn(output::capture(
                stderr,
                self.output.clone(),
                "stderr",
            ))),
            None => self.output.fail("stderr pipe was not established"),
        }

        let exit = child.wait().await;

        // Record the exit before draining: a background process that kept
        // the pipes open must not leave a window where kill still applies.
        {
            let mut state = self.state.lock();
            match exit {
                Ok(status) => state.exit_code = status.code(),
                Err(e) => warn!("Failed to wait for pipeline {}: {}", self.id, e),
            }
            if self.transition(&mut state, PipelineStatus::Finished) {
                info!(
                    "Pipeline {} finished (exit code {:?})",
                    self.id, state.exit_code
                );
            }
        }

        for mut reader in readers {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
                .await
                .is_err()
            {
                debug!(
                    "Pipeline {} output still open after exit, detaching reader",
                    self.id
                );
                reader.abort();
            }
        }
        self.output.seal();

        self.exited.send_replace(true);
    }

    /// Terminates the pipeline
    ///
    /// Idempotent: killing a pipeline that already finished, failed or was
    /// killed succeeds without changing anything. A pending pipeline never
    /// starts. A running pipeline's process group receives SIGKILL and this
    /// call waits (up to the kill timeout) for the process to be reaped.
    pub async fn kill(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.lock();
            match state.status {
                PipelineStatus::Pending => {
                    self.start_cancel.cancel();
                    self.transition(&mut state, PipelineStatus::Killed);
                    drop(state);
                    self.output.seal();
                    self.exited.send_replace(true);
                    info!("Pipeline {} killed before it started", self.id);
                    return Ok(());
                }
                PipelineStatus::Running => {
                    let delivery = match state.pid {
                        Some(pid) => signal::terminate(pid),
                        None => Ok(Delivery::AlreadyGone),
                    };
                    match delivery {
                        Ok(Delivery::Delivered) => {
                            self.transition(&mut state, PipelineStatus::Killed);
                            info!("Pipeline {} killed", self.id);
                        }
                        Ok(Delivery::AlreadyGone) => {
                            debug!("Pipeline {} exited before it could be killed", self.id);
                        }
                        Err(source) => {
                            warn!("Failed to kill pipeline {}: {}", self.id, source);
                            return Err(PipelineError::KillFailed {
                                id: self.id,
                                source,
                            });
                        }
                    }
                }
                status => {
                    debug!("Pipeline {} is already {}, nothing to kill", self.id, status);
                    return Ok(());
                }
            }
        }

        if tokio::time::timeout(self.kill_timeout, self.wait()).await.is_err() {
            warn!(
                "Pipeline {} was not reaped within {:?} after kill",
                self.id, self.kill_timeout
            );
        }
        Ok(())
    }

    /// Waits until no process exists for this pipeline anymore
    ///
    /// Resolves once the pipeline failed to start, was killed while pending,
    /// or its process was reaped.
    pub async fn wait(&self) {
        let mut exited = self.exited.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = exited.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Registry;

    const KILL_TIMEOUT: Duration = Duration::from_secs(5);
    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn shell() -> Arc<Launcher> {
        Arc::new(Launcher::new("sh", vec!["-c".to_string()]))
    }

    fn pipeline(id: u64, script: &str, delay: Duration) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            PipelineId(id),
            PipelineDefinition::new(script, vec![]),
            delay,
            KILL_TIMEOUT,
        ))
    }

    async fn wait_exited(pipeline: &Pipeline) {
        tokio::time::timeout(TEST_TIMEOUT, pipeline.wait())
            .await
            .expect("pipeline did not exit in time");
    }

    async fn wait_for_status(pipeline: &Pipeline, status: PipelineStatus) {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        while pipeline.status() != status {
            assert!(
                tokio::time::Instant::now() < deadline,
                "pipeline never reached {}",
                status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_new_pipeline_is_pending_with_empty_output() {
        let pipeline = pipeline(1, "echo hi", Duration::from_millis(200));

        assert_eq!(pipeline.status(), PipelineStatus::Pending);
        assert!(pipeline.output().unwrap().is_empty());

        let info = pipeline.info();
        assert_eq!(info.id, PipelineId(1));
        assert_eq!(info.delay_ms, 200);
        assert!(info.started_at.is_none());
        assert!(info.pid.is_none());
    }

    #[tokio::test]
    async fn test_runs_to_finished_and_captures_output() {
        let pipeline = pipeline(1, "echo hello; echo oops 1>&2", Duration::ZERO);
        pipeline.schedule_start(shell());

        wait_exited(&pipeline).await;

        assert_eq!(pipeline.status(), PipelineStatus::Finished);
        let output = String::from_utf8(pipeline.output().unwrap()).unwrap();
        assert!(output.contains("hello\n"));
        assert!(output.contains("oops\n"));

        let info = pipeline.info();
        assert_eq!(info.exit_code, Some(0));
        assert!(info.started_at.is_some());
        assert!(info.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_extra_params_reach_the_process() {
        let pipeline = Arc::new(Pipeline::new(
            PipelineId(1),
            PipelineDefinition::new(
                "echo \"$0|$1\"",
                vec!["first arg".to_string(), "second".to_string()],
            ),
            Duration::ZERO,
            KILL_TIMEOUT,
        ));
        pipeline.schedule_start(shell());

        wait_exited(&pipeline).await;

        assert_eq!(pipeline.output().unwrap(), b"first arg|second\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_finished() {
        let pipeline = pipeline(1, "exit 3", Duration::ZERO);
        pipeline.schedule_start(shell());

        wait_exited(&pipeline).await;

        assert_eq!(pipeline.status(), PipelineStatus::Finished);
        assert_eq!(pipeline.info().exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_failed() {
        let pipeline = pipeline(1, "echo never", Duration::ZERO);
        let launcher = Arc::new(Launcher::new("/nonexistent/conduit-engine-test", vec![]));
        pipeline.schedule_start(launcher);

        wait_exited(&pipeline).await;

        assert_eq!(pipeline.status(), PipelineStatus::Failed);
        let info = pipeline.info();
        assert!(info.error.unwrap().contains("failed to spawn"));
        assert!(info.pid.is_none());

        // Killing a failed pipeline is a no-op
        pipeline.kill().await.unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Failed);
        assert!(pipeline.output().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kill_pending_prevents_start() {
        let pipeline = pipeline(1, "echo started", Duration::from_millis(50));
        let start = pipeline.schedule_start(shell());

        pipeline.kill().await.unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Killed);

        start.await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(pipeline.status(), PipelineStatus::Killed);
        let info = pipeline.info();
        assert!(info.pid.is_none());
        assert!(info.started_at.is_none());
        assert!(pipeline.output().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kill_running_is_idempotent() {
        let pipeline = pipeline(1, "sleep 30", Duration::ZERO);
        pipeline.schedule_start(shell());
        wait_for_status(&pipeline, PipelineStatus::Running).await;

        pipeline.kill().await.unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Killed);

        // The process has been reaped by the time kill returns
        wait_exited(&pipeline).await;
        assert_eq!(pipeline.status(), PipelineStatus::Killed);
        assert!(pipeline.info().finished_at.is_some());

        pipeline.kill().await.unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Killed);
    }

    #[tokio::test]
    async fn test_kill_reaches_child_processes() {
        let pipeline = pipeline(1, "sleep 30 & sleep 30; wait", Duration::ZERO);
        pipeline.schedule_start(shell());
        wait_for_status(&pipeline, PipelineStatus::Running).await;

        tokio::time::timeout(TEST_TIMEOUT, pipeline.kill())
            .await
            .expect("kill hung")
            .unwrap();

        wait_exited(&pipeline).await;
        assert_eq!(pipeline.status(), PipelineStatus::Killed);
    }

    #[tokio::test]
    async fn test_kill_after_finish_keeps_finished() {
        let pipeline = pipeline(1, "true", Duration::ZERO);
        pipeline.schedule_start(shell());
        wait_exited(&pipeline).await;

        pipeline.kill().await.unwrap();

        assert_eq!(pipeline.status(), PipelineStatus::Finished);
    }

    #[tokio::test]
    async fn test_partial_output_while_running() {
        let pipeline = pipeline(1, "echo first; sleep 30", Duration::ZERO);
        pipeline.schedule_start(shell());

        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        loop {
            if pipeline.output().unwrap() == b"first\n" {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "no partial output");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pipeline.status(), PipelineStatus::Running);

        pipeline.kill().await.unwrap();
        assert_eq!(pipeline.output().unwrap(), b"first\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_kill_racing_exit_resolves_to_terminal_status() {
        for id in 0..20 {
            let pipeline = pipeline(id, "true", Duration::ZERO);
            pipeline.schedule_start(shell());
            wait_for_status_or_terminal(&pipeline).await;

            let killers: Vec<_> = (0..3)
                .map(|_| {
                    let pipeline = pipeline.clone();
                    tokio::spawn(async move { pipeline.kill().await })
                })
                .collect();
            for killer in killers {
                killer.await.unwrap().unwrap();
            }

            wait_exited(&pipeline).await;
            let status = pipeline.status();
            assert!(
                status == PipelineStatus::Finished || status == PipelineStatus::Killed,
                "unexpected final status {}",
                status
            );
        }
    }

    #[tokio::test]
    async fn test_exit_with_background_child_is_not_killed() {
        // The shell exits at once but `sleep` keeps the output pipes open
        let pipeline = pipeline(1, "sleep 5 & exit 0", Duration::ZERO);
        pipeline.schedule_start(shell());
        wait_for_status_or_terminal(&pipeline).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        pipeline.kill().await.unwrap();
        wait_exited(&pipeline).await;

        let info = pipeline.info();
        assert_eq!(info.status, PipelineStatus::Finished);
        assert_eq!(info.exit_code, Some(0));

        if let Some(pid) = info.pid {
            let _ = signal::terminate(pid);
        }
    }

    #[tokio::test]
    async fn test_kill_failure_leaves_status_unchanged() {
        let pipeline = pipeline(7, "sleep 30", Duration::from_secs(60));
        {
            let mut state = pipeline.state.lock();
            pipeline.transition(&mut state, PipelineStatus::Running);
            // Outside the pid range, so signalling it fails
            state.pid = Some(u32::MAX);
        }

        let result = pipeline.kill().await;

        assert!(matches!(
            result,
            Err(PipelineError::KillFailed {
                id: PipelineId(7),
                ..
            })
        ));
        assert_eq!(pipeline.status(), PipelineStatus::Running);
        let info = pipeline.info();
        assert_eq!(info.status, PipelineStatus::Running);
        assert!(info.finished_at.is_none());
    }

    #[test]
    fn test_registry_not_blocked_by_pipeline_lock() {
        let registry = Arc::new(Registry::new());
        let pending = |id| {
            Pipeline::new(
                id,
                PipelineDefinition::new("noop", vec![]),
                Duration::from_secs(60),
                KILL_TIMEOUT,
            )
        };
        let held = registry.register(pending).unwrap();
        let guard = held.state.lock();

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let running =
                    registry.list_identities(|p| p.status() == PipelineStatus::Running);
                let created = registry.register(pending).map(|p| p.id());
                tx.send((running, created)).unwrap();
            })
        };

        let (running, created) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("registry waited on a pipeline lock");
        drop(guard);
        worker.join().unwrap();

        assert!(running.is_empty());
        assert_eq!(created, Some(PipelineId(2)));
        assert_eq!(held.status(), PipelineStatus::Pending);
    }

    async fn wait_for_status_or_terminal(pipeline: &Pipeline) {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        while pipeline.status() == PipelineStatus::Pending {
            assert!(tokio::time::Instant::now() < deadline, "pipeline never started");
            tokio::task::yield_now().await;
        }
    }
}
