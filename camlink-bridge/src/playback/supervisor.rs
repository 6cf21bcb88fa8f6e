//! Watchdog supervisor thread
//!
//! Owns the output backend and the output graph for as long as the pipeline
//! is started. Platform streams may be `!Send`, so the graph is created,
//! monitored and torn down on this one thread, which runs a single-threaded
//! tokio runtime: a `time::interval` ticker drives the watchdog and a command
//! channel carries stop and manual rebuild requests.
//!
//! Each tick also turns the real-time counters into log lines and events,
//! since the render path itself never logs.

use crate::audio::backend::{OutputBackend, OutputGraph};
use crate::audio::types::OutputFormat;
use crate::error::{Error, Result};
use crate::playback::output_node::OutputNode;
use crate::playback::stats::PipelineStats;
use crate::playback::watchdog::{Decision, Observation, PipelineWatchdog, WatchdogConfig};
use camlink_common::{BridgeEvent, EventBus, PipelineState};
use chrono::Utc;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Ticks between periodic health lines
const HEALTH_LOG_EVERY_TICKS: u64 = 10;

/// Requests from the pipeline to its supervisor
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Tear down the graph and exit, handing the backend back
    Stop,
    /// Reconfigure and reopen the output now without spending a restart
    /// attempt
    RebuildNow,
}

/// State shared between the pipeline handle and its supervisor
#[derive(Debug)]
pub struct SharedStatus {
    state: AtomicU8,
    restart_attempts: AtomicU32,
    stream_errors: AtomicU32,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(state_to_u8(PipelineState::Idle)),
            restart_attempts: AtomicU32::new(0),
            stream_errors: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> PipelineState {
        match self.state.load(Ordering::Acquire) {
            1 => PipelineState::Started,
            2 => PipelineState::Failed,
            _ => PipelineState::Idle,
        }
    }

    pub fn set_state(&self, state: PipelineState) {
        self.state.store(state_to_u8(state), Ordering::Release);
    }

    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts.load(Ordering::Acquire)
    }

    pub fn set_restart_attempts(&self, attempts: u32) {
        self.restart_attempts.store(attempts, Ordering::Release);
    }

    /// Stream errors the output backend has reported over its lifetime
    pub fn stream_errors(&self) -> u32 {
        self.stream_errors.load(Ordering::Acquire)
    }

    pub fn set_stream_errors(&self, errors: u32) {
        self.stream_errors.store(errors, Ordering::Release);
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

fn state_to_u8(state: PipelineState) -> u8 {
    match state {
        PipelineState::Idle => 0,
        PipelineState::Started => 1,
        PipelineState::Failed => 2,
    }
}

/// Everything a supervisor needs besides the backend
pub struct SupervisorContext {
    pub node: Arc<OutputNode>,
    pub stats: Arc<PipelineStats>,
    pub status: Arc<SharedStatus>,
    pub events: EventBus,
    pub format: OutputFormat,
    pub tick_interval: Duration,
    pub watchdog: WatchdogConfig,
}

/// Handle to a running supervisor thread
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
    thread: JoinHandle<Box<dyn OutputBackend>>,
}

/// Start the supervisor and open the output graph.
///
/// Blocks until the backend has been configured and opened. On failure the
/// thread has already exited and the backend is handed back with the error.
///
/// Must not be called from inside an async runtime.
pub fn spawn(
    backend: Box<dyn OutputBackend>,
    ctx: SupervisorContext,
) -> std::result::Result<SupervisorHandle, (Error, Option<Box<dyn OutputBackend>>)> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (commands, command_rx) = mpsc::unbounded_channel();

    let thread = thread::Builder::new()
        .name("camlink-watchdog".to_string())
        .spawn(move || Supervisor::new(backend, ctx).run(command_rx, ready_tx))
        .map_err(|e| {
            (
                Error::Internal(format!("Failed to spawn supervisor thread: {}", e)),
                None,
            )
        })?;

    match ready_rx.blocking_recv() {
        Ok(Ok(())) => Ok(SupervisorHandle { commands, thread }),
        Ok(Err(e)) => Err((e, thread.join().ok())),
        Err(_) => Err((
            Error::Internal("Supervisor exited during startup".to_string()),
            thread.join().ok(),
        )),
    }
}

impl SupervisorHandle {
    pub fn request_rebuild(&self) -> Result<()> {
        self.commands
            .send(SupervisorCommand::RebuildNow)
            .map_err(|_| Error::InvalidState("Supervisor is not running".to_string()))
    }

    /// Stop the supervisor and recover the backend.
    ///
    /// Returns `None` if the supervisor thread panicked.
    pub fn shutdown(self) -> Option<Box<dyn OutputBackend>> {
        // Already exited (terminal failure) if the send fails
        let _ = self.commands.send(SupervisorCommand::Stop);
        match self.thread.join() {
            Ok(backend) => Some(backend),
            Err(_) => {
                error!("Supervisor thread panicked; output backend lost");
                None
            }
        }
    }
}

enum TickFlow {
    Continue,
    Exit,
}

struct Supervisor {
    backend: Box<dyn OutputBackend>,
    graph: Option<Box<dyn OutputGraph>>,
    ctx: SupervisorContext,
    watchdog: PipelineWatchdog,
    diagnostics: Diagnostics,
}

impl Supervisor {
    fn new(backend: Box<dyn OutputBackend>, ctx: SupervisorContext) -> Self {
        let watchdog = PipelineWatchdog::new(ctx.watchdog);
        Self {
            backend,
            graph: None,
            ctx,
            watchdog,
            diagnostics: Diagnostics::default(),
        }
    }

    fn run(
        mut self,
        commands: mpsc::UnboundedReceiver<SupervisorCommand>,
        ready: oneshot::Sender<Result<()>>,
    ) -> Box<dyn OutputBackend> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = ready.send(Err(Error::Internal(format!(
                    "Failed to build supervisor runtime: {}",
                    e
                ))));
                return self.backend;
            }
        };

        if let Err(e) = self.open_output() {
            self.ctx.node.set_running(false);
            let _ = ready.send(Err(e));
            return self.backend;
        }

        self.watchdog.arm();
        let stream_errors = self.backend.stream_errors();
        self.ctx.status.set_stream_errors(stream_errors);
        self.diagnostics = Diagnostics::starting_from(&self.ctx.stats, stream_errors);
        if ready.send(Ok(())).is_err() {
            self.teardown();
            return self.backend;
        }

        runtime.block_on(self.supervise(commands));
        self.teardown();
        self.backend
    }

    async fn supervise(&mut self, mut commands: mpsc::UnboundedReceiver<SupervisorCommand>) {
        let mut ticker = time::interval(self.ctx.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        info!(
            "Watchdog started ({}ms interval, max {} restart attempts)",
            self.ctx.tick_interval.as_millis(),
            self.watchdog.max_restart_attempts()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let TickFlow::Exit = self.on_tick() {
                        break;
                    }
                }
                command = commands.recv() => match command {
                    Some(SupervisorCommand::RebuildNow) => self.manual_rebuild(),
                    Some(SupervisorCommand::Stop) | None => {
                        debug!("Watchdog stopping");
                        break;
                    }
                },
            }
        }
    }

    fn open_output(&mut self) -> Result<()> {
        self.backend.configure(&self.ctx.format)?;
        self.ctx.stats.reset_callback_count();
        self.graph = Some(self.backend.open(Arc::clone(&self.ctx.node))?);
        info!(
            "Output graph running on '{}' backend ({} Hz, {} ch)",
            self.backend.name(),
            self.ctx.format.sample_rate,
            self.ctx.format.channels
        );
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.stop();
        }
    }

    fn on_tick(&mut self) -> TickFlow {
        let data_received = self.ctx.stats.frames_received() > 0;
        let stream_errors = self.backend.stream_errors();
        self.ctx.status.set_stream_errors(stream_errors);
        self.diagnostics.report(&self.ctx, data_received, stream_errors);

        let obs = Observation {
            callback_count: self.ctx.stats.callback_count(),
            graph_running: self.graph.as_ref().is_some_and(|g| g.is_running()),
            data_received,
        };

        let flow = match self.watchdog.observe(obs) {
            Decision::Idle | Decision::Healthy => TickFlow::Continue,
            Decision::Rebuild { attempt } => {
                warn!(
                    "Output stall detected (callbacks={}, graph_running={}); rebuild attempt {}/{}",
                    obs.callback_count,
                    obs.graph_running,
                    attempt,
                    self.watchdog.max_restart_attempts()
                );
                self.ctx.events.emit_lossy(BridgeEvent::StallDetected {
                    callback_count: obs.callback_count,
                    graph_running: obs.graph_running,
                    attempt,
                    timestamp: Utc::now(),
                });
                self.rebuild(attempt);
                self.watchdog.rebuild_completed();
                TickFlow::Continue
            }
            Decision::Failed { attempts } => {
                error!(
                    "Output still stalled after {} restart attempts; pipeline failed",
                    attempts
                );
                self.teardown();
                self.ctx.node.set_running(false);
                self.ctx.status.set_state(PipelineState::Failed);
                self.ctx.events.emit_lossy(BridgeEvent::PipelineFailed {
                    attempts,
                    timestamp: Utc::now(),
                });
                TickFlow::Exit
            }
        };

        self.ctx
            .status
            .set_restart_attempts(self.watchdog.restart_attempts());
        flow
    }

    /// Tear down and reopen the output. Ring buffer contents are kept.
    fn rebuild(&mut self, attempt: u32) {
        self.teardown();

        match self.open_output() {
            Ok(()) => {
                let buffered = self.ctx.node.ring().available_samples();
                info!(
                    "Output graph rebuilt (attempt {}, {} samples buffered)",
                    attempt, buffered
                );
                self.ctx.events.emit_lossy(BridgeEvent::OutputRebuilt {
                    attempt,
                    buffered_samples: buffered,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                self.graph = None;
                warn!("Output rebuild attempt {} failed: {}", attempt, e);
                self.ctx.events.emit_lossy(BridgeEvent::OutputRebuildFailed {
                    attempt,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn manual_rebuild(&mut self) {
        if self.watchdog.is_failed() {
            warn!("Ignoring rebuild request: pipeline has failed");
            return;
        }
        info!("Manual output rebuild requested");
        self.rebuild(0);
        self.watchdog.rebuild_completed();
    }
}

/// Tracks counter values between ticks so each tick logs only what changed
#[derive(Debug, Default)]
struct Diagnostics {
    last_underruns: u64,
    last_overruns: u64,
    last_stream_errors: u32,
    ticks: u64,
}

impl Diagnostics {
    fn starting_from(stats: &PipelineStats, stream_errors: u32) -> Self {
        Self {
            last_underruns: stats.underrun_count(),
            last_overruns: stats.overrun_count(),
            last_stream_errors: stream_errors,
            ticks: 0,
        }
    }

    fn report(&mut self, ctx: &SupervisorContext, data_received: bool, stream_errors: u32) {
        self.ticks += 1;
        let stats = &ctx.stats;

        if stream_errors > self.last_stream_errors {
            warn!(
                "{} output stream errors in last tick (total {})",
                stream_errors - self.last_stream_errors,
                stream_errors
            );
        }
        self.last_stream_errors = stream_errors;

        let underruns = stats.underrun_count();
        let new_underruns = underruns.saturating_sub(self.last_underruns);
        self.last_underruns = underruns;
        if new_underruns > 0 {
            if data_received {
                warn!(
                    "{} render underruns in last tick (total {}); source not keeping up",
                    new_underruns, underruns
                );
                ctx.events.emit_lossy(BridgeEvent::BufferUnderrun {
                    new_underruns,
                    total: underruns,
                    timestamp: Utc::now(),
                });
            } else {
                // No frames yet: silence is expected
                trace!("{} underruns while waiting for first frame", new_underruns);
            }
        }

        let overruns = stats.overrun_count();
        let dropped = overruns.saturating_sub(self.last_overruns);
        self.last_overruns = overruns;
        if dropped > 0 {
            warn!(
                "Ring buffer overrun: dropped {} oldest samples (total {})",
                dropped, overruns
            );
            ctx.events.emit_lossy(BridgeEvent::BufferOverrun {
                dropped,
                total: overruns,
                timestamp: Utc::now(),
            });
        }

        if self.ticks % HEALTH_LOG_EVERY_TICKS == 0 {
            debug!(
                "Pipeline health: fill={:.1}%, buffered={}, callbacks={}, written={}, read={}, underruns={}, overruns={}",
                ctx.node.ring().fill_level() * 100.0,
                ctx.node.ring().available_samples(),
                stats.callback_count(),
                stats.total_samples_written(),
                stats.total_samples_read(),
                underruns,
                overruns
            );
        }
    }
}
