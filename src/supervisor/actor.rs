//! Single-writer supervisor actor.
//!
//! One background thread owns the `ConfigEngine` and the `BlueGreenReload`
//! state outright; every other thread talks to it only through the
//! `Command` channel. This follows the same shape as the sub-agent's
//! `runtime()` loop: a `crossbeam::select!` over a command channel, a stop
//! signal, and a ticker, with state mutation confined to the thread that
//! owns it.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, unbounded, Receiver};
use tracing::{error, info, warn};

use crate::config::{ConfigEngine, ConfigEngineError};
use crate::process::{BlockingHttpClient, HttpHealthChecker, ProcessEvent, RestartPolicy};
use crate::reload::{BlueGreenReload, ReloadError, ReloadOutcome, ReloadStrategyConfig, Slot};
use crate::utils::thread_context::{NotStartedThreadContext, StartedThreadContext, ThreadContextStopperError};

use super::commands::{ApplyAndReloadError, Command};
use super::state::{CrashLoopTracker, SupervisorState, SupervisorStatus};

pub struct SupervisorConfig {
    pub root_dir: PathBuf,
    pub collector_command: String,
    pub args_for_config_path: fn(&std::path::Path) -> Vec<String>,
    pub health_url_for_slot: fn(Slot) -> String,
    pub restart_policy_factory: Box<dyn Fn() -> RestartPolicy + Send>,
    pub health_check_timeout: Duration,
    pub health_check_poll_interval: Duration,
    /// Consecutive successful health probes required before a standby is
    /// trusted with cutover. See `ReloadStrategyConfig::health_gate_successes`.
    pub health_gate_successes: u32,
    /// Delay between the pointer swap and stopping the old active slot.
    /// See `ReloadStrategyConfig::drain_period`.
    pub drain_period: Duration,
    pub status_poll_interval: Duration,
    pub crash_loop_window: Duration,
    pub crash_loop_threshold: u32,
}

pub struct NotStartedSupervisor {
    config: SupervisorConfig,
}

impl NotStartedSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn start(self) -> Result<SupervisorHandle, ConfigEngineError> {
        let engine = ConfigEngine::load(self.config.root_dir.join("config"))?;
        let reload = BlueGreenReload::new(ReloadStrategyConfig {
            command: self.config.collector_command.clone(),
            args_for_config_path: self.config.args_for_config_path,
            config_dir: self.config.root_dir.join("collector"),
            health_check_timeout: self.config.health_check_timeout,
            health_check_poll_interval: self.config.health_check_poll_interval,
            health_gate_successes: self.config.health_gate_successes,
            drain_period: self.config.drain_period,
        })?;

        let (command_tx, command_rx) = unbounded::<Command>();
        let status_poll_interval = self.config.status_poll_interval;
        let restart_policy_factory = self.config.restart_policy_factory;
        let health_url_for_slot = self.config.health_url_for_slot;
        let crash_loop_window = self.config.crash_loop_window;
        let crash_loop_threshold = self.config.crash_loop_threshold;

        let thread_ctx = NotStartedThreadContext::new("supervisor", move |stop| {
            let mut actor = Actor {
                engine,
                reload,
                state: SupervisorState::Starting,
                crash_loop: CrashLoopTracker::new(crash_loop_window, crash_loop_threshold),
                restart_policy_factory,
                health_url_for_slot,
            };
            actor.run(command_rx, stop.as_ref().clone(), status_poll_interval);
        })
        .start();

        Ok(SupervisorHandle {
            commands: command_tx,
            thread_ctx,
        })
    }
}

struct Actor {
    engine: ConfigEngine,
    reload: BlueGreenReload,
    state: SupervisorState,
    crash_loop: CrashLoopTracker,
    restart_policy_factory: Box<dyn Fn() -> RestartPolicy + Send>,
    health_url_for_slot: fn(Slot) -> String,
}

impl Actor {
    fn run(
        &mut self,
        commands: Receiver<Command>,
        stop: channel::Receiver<()>,
        status_poll_interval: Duration,
    ) {
        let ticker = channel::tick(status_poll_interval);

        loop {
            // Recomputed every iteration: the active slot (and therefore
            // which process's events we should be watching) changes across
            // reloads, so there's no single fixed channel to select! over.
            // `channel::never()` stands in for "no collector currently
            // active" and simply never fires.
            let active_events = self.reload.active_process_events().unwrap_or_else(channel::never);

            channel::select! {
                recv(stop) -> _ => {
                    info!("supervisor actor stopping");
                    self.state = SupervisorState::Stopped;
                    return;
                }
                recv(commands) -> msg => {
                    match msg {
                        Ok(command) => self.handle_command(command),
                        Err(_) => return,
                    }
                }
                recv(active_events) -> msg => {
                    if let Ok(event) = msg {
                        self.handle_active_process_event(event);
                    }
                }
                recv(ticker) -> _ => {
                    // Idle tick: nothing to poll yet beyond what `Status`
                    // already reports on demand. Reserved for a future
                    // periodic liveness sweep of the active slot.
                }
            }
        }
    }

    /// Feeds a crash of the *already active* collector into the same
    /// crash-loop tracker that reload/activation failures use, so a
    /// collector that keeps dying after a successful cutover also trips
    /// `Degraded` instead of restarting forever unnoticed by the rest of
    /// the supervisor.
    fn handle_active_process_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Exited { code } => {
                warn!(?code, "active collector process exited");
                if self.crash_loop.record_failure(SystemTime::now()) {
                    error!("crash-loop threshold exceeded on active collector, marking supervisor degraded");
                    self.give_up_on_active_collector();
                }
            }
            ProcessEvent::RestartsExhausted => {
                error!("active collector exhausted its restart policy, giving up on it");
                self.give_up_on_active_collector();
            }
            ProcessEvent::Started { .. } | ProcessEvent::Restarting { .. } => {}
        }
    }

    /// Tears down the active slot so `status()` reports no collector
    /// running (`collector_pid: None`), and marks the supervisor degraded.
    /// A subsequent successful `Activate` resets the crash-loop counter and
    /// restores an active slot, same as a failed-reload recovery.
    fn give_up_on_active_collector(&mut self) {
        if let Err(err) = self.reload.force_stop_active() {
            warn!(error = ?err, "error tearing down crash-looping collector process");
        }
        self.state = SupervisorState::Degraded;
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SubmitConfig { raw, reply } => {
                let result = self.engine.submit(raw);
                let _ = reply.send(result);
            }
            Command::ApplyAndReload { raw, reply } => {
                let result = self.apply_and_reload(raw);
                let _ = reply.send(result);
            }
            Command::Activate { id, reply } => {
                let result = self.activate(id).map_err(|err| err.to_string());
                let _ = reply.send(result);
            }
            Command::Rollback { reply } => {
                let result = self.rollback().map_err(|err| err.to_string());
                let _ = reply.send(result);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::ListVersions { limit, reply } => {
                let versions = self.engine.list(limit).into_iter().cloned().collect();
                let _ = reply.send(versions);
            }
            Command::GetVersion { id, reply } => {
                let _ = reply.send(self.engine.get(id).cloned());
            }
        }
    }

    /// Validates, submits, and activates `raw` in one step, for `POST
    /// /config`'s validate+apply+reload contract. `SubmitConfig` on its own
    /// deliberately stops short of activation so a caller can stage a
    /// version before committing to it; this composes that with `activate`
    /// for the one-shot case.
    fn apply_and_reload(&mut self, raw: Vec<u8>) -> Result<u64, ApplyAndReloadError> {
        let id = self.engine.submit(raw).map_err(ApplyAndReloadError::Validation)?;
        self.activate(id).map_err(|err| ApplyAndReloadError::ReloadFailed(err.to_string()))?;
        Ok(id)
    }

    fn activate(&mut self, id: u64) -> Result<(), SupervisorActorError> {
        if self.state == SupervisorState::Degraded {
            warn!("reactivating configuration while degraded; clearing crash-loop history");
            self.crash_loop.reset();
        }

        self.state = SupervisorState::Reloading;

        let version = self
            .engine
            .get(id)
            .ok_or(SupervisorActorError::VersionNotFound(id))?
            .clone();

        let reload_result = {
            let standby = self.reload.active_slot().map(Slot::other).unwrap_or(Slot::Blue);
            let health_url = (self.health_url_for_slot)(standby);
            let client = BlockingHttpClient::new(health_url);
            let checker = HttpHealthChecker::new(client, "/health");
            self.reload.apply(&version.config, (self.restart_policy_factory)(), &checker)
        };

        match reload_result {
            Ok(ReloadOutcome::Unchanged) => {
                self.engine.activate(id).map_err(SupervisorActorError::Engine)?;
                self.state = SupervisorState::Running;
                Ok(())
            }
            Ok(ReloadOutcome::CutOver { .. }) => {
                self.engine.activate(id).map_err(SupervisorActorError::Engine)?;
                self.crash_loop.reset();
                self.state = SupervisorState::Running;
                Ok(())
            }
            Err(ReloadError::HealthCheckTimeout) => {
                let reason = "standby collector failed its health check".to_string();
                let _ = self.engine.fail(id, reason.clone());
                if self.crash_loop.record_failure(SystemTime::now()) {
                    error!(version_id = id, "crash-loop threshold exceeded, marking supervisor degraded");
                    self.state = SupervisorState::Degraded;
                } else {
                    self.state = SupervisorState::Running;
                }
                Err(SupervisorActorError::HealthCheckFailed(reason))
            }
            Err(ReloadError::Io(err)) => {
                let reason = err.to_string();
                let _ = self.engine.fail(id, reason.clone());
                self.state = SupervisorState::Running;
                Err(SupervisorActorError::Io(reason))
            }
        }
    }

    fn rollback(&mut self) -> Result<u64, SupervisorActorError> {
        let target = self.engine.rollback().map_err(SupervisorActorError::Engine)?;
        self.activate(target)?;
        Ok(target)
    }

    fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            state: self.state,
            current_version: self.engine.current().map(|v| v.id),
            collector_pid: self.reload.active_pid(),
            consecutive_failures: self.crash_loop.consecutive_failures(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SupervisorActorError {
    #[error("no version with id {0}")]
    VersionNotFound(u64),
    #[error("config engine error: {0}")]
    Engine(#[from] ConfigEngineError),
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),
    #[error("io error: {0}")]
    Io(String),
}

pub struct SupervisorHandle {
    commands: channel::Sender<Command>,
    thread_ctx: StartedThreadContext,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorHandleError {
    #[error("supervisor actor is no longer running")]
    ActorGone,
}

impl SupervisorHandle {
    /// A cheaply cloneable client carrying only the command sender, for
    /// handing out to things like the Control API that must not be able to
    /// stop the actor thread itself.
    pub fn client(&self) -> channel::Sender<Command> {
        self.commands.clone()
    }

    pub fn submit_config(&self, raw: Vec<u8>) -> Result<Result<u64, Vec<crate::config::ValidationError>>, SupervisorHandleError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands
            .send(Command::SubmitConfig { raw, reply: reply_tx })
            .map_err(|_| SupervisorHandleError::ActorGone)?;
        reply_rx.recv().map_err(|_| SupervisorHandleError::ActorGone)
    }

    pub fn apply_and_reload(&self, raw: Vec<u8>) -> Result<Result<u64, ApplyAndReloadError>, SupervisorHandleError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands
            .send(Command::ApplyAndReload { raw, reply: reply_tx })
            .map_err(|_| SupervisorHandleError::ActorGone)?;
        reply_rx.recv().map_err(|_| SupervisorHandleError::ActorGone)
    }

    pub fn activate(&self, id: u64) -> Result<Result<(), String>, SupervisorHandleError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands
            .send(Command::Activate { id, reply: reply_tx })
            .map_err(|_| SupervisorHandleError::ActorGone)?;
        reply_rx.recv().map_err(|_| SupervisorHandleError::ActorGone)
    }

    pub fn rollback(&self) -> Result<Result<u64, String>, SupervisorHandleError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands
            .send(Command::Rollback { reply: reply_tx })
            .map_err(|_| SupervisorHandleError::ActorGone)?;
        reply_rx.recv().map_err(|_| SupervisorHandleError::ActorGone)
    }

    pub fn status(&self) -> Result<SupervisorStatus, SupervisorHandleError> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands
            .send(Command::Status { reply: reply_tx })
            .map_err(|_| SupervisorHandleError::ActorGone)?;
        reply_rx.recv().map_err(|_| SupervisorHandleError::ActorGone)
    }

    pub fn stop(self) -> Result<(), ThreadContextStopperError> {
        self.thread_ctx.stop_blocking()
    }
}
