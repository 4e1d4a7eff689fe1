//! Owns the collector child process: spawns it, watches it, and restarts it
//! under a [`RestartPolicy`] when it exits on its own.
//!
//! Grounded in the on-host supervisor's process-watch thread: a single
//! background thread owns the `Child` handle end to end, polls it with
//! `try_wait` rather than blocking on `wait` so it can also observe a stop
//! request, and escalates SIGTERM to SIGKILL if the process ignores the
//! grace period.

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::utils::thread_context::{
    CancellationMessage, NotStartedThreadContext, StartedThreadContext, ThreadContextStopperError,
};

use super::restart_policy::RestartPolicy;
use super::shutdown::{ProcessTerminator, GRACE_PERIOD};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How long a process must stay up before we consider it stable and reset
/// the restart policy's attempt counter, preventing a process that crashes
/// once an hour from eventually exhausting `max_retries`.
const STABILITY_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started { pid: u32 },
    Exited { code: Option<i32> },
    Restarting { attempt: u32, delay: Duration },
    RestartsExhausted,
}

pub struct ProcessManagerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub restart_policy: RestartPolicy,
}

pub struct NotStartedProcessManager {
    config: ProcessManagerConfig,
}

impl NotStartedProcessManager {
    pub fn new(config: ProcessManagerConfig) -> Self {
        Self { config }
    }

    pub fn start(self) -> StartedProcessManager {
        let current_pid = Arc::new(Mutex::new(None));
        let (event_publisher, event_consumer) = pub_sub::<ProcessEvent>();

        let thread_pid = current_pid.clone();
        let ProcessManagerConfig {
            command,
            args,
            mut restart_policy,
        } = self.config;

        let thread_ctx = NotStartedThreadContext::new("collector-process-manager", move |stop| {
            run(command, args, &mut restart_policy, thread_pid, event_publisher, stop);
        })
        .start();

        StartedProcessManager {
            thread_ctx,
            current_pid,
            events: event_consumer,
        }
    }
}

pub struct StartedProcessManager {
    thread_ctx: StartedThreadContext,
    current_pid: Arc<Mutex<Option<u32>>>,
    events: EventConsumer<ProcessEvent>,
}

impl StartedProcessManager {
    pub fn current_pid(&self) -> Option<u32> {
        *self.current_pid.lock().expect("current_pid mutex poisoned")
    }

    pub fn is_running(&self) -> bool {
        !self.thread_ctx.is_finished()
    }

    pub fn events(&self) -> &EventConsumer<ProcessEvent> {
        &self.events
    }

    /// A cloned raw receiver for `select!`ing over this process's events
    /// alongside other channels. `crossbeam::channel::Receiver` is always
    /// `Clone` regardless of the payload type, so this doesn't require
    /// `EventConsumer` itself to be `Clone`.
    pub fn events_receiver(&self) -> crossbeam::channel::Receiver<ProcessEvent> {
        self.events.as_ref().clone()
    }

    pub fn stop(self) -> Result<(), ThreadContextStopperError> {
        self.thread_ctx.stop_blocking()
    }
}

fn run(
    command: String,
    args: Vec<String>,
    restart_policy: &mut RestartPolicy,
    current_pid: Arc<Mutex<Option<u32>>>,
    events: EventPublisher<ProcessEvent>,
    stop: EventConsumer<CancellationMessage>,
) {
    loop {
        let mut child = match spawn(&command, &args) {
            Ok(child) => child,
            Err(err) => {
                warn!(error = %err, command = %command, "failed to spawn collector process");
                if !restart_policy.should_backoff() {
                    let _ = events.publish(ProcessEvent::RestartsExhausted);
                    return;
                }
                let delay = restart_policy.next_delay();
                let _ = events.publish(ProcessEvent::Restarting {
                    attempt: restart_policy.tries(),
                    delay,
                });
                std::thread::sleep(delay);
                continue;
            }
        };

        *current_pid.lock().expect("current_pid mutex poisoned") = Some(child.id());
        info!(pid = child.id(), command = %command, "collector process started");
        let _ = events.publish(ProcessEvent::Started { pid: child.id() });
        let started_at = Instant::now();

        let outcome = watch(&mut child, &stop);
        *current_pid.lock().expect("current_pid mutex poisoned") = None;

        match outcome {
            WatchOutcome::StoppedByRequest => return,
            WatchOutcome::Exited(code) => {
                info!(code = ?code, "collector process exited");
                let _ = events.publish(ProcessEvent::Exited { code });

                if started_at.elapsed() >= STABILITY_THRESHOLD {
                    restart_policy.reset();
                }

                if !restart_policy.should_backoff() {
                    let _ = events.publish(ProcessEvent::RestartsExhausted);
                    return;
                }

                let delay = restart_policy.next_delay();
                let _ = events.publish(ProcessEvent::Restarting {
                    attempt: restart_policy.tries(),
                    delay,
                });
                std::thread::sleep(delay);
            }
        }
    }
}

enum WatchOutcome {
    StoppedByRequest,
    Exited(Option<i32>),
}

fn watch(child: &mut Child, stop: &EventConsumer<CancellationMessage>) -> WatchOutcome {
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            return WatchOutcome::Exited(status.code());
        }

        if stop.as_ref().try_recv().is_ok() {
            shutdown_gracefully(child);
            return WatchOutcome::StoppedByRequest;
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

fn shutdown_gracefully(child: &mut Child) {
    let terminator = ProcessTerminator::new(child.id());
    if let Err(err) = terminator.terminate() {
        warn!(error = %err, "failed to send SIGTERM to collector process");
    }

    let deadline = Instant::now() + GRACE_PERIOD;
    while Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    warn!("collector process ignored SIGTERM, escalating to SIGKILL");
    if let Err(err) = terminator.kill() {
        warn!(error = %err, "failed to send SIGKILL to collector process");
    }
    let _ = child.wait();
}

fn spawn(command: &str, args: &[String]) -> std::io::Result<Child> {
    Command::new(command)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::restart_policy::BackoffStrategy;
    use std::time::Duration;

    fn policy() -> RestartPolicy {
        RestartPolicy::new(BackoffStrategy::Fixed, Duration::from_millis(50), 3)
    }

    #[test]
    fn starts_and_reports_a_pid() {
        let manager = NotStartedProcessManager::new(ProcessManagerConfig {
            command: "sleep".into(),
            args: vec!["5".into()],
            restart_policy: policy(),
        })
        .start();

        let event = manager.events().as_ref().recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, ProcessEvent::Started { .. }));
        assert!(manager.current_pid().is_some());

        manager.stop().unwrap();
    }

    #[test]
    fn restarts_a_process_that_exits_early() {
        let manager = NotStartedProcessManager::new(ProcessManagerConfig {
            command: "true".into(),
            args: vec![],
            restart_policy: policy(),
        })
        .start();

        let mut saw_restarting = false;
        for _ in 0..10 {
            if let Ok(event) = manager.events().as_ref().recv_timeout(Duration::from_secs(1)) {
                if matches!(event, ProcessEvent::Restarting { .. }) {
                    saw_restarting = true;
                    break;
                }
            }
        }
        assert!(saw_restarting);
        manager.stop().unwrap();
    }

    #[test]
    fn gives_up_after_exhausting_retries() {
        let manager = NotStartedProcessManager::new(ProcessManagerConfig {
            command: "false".into(),
            args: vec![],
            restart_policy: RestartPolicy::new(BackoffStrategy::Fixed, Duration::from_millis(10), 1),
        })
        .start();

        let mut saw_exhausted = false;
        for _ in 0..20 {
            if let Ok(event) = manager.events().as_ref().recv_timeout(Duration::from_secs(1)) {
                if matches!(event, ProcessEvent::RestartsExhausted) {
                    saw_exhausted = true;
                    break;
                }
            }
        }
        assert!(saw_exhausted);
    }
}
