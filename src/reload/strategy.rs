//! Blue-green reload: stand up a second collector process against the new
//! configuration, health-check it, and only then stop the old one.
//!
//! Mirrors the sub-agent's remote-config swap (`sub_agent.rs::handle_remote_config`):
//! build the new thing first, and only tear down the old one once the new
//! one has proven itself. If the new process never becomes healthy, the old
//! one keeps serving traffic and the caller is told to mark the submitted
//! version `Failed` rather than `Active`.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{canonical_bytes, generate, UserConfig};
use crate::process::{
    HealthChecker, NotStartedProcessManager, ProcessManagerConfig, RestartPolicy, StartedProcessManager,
};
use crate::utils::thread_context::ThreadContextStopperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Blue,
    Green,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::Blue => Slot::Green,
            Slot::Green => Slot::Blue,
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Slot::Blue => "blue.json",
            Slot::Green => "green.json",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to write collector config to disk: {0}")]
    Io(#[from] std::io::Error),
    #[error("standby collector did not become healthy within the grace period")]
    HealthCheckTimeout,
}

#[derive(Debug, PartialEq)]
pub enum ReloadOutcome {
    /// The generated collector config was byte-identical to what's already
    /// running; no process was started or stopped.
    Unchanged,
    CutOver { slot: Slot },
}

pub struct ReloadStrategyConfig {
    pub command: String,
    /// Builds the child process's argv given the standby slot's config file
    /// path, e.g. `|path| vec!["--config".into(), path.display().to_string()]`.
    pub args_for_config_path: fn(&std::path::Path) -> Vec<String>,
    pub config_dir: PathBuf,
    pub health_check_timeout: Duration,
    pub health_check_poll_interval: Duration,
    /// Number of consecutive successful health probes the standby must post
    /// before it is trusted with the cutover (spec.md §4.E step 4's health
    /// gate). Default 3.
    pub health_gate_successes: u32,
    /// How long the old active is left running after the pointer swap so
    /// in-flight work can finish (spec.md §4.E step 6). Default 15s.
    pub drain_period: Duration,
}

struct SlotState {
    manager: StartedProcessManager,
    config_bytes: Vec<u8>,
}

pub struct BlueGreenReload {
    config: ReloadStrategyConfig,
    active: Option<Slot>,
    blue: Option<SlotState>,
    green: Option<SlotState>,
}

impl BlueGreenReload {
    pub fn new(config: ReloadStrategyConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.config_dir)?;
        Ok(Self {
            config,
            active: None,
            blue: None,
            green: None,
        })
    }

    fn slot_state(&self, slot: Slot) -> &Option<SlotState> {
        match slot {
            Slot::Blue => &self.blue,
            Slot::Green => &self.green,
        }
    }

    fn set_slot_state(&mut self, slot: Slot, state: Option<SlotState>) {
        match slot {
            Slot::Blue => self.blue = state,
            Slot::Green => self.green = state,
        }
    }

    /// Generates the collector config for `user_config`, and if it differs
    /// from whatever is currently active, starts a standby collector
    /// against it, health-checks it, and cuts over on success.
    pub fn apply(
        &mut self,
        user_config: &UserConfig,
        restart_policy: RestartPolicy,
        health_checker: &dyn HealthChecker,
    ) -> Result<ReloadOutcome, ReloadError> {
        let generated = generate(user_config);
        let bytes = canonical_bytes(&generated);

        if let Some(active) = self.active {
            if let Some(state) = self.slot_state(active) {
                if state.config_bytes == bytes {
                    return Ok(ReloadOutcome::Unchanged);
                }
            }
        }

        let standby = self.active.map(Slot::other).unwrap_or(Slot::Blue);
        let config_path = self.config.config_dir.join(standby.file_name());
        fs::write(&config_path, &bytes)?;

        let manager = NotStartedProcessManager::new(ProcessManagerConfig {
            command: self.config.command.clone(),
            args: (self.config.args_for_config_path)(&config_path),
            restart_policy,
        })
        .start();

        if !wait_for_healthy(
            health_checker,
            self.config.health_check_timeout,
            self.config.health_check_poll_interval,
            self.config.health_gate_successes,
        ) {
            warn!(?standby, "standby collector failed to become healthy, aborting cutover");
            let _ = manager.stop();
            return Err(ReloadError::HealthCheckTimeout);
        }

        info!(?standby, "standby collector healthy, cutting over");

        let old_active = self.active.take();

        // Swap the pointer first: from here on, `active_pid`/
        // `active_process_events` observe the new standby, not a gap, per
        // spec.md §4.E step 5. The old slot keeps running and is only
        // stopped after the drain period below.
        self.set_slot_state(
            standby,
            Some(SlotState {
                manager,
                config_bytes: bytes,
            }),
        );
        self.active = Some(standby);

        if old_active.is_some() && !self.config.drain_period.is_zero() {
            std::thread::sleep(self.config.drain_period);
        }

        if let Some(old_active) = old_active {
            if let Some(old_state) = self.slot_state_mut(old_active) {
                if let Err(err) = old_state.manager.stop() {
                    warn!(error = ?err, "error stopping previous collector process");
                }
            }
        }

        Ok(ReloadOutcome::CutOver { slot: standby })
    }

    fn slot_state_mut(&mut self, slot: Slot) -> Option<SlotState> {
        match slot {
            Slot::Blue => self.blue.take(),
            Slot::Green => self.green.take(),
        }
    }

    pub fn active_slot(&self) -> Option<Slot> {
        self.active
    }

    /// The active slot's process id, if a collector is currently running.
    pub fn active_pid(&self) -> Option<u32> {
        self.active.and_then(|slot| self.slot_state(slot).as_ref()).and_then(|state| state.manager.current_pid())
    }

    /// A cloned receiver for the active slot's process events, for
    /// `select!`ing alongside the supervisor's command channel. Returns
    /// `None` when no collector is currently active.
    pub fn active_process_events(&self) -> Option<crossbeam::channel::Receiver<crate::process::ProcessEvent>> {
        self.active.and_then(|slot| self.slot_state(slot).as_ref()).map(|state| state.manager.events_receiver())
    }

    /// Tears down the active slot unconditionally, e.g. after the process
    /// manager reports it has given up restarting on its own. A stop error
    /// against an already-exited thread context is non-fatal and left for
    /// the caller to log.
    pub fn force_stop_active(&mut self) -> Result<(), ThreadContextStopperError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        match self.slot_state_mut(active) {
            Some(state) => state.manager.stop(),
            None => Ok(()),
        }
    }
}

/// Health-gates the standby per spec.md §4.E step 4: `required_successes`
/// *consecutive* successful probes, not just one. Any failure resets the
/// streak back to zero rather than letting a single lucky 200 cut traffic
/// over to a flaky process.
fn wait_for_healthy(
    checker: &dyn HealthChecker,
    timeout: Duration,
    poll_interval: Duration,
    required_successes: u32,
) -> bool {
    let deadline = Instant::now() + timeout;
    let mut consecutive_successes = 0u32;
    loop {
        if checker.check_health().is_ok() {
            consecutive_successes += 1;
            if consecutive_successes >= required_successes.max(1) {
                return true;
            }
        } else {
            consecutive_successes = 0;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LicenseKey;
    use crate::process::restart_policy::BackoffStrategy;
    use std::collections::BTreeMap;

    fn user_config() -> UserConfig {
        UserConfig {
            service_name: "svc".into(),
            environment: "production".into(),
            license_key: LicenseKey::new("x".repeat(32)),
            metrics_enabled: true,
            metrics_interval: Duration::from_secs(60),
            redact_secrets: true,
            enrich_host_metadata: true,
            cardinality_global_limit: 1000,
            per_metric_limits: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    struct AlwaysHealthy;
    impl HealthChecker for AlwaysHealthy {
        fn check_health(&self) -> Result<(), crate::process::HealthCheckError> {
            Ok(())
        }
    }

    struct NeverHealthy;
    impl HealthChecker for NeverHealthy {
        fn check_health(&self) -> Result<(), crate::process::HealthCheckError> {
            Err(crate::process::HealthCheckError::UnhealthyStatusCode(503))
        }
    }

    /// Alternates success/failure on every probe: never strings together
    /// more than one success in a row.
    struct FlakyHealth {
        calls: std::sync::atomic::AtomicU32,
    }
    impl HealthChecker for FlakyHealth {
        fn check_health(&self) -> Result<(), crate::process::HealthCheckError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n % 2 == 0 {
                Ok(())
            } else {
                Err(crate::process::HealthCheckError::UnhealthyStatusCode(503))
            }
        }
    }

    fn strategy_config(dir: &std::path::Path) -> ReloadStrategyConfig {
        ReloadStrategyConfig {
            command: "sleep".into(),
            args_for_config_path: |_path| vec!["5".into()],
            config_dir: dir.to_path_buf(),
            health_check_timeout: Duration::from_millis(500),
            health_check_poll_interval: Duration::from_millis(20),
            health_gate_successes: 3,
            drain_period: Duration::ZERO,
        }
    }

    fn policy() -> RestartPolicy {
        RestartPolicy::new(BackoffStrategy::Fixed, Duration::from_millis(50), 3)
    }

    #[test]
    fn first_apply_cuts_over_to_blue() {
        let dir = tempfile::tempdir().unwrap();
        let mut reload = BlueGreenReload::new(strategy_config(dir.path())).unwrap();
        let outcome = reload.apply(&user_config(), policy(), &AlwaysHealthy).unwrap();
        assert_eq!(outcome, ReloadOutcome::CutOver { slot: Slot::Blue });
        assert_eq!(reload.active_slot(), Some(Slot::Blue));
    }

    #[test]
    fn identical_config_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut reload = BlueGreenReload::new(strategy_config(dir.path())).unwrap();
        reload.apply(&user_config(), policy(), &AlwaysHealthy).unwrap();
        let second = reload.apply(&user_config(), policy(), &AlwaysHealthy).unwrap();
        assert_eq!(second, ReloadOutcome::Unchanged);
    }

    #[test]
    fn unhealthy_standby_does_not_cut_over() {
        let dir = tempfile::tempdir().unwrap();
        let mut reload = BlueGreenReload::new(strategy_config(dir.path())).unwrap();
        let result = reload.apply(&user_config(), policy(), &NeverHealthy);
        assert!(matches!(result, Err(ReloadError::HealthCheckTimeout)));
        assert_eq!(reload.active_slot(), None);
    }

    #[test]
    fn second_distinct_config_cuts_over_to_the_other_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut reload = BlueGreenReload::new(strategy_config(dir.path())).unwrap();
        reload.apply(&user_config(), policy(), &AlwaysHealthy).unwrap();

        let mut changed = user_config();
        changed.service_name = "other-svc".into();
        let outcome = reload.apply(&changed, policy(), &AlwaysHealthy).unwrap();
        assert_eq!(outcome, ReloadOutcome::CutOver { slot: Slot::Green });
    }

    #[test]
    fn a_lone_healthy_probe_does_not_satisfy_the_consecutive_success_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = strategy_config(dir.path());
        config.health_check_timeout = Duration::from_millis(200);
        config.health_check_poll_interval = Duration::from_millis(10);
        let mut reload = BlueGreenReload::new(config).unwrap();
        let checker = FlakyHealth {
            calls: std::sync::atomic::AtomicU32::new(0),
        };
        let result = reload.apply(&user_config(), policy(), &checker);
        assert!(matches!(result, Err(ReloadError::HealthCheckTimeout)));
        assert_eq!(reload.active_slot(), None);
    }

    #[test]
    fn cutover_waits_for_the_configured_drain_period_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = strategy_config(dir.path());
        config.drain_period = Duration::from_millis(100);
        let mut reload = BlueGreenReload::new(config).unwrap();
        reload.apply(&user_config(), policy(), &AlwaysHealthy).unwrap();

        let mut changed = user_config();
        changed.service_name = "other-svc".into();
        let start = Instant::now();
        let outcome = reload.apply(&changed, policy(), &AlwaysHealthy).unwrap();
        assert_eq!(outcome, ReloadOutcome::CutOver { slot: Slot::Green });
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
