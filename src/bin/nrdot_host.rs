use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use nrdot_host::api::{self, ServerConfig};
use nrdot_host::cli::{Cli, Command};
use nrdot_host::config::validator::validate;
use nrdot_host::config::load_raw_config;
use nrdot_host::process::{BackoffStrategy, RestartPolicy};
use nrdot_host::reload::Slot;
use nrdot_host::supervisor::{ApplyAndReloadError, NotStartedSupervisor, SupervisorConfig};
use nrdot_host::{context::Context, logging};

/// Process exit codes, per the agent's documented external contract: 0 =
/// clean stop; 2 = bad CLI args; 3 = fatal startup (e.g. config file
/// unreadable); 4 = unrecoverable supervisor state.
const EXIT_BAD_ARGS: u8 = 2;
const EXIT_FATAL_STARTUP: u8 = 3;
const EXIT_UNRECOVERABLE: u8 = 4;

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Some(Command::ValidateConfig { path }) => validate_config_command(&path),
        None => run_agent(cli),
    }
}

fn validate_config_command(path: &std::path::Path) -> ExitCode {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("could not read '{}': {err}", path.display());
            return ExitCode::from(EXIT_FATAL_STARTUP);
        }
    };

    match validate(&raw) {
        Ok(_) => {
            println!("'{}' is valid", path.display());
            ExitCode::SUCCESS
        }
        Err(errors) => {
            for err in errors {
                eprintln!("{}: {} ({:?})", err.path, err.message, err.code);
            }
            ExitCode::from(EXIT_FATAL_STARTUP)
        }
    }
}

fn run_agent(cli: Cli) -> ExitCode {
    let (api_host, api_port) = match cli.api_bind_host_port() {
        Ok(host_port) => host_port,
        Err(err) => {
            error!(error = %err, "bad command-line configuration");
            return ExitCode::from(EXIT_BAD_ARGS);
        }
    };

    let initial_config = match load_raw_config(&cli.config_path, cli.license_key.as_deref()) {
        Ok(raw) => raw,
        Err(err) => {
            error!(error = %err, "failed to read initial configuration");
            return ExitCode::from(EXIT_FATAL_STARTUP);
        }
    };

    let collector_bin = cli.collector_bin.to_string_lossy().into_owned();

    let supervisor_config = SupervisorConfig {
        root_dir: cli.state_dir.clone(),
        collector_command: collector_bin,
        args_for_config_path: |path| vec!["--config".to_string(), path.display().to_string()],
        health_url_for_slot: |slot| match slot {
            Slot::Blue => "http://127.0.0.1:13133".to_string(),
            Slot::Green => "http://127.0.0.1:13134".to_string(),
        },
        restart_policy_factory: Box::new(|| RestartPolicy::new(BackoffStrategy::Exponential, Duration::from_secs(1), 0)),
        health_check_timeout: Duration::from_secs(30),
        health_check_poll_interval: Duration::from_millis(500),
        health_gate_successes: 3,
        drain_period: Duration::from_secs(15),
        status_poll_interval: Duration::from_secs(10),
        crash_loop_window: Duration::from_secs(5 * 60),
        crash_loop_threshold: 5,
    };

    let supervisor = match NotStartedSupervisor::new(supervisor_config).start() {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!(error = %err, "failed to start supervisor");
            return ExitCode::from(EXIT_FATAL_STARTUP);
        }
    };

    match supervisor.apply_and_reload(initial_config) {
        Ok(Ok(version_id)) => info!(version_id, "activated initial configuration"),
        Ok(Err(ApplyAndReloadError::Validation(errors))) => {
            for err in &errors {
                error!(path = %err.path, message = %err.message, "initial configuration failed validation");
            }
            let _ = supervisor.stop();
            return ExitCode::from(EXIT_FATAL_STARTUP);
        }
        Ok(Err(ApplyAndReloadError::ReloadFailed(reason))) => {
            warn!(reason = %reason, "initial configuration did not reload cleanly; continuing in a degraded state");
        }
        Err(err) => {
            error!(error = %err, "supervisor actor unavailable during startup");
            return ExitCode::from(EXIT_UNRECOVERABLE);
        }
    }

    let api_server = if cli.no_api {
        None
    } else {
        let server_config = ServerConfig {
            enabled: true,
            host: api_host,
            port: api_port,
            workers: api::config::DEFAULT_WORKERS,
        };
        let auth = cli.api_auth_config();
        if auth.is_open() {
            tracing::warn!("no NRDOT_API_TOKEN_* configured; the control API is accepting unauthenticated requests");
        }
        match api::run(server_config, api::SupervisorClient::new(supervisor.client()), auth) {
            Ok(server) => Some(server),
            Err(err) => {
                error!(error = %err, "failed to start control API");
                let _ = supervisor.stop();
                return ExitCode::from(EXIT_FATAL_STARTUP);
            }
        }
    };

    let shutdown: Context<bool> = Context::new();
    let ctrlc_shutdown = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        let _ = ctrlc_shutdown.cancel_all(true);
    }) {
        error!(error = %err, "failed to install signal handler");
    }

    let _ = shutdown.wait_condvar();

    info!("shutting down");
    if let Some(server) = api_server {
        server.stop();
    }
    if let Err(err) = supervisor.stop() {
        error!(error = ?err, "error stopping supervisor");
        return ExitCode::from(EXIT_UNRECOVERABLE);
    }

    ExitCode::SUCCESS
}
