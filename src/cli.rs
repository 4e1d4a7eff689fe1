//! Command-line surface for the agent binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "nrdot-host", about = "Unified telemetry agent", version)]
pub struct Cli {
    /// Path to the user configuration file submitted as the initial config
    /// version at startup.
    #[arg(long, env = "NRDOT_CONFIG")]
    pub config_path: PathBuf,

    /// Overrides the config file's `license_key` field when set.
    #[arg(long, env = "NEW_RELIC_LICENSE_KEY")]
    pub license_key: Option<String>,

    /// Directory holding persisted configuration versions and the
    /// generated collector configs (`<dir>/config`, `<dir>/collector`).
    #[arg(long, env = "NRDOT_STATE_DIR", default_value = "/var/lib/nrdot")]
    pub state_dir: PathBuf,

    /// Path to the collector binary the supervisor spawns.
    #[arg(long, env = "NRDOT_COLLECTOR_BIN", default_value = "otelcol")]
    pub collector_bin: PathBuf,

    /// Disables the local Control API entirely.
    #[arg(long, env = "NRDOT_API_DISABLED")]
    pub no_api: bool,

    /// Control API bind address, `<host>:<port>`.
    #[arg(long, env = "NRDOT_API_BIND", default_value = "127.0.0.1:8080")]
    pub api_bind: String,

    /// Bearer token that authenticates Control API requests as `admin`
    /// (full read/write, including rollback). Leaving every token flag
    /// unset leaves the Control API open to any caller.
    #[arg(long, env = "NRDOT_API_TOKEN_ADMIN")]
    pub api_token_admin: Option<String>,

    /// Bearer token that authenticates Control API requests as `operator`
    /// (submit/activate/reload, no rollback).
    #[arg(long, env = "NRDOT_API_TOKEN_OPERATOR")]
    pub api_token_operator: Option<String>,

    /// Bearer token that authenticates Control API requests as `viewer`
    /// (status/metrics/version history only).
    #[arg(long, env = "NRDOT_API_TOKEN_VIEWER")]
    pub api_token_viewer: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("NRDOT_API_BIND '{0}' is not a valid <host>:<port> address")]
    BadApiBind(String),
}

impl Cli {
    /// Builds the Control API's [`AuthConfig`](crate::api::AuthConfig) from
    /// whichever `--api-token-*` flags were supplied. An `Cli` with none of
    /// them set produces an empty, "open" config.
    pub fn api_auth_config(&self) -> crate::api::AuthConfig {
        let mut auth = crate::api::AuthConfig::new();
        if let Some(token) = &self.api_token_admin {
            auth = auth.with_token(token.clone(), crate::api::Role::Admin);
        }
        if let Some(token) = &self.api_token_operator {
            auth = auth.with_token(token.clone(), crate::api::Role::Operator);
        }
        if let Some(token) = &self.api_token_viewer {
            auth = auth.with_token(token.clone(), crate::api::Role::Viewer);
        }
        auth
    }

    /// Splits `api_bind` into the host and port `ServerConfig` wants.
    pub fn api_bind_host_port(&self) -> Result<(String, u16), CliError> {
        let (host, port) = self
            .api_bind
            .rsplit_once(':')
            .ok_or_else(|| CliError::BadApiBind(self.api_bind.clone()))?;
        let port: u16 = port.parse().map_err(|_| CliError::BadApiBind(self.api_bind.clone()))?;
        Ok((host.to_string(), port))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validates a configuration file without starting the supervisor or
    /// the collector. Exits non-zero if validation fails, printing every
    /// violation found.
    ValidateConfig {
        /// Path to the YAML configuration file to validate.
        path: PathBuf,
    },
}
