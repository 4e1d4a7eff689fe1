//! A cheaply cloneable front for talking to the supervisor actor over its
//! command channel. The Control API never touches `ConfigEngine` or
//! `BlueGreenReload` directly; it only ever holds one of these.

use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::config::{ConfigVersion, ValidationError};
use crate::supervisor::commands::{ApplyAndReloadError, Command};
use crate::supervisor::state::SupervisorStatus;

/// How long a command waits for the supervisor actor to reply before the
/// caller gets back a `ClientError::Timeout` (surfaced as a 504 to API
/// clients). The command itself is not cancelled; it keeps running on the
/// actor's thread.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SupervisorClient {
    commands: Sender<Command>,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("supervisor actor is no longer running")]
    ActorGone,
    #[error("supervisor did not reply within the command timeout")]
    Timeout,
}

impl SupervisorClient {
    pub fn new(commands: Sender<Command>) -> Self {
        Self::with_timeout(commands, DEFAULT_COMMAND_TIMEOUT)
    }

    pub fn with_timeout(commands: Sender<Command>, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    fn recv<T>(&self, rx: Receiver<T>) -> Result<T, ClientError> {
        rx.recv_timeout(self.timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ClientError::Timeout,
            RecvTimeoutError::Disconnected => ClientError::ActorGone,
        })
    }

    pub fn submit_config(&self, raw: Vec<u8>) -> Result<Result<u64, Vec<ValidationError>>, ClientError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::SubmitConfig { raw, reply })
            .map_err(|_| ClientError::ActorGone)?;
        self.recv(rx)
    }

    pub fn apply_and_reload(&self, raw: Vec<u8>) -> Result<Result<u64, ApplyAndReloadError>, ClientError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::ApplyAndReload { raw, reply })
            .map_err(|_| ClientError::ActorGone)?;
        self.recv(rx)
    }

    pub fn activate(&self, id: u64) -> Result<Result<(), String>, ClientError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::Activate { id, reply })
            .map_err(|_| ClientError::ActorGone)?;
        self.recv(rx)
    }

    pub fn rollback(&self) -> Result<Result<u64, String>, ClientError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::Rollback { reply })
            .map_err(|_| ClientError::ActorGone)?;
        self.recv(rx)
    }

    pub fn status(&self) -> Result<SupervisorStatus, ClientError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::Status { reply })
            .map_err(|_| ClientError::ActorGone)?;
        self.recv(rx)
    }

    pub fn list_versions(&self, limit: Option<usize>) -> Result<Vec<ConfigVersion>, ClientError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::ListVersions { limit, reply })
            .map_err(|_| ClientError::ActorGone)?;
        self.recv(rx)
    }

    pub fn get_version(&self, id: u64) -> Result<Option<ConfigVersion>, ClientError> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::GetVersion { id, reply })
            .map_err(|_| ClientError::ActorGone)?;
        self.recv(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::commands::Command;
    use crossbeam::channel::unbounded;

    #[test]
    fn a_command_that_never_gets_a_reply_times_out_instead_of_hanging() {
        let (tx, rx) = unbounded();
        let client = SupervisorClient::with_timeout(tx, Duration::from_millis(50));

        // Keep the sender side of the channel alive, but never service the
        // command, so the reply channel never fires.
        let _keep_alive = rx;
        let result = client.status();
        assert!(matches!(result, Err(ClientError::Timeout)));
    }

    #[test]
    fn a_dropped_actor_reports_actor_gone_not_a_timeout() {
        let (tx, rx) = unbounded::<Command>();
        let client = SupervisorClient::with_timeout(tx, Duration::from_secs(5));
        drop(rx);
        assert!(matches!(client.status(), Err(ClientError::ActorGone)));
    }
}
