//! Sends a collector process through a graceful-then-forceful shutdown.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TerminatorError {
    #[error("failed to signal process {pid}: {source}")]
    Signal { pid: u32, source: String },
}

pub struct ProcessTerminator {
    pid: u32,
}

impl ProcessTerminator {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// Sends SIGTERM, waits up to `grace_period` for the process to exit
    /// (checked by the caller via `waitpid`/`try_wait`), then SIGKILLs.
    /// Only `ProcessTerminator` knows how to reach into the OS for this; it
    /// does not itself wait, since reaping a child is the caller's
    /// `std::process::Child::try_wait` responsibility.
    #[cfg(target_family = "unix")]
    pub fn terminate(&self) -> Result<(), TerminatorError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM).map_err(|err| TerminatorError::Signal {
            pid: self.pid,
            source: err.to_string(),
        })
    }

    #[cfg(target_family = "unix")]
    pub fn kill(&self) -> Result<(), TerminatorError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(self.pid as i32), Signal::SIGKILL).map_err(|err| TerminatorError::Signal {
            pid: self.pid,
            source: err.to_string(),
        })
    }

    #[cfg(target_family = "windows")]
    pub fn terminate(&self) -> Result<(), TerminatorError> {
        unimplemented!("windows process termination is not supported")
    }

    #[cfg(target_family = "windows")]
    pub fn kill(&self) -> Result<(), TerminatorError> {
        unimplemented!("windows process termination is not supported")
    }
}

/// How long to wait after SIGTERM before escalating to SIGKILL.
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

#[cfg(all(test, target_family = "unix"))]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn terminate_signals_a_running_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sleep");

        let terminator = ProcessTerminator::new(child.id());
        terminator.terminate().unwrap();

        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn terminate_on_dead_pid_errors() {
        // pid 1 exists but belongs to init; use a pid unlikely to exist
        // instead so the call fails predictably with ESRCH.
        let terminator = ProcessTerminator::new(u32::MAX - 1);
        assert!(terminator.terminate().is_err());
    }
}
