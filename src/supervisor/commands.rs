//! The single-writer command queue: every mutation to supervisor state
//! flows through one of these messages, handled one at a time by the actor
//! thread in `actor.rs`. Callers never touch `ConfigEngine` or
//! `BlueGreenReload` directly.

use crossbeam::channel::Sender;

use crate::config::{ConfigVersion, ValidationError};

use super::state::SupervisorStatus;

pub enum Command {
    SubmitConfig {
        raw: Vec<u8>,
        reply: Sender<Result<u64, Vec<ValidationError>>>,
    },
    /// Validates, submits, and immediately activates `raw` through a
    /// blue-green reload, in one round trip. Used by `POST /config`, which
    /// per the Control API contract must run validate+apply+reload as a
    /// single step rather than leaving the submitted version `Pending`.
    ApplyAndReload {
        raw: Vec<u8>,
        reply: Sender<Result<u64, ApplyAndReloadError>>,
    },
    Activate {
        id: u64,
        reply: Sender<Result<(), String>>,
    },
    Rollback {
        reply: Sender<Result<u64, String>>,
    },
    Status {
        reply: Sender<SupervisorStatus>,
    },
    ListVersions {
        limit: Option<usize>,
        reply: Sender<Vec<ConfigVersion>>,
    },
    GetVersion {
        id: u64,
        reply: Sender<Option<ConfigVersion>>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyAndReloadError {
    #[error("configuration failed validation")]
    Validation(Vec<ValidationError>),
    #[error("reload failed: {0}")]
    ReloadFailed(String),
}
