//! The Unified Supervisor: a single-writer actor that owns the Config
//! Engine and the Blue-Green Reload Strategy, and is the only thing in the
//! process allowed to mutate either.

pub mod actor;
pub mod commands;
pub mod state;

pub use actor::{NotStartedSupervisor, SupervisorConfig, SupervisorHandle, SupervisorHandleError};
pub use commands::{ApplyAndReloadError, Command};
pub use state::{SupervisorState, SupervisorStatus};
