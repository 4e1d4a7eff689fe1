//! An immutable configuration version record.
//!
//! Versions are never mutated in place; a transition (activate, fail,
//! supersede) produces a new in-memory [`ConfigVersion`] with a new status
//! and is re-persisted under the same id. Monotonic ids plus "one version is
//! `Active` at a time" give the Config Engine a total order to roll back
//! along.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::schema::UserConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigVersionStatus {
    /// Validated and persisted, but not yet the active version.
    Pending,
    /// Currently driving the running collector.
    Active,
    /// Failed validation, generation, or collector startup; never active.
    Failed,
    /// Was active once, displaced by a newer version.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigVersion {
    pub id: u64,
    pub status: ConfigVersionStatus,
    pub raw: Vec<u8>,
    pub config: UserConfig,
    pub created_at: SystemTime,
    /// Set when `status` is `Failed`: the reason generation or startup
    /// rejected this version.
    pub message: Option<String>,
}

impl ConfigVersion {
    pub fn created_at_unix_ms(&self) -> u64 {
        self.created_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}
