//! The Config Engine: validates submissions, keeps an ordered history of
//! versions on disk, and tracks which one is active.
//!
//! Mirrors the teacher's "load everything at startup, mutate in memory,
//! persist on every transition" posture (see `sub_agent/sub_agent.rs`'s
//! remote-config handling): [`ConfigEngine`] keeps the full version list in
//! memory and the [`Persister`] is only ever a write-behind / startup-load
//! concern, never consulted for reads on the hot path.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::error::{ConfigEngineError, ValidationError};
use super::persister::Persister;
use super::validator::validate;
use super::version::{ConfigVersion, ConfigVersionStatus};
use crate::config::schema::UserConfig;

/// Caps how many non-active versions are kept once a new one is activated.
/// Bounds disk growth on a long-running host while still leaving a
/// meaningful rollback chain.
const MAX_RETAINED_VERSIONS: usize = 16;

pub struct ConfigEngine {
    persister: Persister,
    versions: BTreeMap<u64, ConfigVersion>,
    next_id: u64,
    current: Option<u64>,
}

impl ConfigEngine {
    /// Loads every version record from `root`, re-validating each one's raw
    /// bytes to reconstruct its typed `UserConfig`. A version that fails to
    /// re-validate (the on-disk record predates a validator change, say) is
    /// logged and skipped rather than treated as a fatal startup error.
    pub fn load(root: impl Into<std::path::PathBuf>) -> Result<Self, ConfigEngineError> {
        let persister = Persister::new(root)?;
        let mut versions = BTreeMap::new();
        let mut next_id = 1;

        for (id, raw, status, _created_at_unix_ms, message) in persister.read_all_raw()? {
            match validate(&raw) {
                Ok(config) => {
                    next_id = next_id.max(id + 1);
                    versions.insert(
                        id,
                        ConfigVersion {
                            id,
                            status,
                            raw,
                            config,
                            created_at: std::time::SystemTime::now(),
                            message,
                        },
                    );
                }
                Err(errors) => {
                    warn!(version_id = id, errors = ?errors, "dropping on-disk config version that no longer validates");
                }
            }
        }

        let current = persister.read_current()?;

        Ok(Self {
            persister,
            versions,
            next_id,
            current,
        })
    }

    /// Validates `raw` and persists it as a new `Pending` version. Does not
    /// activate it: activation is a separate, explicit step so a caller can
    /// generate and health-check a collector config before committing to
    /// it.
    pub fn submit(&mut self, raw: Vec<u8>) -> Result<u64, Vec<ValidationError>> {
        let config = validate(&raw)?;
        let id = self.next_id;
        self.next_id += 1;

        let version = ConfigVersion {
            id,
            status: ConfigVersionStatus::Pending,
            raw,
            config,
            created_at: std::time::SystemTime::now(),
            message: None,
        };

        if let Err(err) = self.persister.write_version(&version) {
            warn!(version_id = id, error = %err, "failed to persist new config version");
        }

        info!(version_id = id, "submitted new config version");
        self.versions.insert(id, version);
        Ok(id)
    }

    /// Marks `id` active, superseding whatever was active before. Does not
    /// check that `id` is newer than the current version: an explicit
    /// rollback re-activates an older one by design.
    pub fn activate(&mut self, id: u64) -> Result<(), ConfigEngineError> {
        if !self.versions.contains_key(&id) {
            return Err(ConfigEngineError::VersionNotFound(id));
        }

        if let Some(previous) = self.current {
            if previous != id {
                self.set_status(previous, ConfigVersionStatus::Superseded)?;
            }
        }

        self.set_status(id, ConfigVersionStatus::Active)?;
        self.current = Some(id);
        self.persister.write_current(id)?;
        info!(version_id = id, "activated config version");
        self.prune_retained_versions();
        Ok(())
    }

    /// Drops the oldest non-active versions once the history grows past
    /// [`MAX_RETAINED_VERSIONS`]. The currently active version is never
    /// pruned, no matter how old.
    fn prune_retained_versions(&mut self) {
        let mut prunable: Vec<u64> = self
            .versions
            .keys()
            .copied()
            .filter(|id| Some(*id) != self.current)
            .collect();
        prunable.sort_unstable();

        while prunable.len() > MAX_RETAINED_VERSIONS {
            let id = prunable.remove(0);
            if let Err(err) = self.persister.remove_version(id) {
                warn!(version_id = id, error = %err, "failed to remove pruned config version from disk");
                continue;
            }
            self.versions.remove(&id);
        }
    }

    pub fn fail(&mut self, id: u64, reason: impl Into<String>) -> Result<(), ConfigEngineError> {
        let reason = reason.into();
        warn!(version_id = id, reason = %reason, "config version failed");
        let version = self.versions.get_mut(&id).ok_or(ConfigEngineError::VersionNotFound(id))?;
        version.status = ConfigVersionStatus::Failed;
        version.message = Some(reason);
        self.persister.write_version(version)?;
        Ok(())
    }

    /// Activates the newest `Superseded` version older than the current
    /// one, i.e. "undo the last activation".
    pub fn rollback(&mut self) -> Result<u64, ConfigEngineError> {
        let current = self.current.ok_or(ConfigEngineError::NoRollbackTarget)?;
        let target = self
            .versions
            .values()
            .filter(|v| v.id < current && v.status == ConfigVersionStatus::Superseded)
            .max_by_key(|v| v.id)
            .map(|v| v.id)
            .ok_or(ConfigEngineError::NoRollbackTarget)?;

        self.activate(target)?;
        Ok(target)
    }

    pub fn current(&self) -> Option<&ConfigVersion> {
        self.current.and_then(|id| self.versions.get(&id))
    }

    pub fn current_config(&self) -> Option<&UserConfig> {
        self.current().map(|v| &v.config)
    }

    pub fn get(&self, id: u64) -> Option<&ConfigVersion> {
        self.versions.get(&id)
    }

    /// Versions newest-first, optionally capped to the most recent `limit`.
    pub fn list(&self, limit: Option<usize>) -> Vec<&ConfigVersion> {
        let mut versions: Vec<&ConfigVersion> = self.versions.values().collect();
        versions.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        match limit {
            Some(limit) => versions.into_iter().take(limit).collect(),
            None => versions,
        }
    }

    fn set_status(&mut self, id: u64, status: ConfigVersionStatus) -> Result<(), ConfigEngineError> {
        let version = self.versions.get_mut(&id).ok_or(ConfigEngineError::VersionNotFound(id))?;
        version.status = status;
        self.persister.write_version(version)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML_A: &[u8] =
        b"service:\n  name: svc-a\nlicense_key: 0123456789abcdef0123456789abcdef\n";
    const VALID_YAML_B: &[u8] =
        b"service:\n  name: svc-b\nlicense_key: fedcba9876543210fedcba9876543210\n";

    #[test]
    fn submit_then_activate_sets_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();
        let id = engine.submit(VALID_YAML_A.to_vec()).unwrap();
        engine.activate(id).unwrap();
        assert_eq!(engine.current().unwrap().id, id);
        assert_eq!(engine.current().unwrap().status, ConfigVersionStatus::Active);
    }

    #[test]
    fn activating_a_new_version_supersedes_the_old_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();
        let first = engine.submit(VALID_YAML_A.to_vec()).unwrap();
        engine.activate(first).unwrap();
        let second = engine.submit(VALID_YAML_B.to_vec()).unwrap();
        engine.activate(second).unwrap();

        assert_eq!(engine.get(first).unwrap().status, ConfigVersionStatus::Superseded);
        assert_eq!(engine.get(second).unwrap().status, ConfigVersionStatus::Active);
    }

    #[test]
    fn rollback_reactivates_the_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();
        let first = engine.submit(VALID_YAML_A.to_vec()).unwrap();
        engine.activate(first).unwrap();
        let second = engine.submit(VALID_YAML_B.to_vec()).unwrap();
        engine.activate(second).unwrap();

        let rolled_back_to = engine.rollback().unwrap();
        assert_eq!(rolled_back_to, first);
        assert_eq!(engine.current().unwrap().id, first);
        assert_eq!(engine.get(second).unwrap().status, ConfigVersionStatus::Superseded);
    }

    #[test]
    fn rollback_with_no_prior_version_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();
        let first = engine.submit(VALID_YAML_A.to_vec()).unwrap();
        engine.activate(first).unwrap();
        assert!(matches!(engine.rollback(), Err(ConfigEngineError::NoRollbackTarget)));
    }

    #[test]
    fn submit_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();
        let errors = engine.submit(b"service:\n  name: \"\"\n".to_vec()).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn reloading_from_disk_recovers_versions_and_current_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut engine = ConfigEngine::load(dir.path()).unwrap();
            let id = engine.submit(VALID_YAML_A.to_vec()).unwrap();
            engine.activate(id).unwrap();
            id
        };

        let reloaded = ConfigEngine::load(dir.path()).unwrap();
        assert_eq!(reloaded.current().unwrap().id, id);
    }

    #[test]
    fn version_history_is_pruned_past_the_retention_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();

        let mut ids = Vec::new();
        for i in 0..(MAX_RETAINED_VERSIONS + 5) {
            let raw = format!(
                "service:\n  name: svc-{i}\nlicense_key: 0123456789abcdef0123456789abcdef\n"
            )
            .into_bytes();
            let id = engine.submit(raw).unwrap();
            engine.activate(id).unwrap();
            ids.push(id);
        }

        assert_eq!(engine.list(None).len(), MAX_RETAINED_VERSIONS + 1);
        let earliest_pruned = ids[0];
        assert!(engine.get(earliest_pruned).is_none());
        assert_eq!(engine.current().unwrap().id, *ids.last().unwrap());
    }

    #[test]
    fn list_with_a_limit_returns_the_most_recent_versions_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();
        let first = engine.submit(VALID_YAML_A.to_vec()).unwrap();
        engine.activate(first).unwrap();
        let second = engine.submit(VALID_YAML_B.to_vec()).unwrap();
        engine.activate(second).unwrap();

        let limited = engine.list(Some(1));
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, second);

        assert_eq!(engine.list(None).len(), 2);
    }

    #[test]
    fn fail_records_message_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = ConfigEngine::load(dir.path()).unwrap();
        let id = engine.submit(VALID_YAML_A.to_vec()).unwrap();
        engine.fail(id, "collector refused to start").unwrap();
        let version = engine.get(id).unwrap();
        assert_eq!(version.status, ConfigVersionStatus::Failed);
        assert_eq!(version.message.as_deref(), Some("collector refused to start"));
    }
}
