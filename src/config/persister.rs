//! Disk layout for configuration versions:
//!
//! ```text
//! <root>/versions/<id>.json   one record per version, write-temp-then-rename
//! <root>/current              plain-text id of the active version
//! ```
//!
//! Every write goes through a sibling `.tmp` file and `fs::rename`, so a
//! crash mid-write never leaves a half-written record where a reader expects
//! a complete one: `rename` within the same directory is atomic on every
//! platform this agent targets.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::version::{ConfigVersion, ConfigVersionStatus};

#[derive(Debug, Serialize, Deserialize)]
struct VersionRecord {
    id: u64,
    status: ConfigVersionStatus,
    raw: Vec<u8>,
    created_at_unix_ms: u64,
    message: Option<String>,
}

pub struct Persister {
    root: PathBuf,
}

impl Persister {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("versions"))?;
        Ok(Self { root })
    }

    fn version_path(&self, id: u64) -> PathBuf {
        self.root.join("versions").join(format!("{id}.json"))
    }

    fn current_path(&self) -> PathBuf {
        self.root.join("current")
    }

    pub fn write_version(&self, version: &ConfigVersion) -> io::Result<()> {
        let record = VersionRecord {
            id: version.id,
            status: version.status,
            raw: version.raw.clone(),
            created_at_unix_ms: version.created_at_unix_ms(),
            message: version.message.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        atomic_write(&self.version_path(version.id), &bytes)
    }

    /// Returns `(id, raw, status, created_at_unix_ms, message)` for every
    /// version on disk, unordered; callers sort by id.
    pub fn read_all_raw(&self) -> io::Result<Vec<(u64, Vec<u8>, ConfigVersionStatus, u64, Option<String>)>> {
        let versions_dir = self.root.join("versions");
        let mut out = Vec::new();
        for entry in fs::read_dir(&versions_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            let record: VersionRecord = serde_json::from_slice(&bytes)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            out.push((record.id, record.raw, record.status, record.created_at_unix_ms, record.message));
        }
        Ok(out)
    }

    pub fn write_current(&self, id: u64) -> io::Result<()> {
        atomic_write(&self.current_path(), id.to_string().as_bytes())
    }

    pub fn read_current(&self) -> io::Result<Option<u64>> {
        match fs::read_to_string(self.current_path()) {
            Ok(contents) => Ok(contents.trim().parse().ok()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn remove_version(&self, id: u64) -> io::Result<()> {
        match fs::remove_file(self.version_path(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LicenseKey;
    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime};

    fn sample_version(id: u64) -> ConfigVersion {
        ConfigVersion {
            id,
            status: ConfigVersionStatus::Pending,
            raw: b"service:\n  name: svc\n".to_vec(),
            config: crate::config::schema::UserConfig {
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
            },
            created_at: SystemTime::now(),
            message: None,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(dir.path()).unwrap();
        persister.write_version(&sample_version(1)).unwrap();
        persister.write_current(1).unwrap();

        let all = persister.read_all_raw().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, 1);
        assert_eq!(persister.read_current().unwrap(), Some(1));
    }

    #[test]
    fn missing_current_pointer_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(dir.path()).unwrap();
        assert_eq!(persister.read_current().unwrap(), None);
    }

    #[test]
    fn rewriting_a_version_is_atomic_and_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(dir.path()).unwrap();
        persister.write_version(&sample_version(1)).unwrap();
        let mut updated = sample_version(1);
        updated.status = ConfigVersionStatus::Active;
        persister.write_version(&updated).unwrap();

        let all = persister.read_all_raw().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].2, ConfigVersionStatus::Active);
    }
}
