//! Typed representation of a validated user configuration document.
//!
//! Validation never produces this type directly from `serde`'s own
//! `Deserialize` derive: we need every violation in one pass (unknown
//! fields, bad durations, bad license, out-of-range limits) rather than
//! whatever `serde_yaml` happens to choke on first, so [`super::validator`]
//! walks a generic [`serde_yaml::Value`] by hand and only builds this struct
//! once every check has passed.

use std::collections::BTreeMap;
use std::time::Duration;

/// A validated, fully-typed configuration document. Immutable once built:
/// the only way to get one is through [`super::validator::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct UserConfig {
    pub service_name: String,
    pub environment: String,
    pub license_key: LicenseKey,
    pub metrics_enabled: bool,
    pub metrics_interval: Duration,
    pub redact_secrets: bool,
    pub enrich_host_metadata: bool,
    pub cardinality_global_limit: u64,
    pub per_metric_limits: BTreeMap<String, u64>,
    pub labels: BTreeMap<String, String>,
}

/// A license key that never renders its value in `Debug`/logs, mirroring
/// the teacher's secret-redaction posture for anything carried in a
/// sub-agent's reported status.
#[derive(Clone, PartialEq, Eq)]
pub struct LicenseKey(String);

impl LicenseKey {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for LicenseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LicenseKey(***redacted***)")
    }
}

pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_METRICS_ENABLED: bool = true;
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REDACT_SECRETS: bool = true;
pub const DEFAULT_ENRICH_HOST_METADATA: bool = true;
pub const DEFAULT_CARDINALITY_GLOBAL_LIMIT: u64 = 100_000;
pub const MIN_LICENSE_KEY_LEN: usize = 32;
pub const MIN_METRICS_INTERVAL: Duration = Duration::from_secs(1);
