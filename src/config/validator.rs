//! Hand-rolled validation over a generic YAML document.
//!
//! We deliberately do not derive `Deserialize` for [`UserConfig`] and let
//! `serde_yaml` report the first error it trips over: operators editing a
//! multi-hundred-line config need every mistake back in one response, in
//! the order they appear in the document, not a fix-one-resubmit-repeat
//! loop. `validate` is pure: the same bytes always produce the same
//! `Vec<ValidationError>` in the same order.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_yaml::Value;

use super::error::{ValidationError, ValidationErrorCode};
use super::schema::{
    LicenseKey, UserConfig, DEFAULT_CARDINALITY_GLOBAL_LIMIT, DEFAULT_ENRICH_HOST_METADATA,
    DEFAULT_ENVIRONMENT, DEFAULT_METRICS_ENABLED, DEFAULT_METRICS_INTERVAL,
    DEFAULT_REDACT_SECRETS, MIN_LICENSE_KEY_LEN, MIN_METRICS_INTERVAL,
};

const TOP_LEVEL_KEYS: &[&str] = &["service", "license_key", "metrics", "processing", "labels"];
const SERVICE_KEYS: &[&str] = &["name", "environment"];
const METRICS_KEYS: &[&str] = &["enabled", "interval"];
const PROCESSING_KEYS: &[&str] = &["security", "enrich", "cardinality"];
const SECURITY_KEYS: &[&str] = &["redact_secrets"];
const ENRICH_KEYS: &[&str] = &["host_metadata"];
const CARDINALITY_KEYS: &[&str] = &["global_limit", "per_metric_limits"];

/// Validates raw config bytes, returning a fully-typed [`UserConfig`] on
/// success or the complete list of violations on failure.
pub fn validate(raw: &[u8]) -> Result<UserConfig, Vec<ValidationError>> {
    let document: Value = match serde_yaml::from_slice(raw) {
        Ok(value) => value,
        Err(err) => {
            return Err(vec![ValidationError::new(
                "",
                ValidationErrorCode::Malformed,
                format!("could not parse configuration document: {err}"),
            )])
        }
    };

    let mut errors = Vec::new();

    let root = match document.as_mapping() {
        Some(mapping) => mapping,
        None => {
            errors.push(ValidationError::new(
                "",
                ValidationErrorCode::InvalidType,
                "the configuration document must be a mapping at its root",
            ));
            return Err(errors);
        }
    };

    reject_unknown_keys(root, "", TOP_LEVEL_KEYS, &mut errors);

    let service_name = validate_service(root, &mut errors);
    let environment = root
        .get("service")
        .and_then(Value::as_mapping)
        .and_then(|m| m.get("environment"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    let license_key = validate_license_key(root, &mut errors);
    let (metrics_enabled, metrics_interval) = validate_metrics(root, &mut errors);
    let (redact_secrets, enrich_host_metadata, cardinality_global_limit, per_metric_limits) =
        validate_processing(root, &mut errors);
    let labels = validate_labels(root, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(UserConfig {
        service_name: service_name.expect("validated above: no errors means service_name is Some"),
        environment,
        license_key: license_key.expect("validated above: no errors means license_key is Some"),
        metrics_enabled,
        metrics_interval,
        redact_secrets,
        enrich_host_metadata,
        cardinality_global_limit,
        per_metric_limits,
        labels,
    })
}

fn reject_unknown_keys(
    mapping: &serde_yaml::Mapping,
    prefix: &str,
    known: &[&str],
    errors: &mut Vec<ValidationError>,
) {
    for (key, _) in mapping.iter() {
        let Some(key) = key.as_str() else {
            errors.push(ValidationError::new(
                prefix,
                ValidationErrorCode::InvalidType,
                "mapping keys must be strings",
            ));
            continue;
        };
        if !known.contains(&key) {
            let path = join_path(prefix, key);
            errors.push(ValidationError::new(
                path.clone(),
                ValidationErrorCode::UnknownField,
                format!("unknown field '{path}'"),
            ));
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn validate_service(root: &serde_yaml::Mapping, errors: &mut Vec<ValidationError>) -> Option<String> {
    let Some(service) = root.get("service").and_then(Value::as_mapping) else {
        errors.push(ValidationError::new(
            "service.name",
            ValidationErrorCode::MissingRequired,
            "'service.name' is required",
        ));
        return None;
    };

    reject_unknown_keys(service, "service", SERVICE_KEYS, errors);

    match service.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => Some(name.to_string()),
        Some(_) => {
            errors.push(ValidationError::new(
                "service.name",
                ValidationErrorCode::MissingRequired,
                "'service.name' must not be empty",
            ));
            None
        }
        None => {
            errors.push(ValidationError::new(
                "service.name",
                ValidationErrorCode::MissingRequired,
                "'service.name' is required",
            ));
            None
        }
    }
}

fn validate_license_key(root: &serde_yaml::Mapping, errors: &mut Vec<ValidationError>) -> Option<LicenseKey> {
    match root.get("license_key") {
        None => {
            errors.push(ValidationError::new(
                "license_key",
                ValidationErrorCode::MissingRequired,
                "'license_key' is required",
            ));
            None
        }
        Some(value) => match value.as_str() {
            None => {
                errors.push(ValidationError::new(
                    "license_key",
                    ValidationErrorCode::InvalidType,
                    "'license_key' must be a string",
                ));
                None
            }
            Some(key) if key.len() < MIN_LICENSE_KEY_LEN => {
                errors.push(ValidationError::new(
                    "license_key",
                    ValidationErrorCode::BadLicense,
                    format!("'license_key' must be at least {MIN_LICENSE_KEY_LEN} characters"),
                ));
                None
            }
            Some(key) => Some(LicenseKey::new(key.to_string())),
        },
    }
}

fn validate_metrics(root: &serde_yaml::Mapping, errors: &mut Vec<ValidationError>) -> (bool, Duration) {
    let Some(metrics) = root.get("metrics").and_then(Value::as_mapping) else {
        return (DEFAULT_METRICS_ENABLED, DEFAULT_METRICS_INTERVAL);
    };

    reject_unknown_keys(metrics, "metrics", METRICS_KEYS, errors);

    let enabled = match metrics.get("enabled") {
        None => DEFAULT_METRICS_ENABLED,
        Some(value) => match value.as_bool() {
            Some(b) => b,
            None => {
                errors.push(ValidationError::new(
                    "metrics.enabled",
                    ValidationErrorCode::InvalidType,
                    "'metrics.enabled' must be a boolean",
                ));
                DEFAULT_METRICS_ENABLED
            }
        },
    };

    let interval = match metrics.get("interval").and_then(Value::as_str) {
        None => DEFAULT_METRICS_INTERVAL,
        Some(raw) => match parse_duration(raw) {
            Some(d) if d >= MIN_METRICS_INTERVAL => d,
            Some(_) => {
                errors.push(ValidationError::new(
                    "metrics.interval",
                    ValidationErrorCode::OutOfRange,
                    format!("'metrics.interval' must be at least {MIN_METRICS_INTERVAL:?}"),
                ));
                DEFAULT_METRICS_INTERVAL
            }
            None => {
                errors.push(ValidationError::new(
                    "metrics.interval",
                    ValidationErrorCode::BadDuration,
                    format!("'{raw}' is not a valid duration (expected e.g. '30s', '5m', '1h')"),
                ));
                DEFAULT_METRICS_INTERVAL
            }
        },
    };

    (enabled, interval)
}

type ProcessingFields = (bool, bool, u64, BTreeMap<String, u64>);

fn validate_processing(root: &serde_yaml::Mapping, errors: &mut Vec<ValidationError>) -> ProcessingFields {
    let Some(processing) = root.get("processing").and_then(Value::as_mapping) else {
        return (
            DEFAULT_REDACT_SECRETS,
            DEFAULT_ENRICH_HOST_METADATA,
            DEFAULT_CARDINALITY_GLOBAL_LIMIT,
            BTreeMap::new(),
        );
    };

    reject_unknown_keys(processing, "processing", PROCESSING_KEYS, errors);

    let redact_secrets = match processing.get("security").and_then(Value::as_mapping) {
        None => DEFAULT_REDACT_SECRETS,
        Some(security) => {
            reject_unknown_keys(security, "processing.security", SECURITY_KEYS, errors);
            match security.get("redact_secrets").and_then(Value::as_bool) {
                Some(b) => b,
                None if security.get("redact_secrets").is_some() => {
                    errors.push(ValidationError::new(
                        "processing.security.redact_secrets",
                        ValidationErrorCode::InvalidType,
                        "'processing.security.redact_secrets' must be a boolean",
                    ));
                    DEFAULT_REDACT_SECRETS
                }
                None => DEFAULT_REDACT_SECRETS,
            }
        }
    };

    let enrich_host_metadata = match processing.get("enrich").and_then(Value::as_mapping) {
        None => DEFAULT_ENRICH_HOST_METADATA,
        Some(enrich) => {
            reject_unknown_keys(enrich, "processing.enrich", ENRICH_KEYS, errors);
            match enrich.get("host_metadata").and_then(Value::as_bool) {
                Some(b) => b,
                None if enrich.get("host_metadata").is_some() => {
                    errors.push(ValidationError::new(
                        "processing.enrich.host_metadata",
                        ValidationErrorCode::InvalidType,
                        "'processing.enrich.host_metadata' must be a boolean",
                    ));
                    DEFAULT_ENRICH_HOST_METADATA
                }
                None => DEFAULT_ENRICH_HOST_METADATA,
            }
        }
    };

    let (global_limit, per_metric_limits) = match processing.get("cardinality").and_then(Value::as_mapping) {
        None => (DEFAULT_CARDINALITY_GLOBAL_LIMIT, BTreeMap::new()),
        Some(cardinality) => {
            reject_unknown_keys(cardinality, "processing.cardinality", CARDINALITY_KEYS, errors);

            let global_limit = match cardinality.get("global_limit") {
                None => DEFAULT_CARDINALITY_GLOBAL_LIMIT,
                Some(value) => match value.as_u64() {
                    Some(0) | None => {
                        errors.push(ValidationError::new(
                            "processing.cardinality.global_limit",
                            if value.as_u64() == Some(0) {
                                ValidationErrorCode::OutOfRange
                            } else {
                                ValidationErrorCode::InvalidType
                            },
                            "'processing.cardinality.global_limit' must be a positive integer",
                        ));
                        DEFAULT_CARDINALITY_GLOBAL_LIMIT
                    }
                    Some(n) => n,
                },
            };

            let mut per_metric_limits = BTreeMap::new();
            if let Some(limits) = cardinality.get("per_metric_limits").and_then(Value::as_mapping) {
                for (key, value) in limits.iter() {
                    let Some(name) = key.as_str() else {
                        errors.push(ValidationError::new(
                            "processing.cardinality.per_metric_limits",
                            ValidationErrorCode::InvalidType,
                            "metric names must be strings",
                        ));
                        continue;
                    };
                    let path = format!("processing.cardinality.per_metric_limits.{name}");
                    match value.as_u64() {
                        Some(0) | None => errors.push(ValidationError::new(
                            path,
                            ValidationErrorCode::OutOfRange,
                            format!("per-metric limit for '{name}' must be a positive integer"),
                        )),
                        Some(n) => {
                            per_metric_limits.insert(name.to_string(), n);
                        }
                    }
                }
            }

            (global_limit, per_metric_limits)
        }
    };

    (redact_secrets, enrich_host_metadata, global_limit, per_metric_limits)
}

fn validate_labels(root: &serde_yaml::Mapping, errors: &mut Vec<ValidationError>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let Some(raw_labels) = root.get("labels").and_then(Value::as_mapping) else {
        return labels;
    };

    for (key, value) in raw_labels.iter() {
        let Some(key) = key.as_str() else {
            errors.push(ValidationError::new(
                "labels",
                ValidationErrorCode::InvalidType,
                "label keys must be strings",
            ));
            continue;
        };
        if !is_valid_label_key(key) {
            errors.push(ValidationError::new(
                format!("labels.{key}"),
                ValidationErrorCode::InvalidLabelKey,
                format!("'{key}' is not a valid label key (expected [a-z0-9._-]+)"),
            ));
            continue;
        }
        match value.as_str() {
            Some(v) => {
                labels.insert(key.to_string(), v.to_string());
            }
            None => errors.push(ValidationError::new(
                format!("labels.{key}"),
                ValidationErrorCode::InvalidType,
                "label values must be strings",
            )),
        }
    }

    labels
}

fn label_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9._-]+$").unwrap())
}

fn is_valid_label_key(key: &str) -> bool {
    label_key_regex().is_match(key)
}

fn duration_format_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+[smh]$").unwrap())
}

/// Parses `<integer><unit>` durations, unit one of `s`, `m`, `h`. The regex
/// gates the shape we accept; `duration_str` does the actual conversion so
/// the unit-to-seconds table lives in one place instead of two.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if !duration_format_regex().is_match(raw) {
        return None;
    }
    duration_str::parse(raw).ok()
}
