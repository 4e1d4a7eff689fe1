//! Translates a validated [`UserConfig`] into the collector's own pipeline
//! configuration.
//!
//! Generation is a pure function of `UserConfig`: the same validated config
//! always produces the same [`CollectorConfig`], which the Blue-Green
//! Reload Strategy relies on to tell "nothing actually changed" apart from
//! "a new pipeline needs to come up" by comparing [`canonical_bytes`]
//! output rather than diffing the `UserConfig` structurally.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::schema::UserConfig;

/// The collector-facing configuration document. Wraps a `serde_json::Value`
/// tree built from `BTreeMap`s end to end, which is what gives
/// [`canonical_bytes`] its deterministic key order: this crate does not
/// enable serde_json's `preserve_order` feature, so every map serializes in
/// sorted-key order with no extra bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig(Value);

impl CollectorConfig {
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

pub fn generate(config: &UserConfig) -> CollectorConfig {
    let mut receivers = BTreeMap::new();
    receivers.insert(
        "otlp".to_string(),
        json!({
            "protocols": {
                "grpc": { "endpoint": "0.0.0.0:4317" },
                "http": { "endpoint": "0.0.0.0:4318" },
            }
        }),
    );

    let mut processors: BTreeMap<String, Value> = BTreeMap::new();
    processors.insert("batch".to_string(), json!({}));
    processors.insert(
        "cardinalitylimiter".to_string(),
        json!({
            "global_limit": config.cardinality_global_limit,
            "per_metric_limits": config.per_metric_limits,
        }),
    );
    if config.enrich_host_metadata {
        processors.insert(
            "resourcedetection/host".to_string(),
            json!({ "detectors": ["system"] }),
        );
    }
    if config.redact_secrets {
        processors.insert(
            "redaction".to_string(),
            json!({ "allow_all_keys": false }),
        );
    }

    let mut exporters = BTreeMap::new();
    exporters.insert(
        "otlphttp/newrelic".to_string(),
        json!({
            "endpoint": "https://otlp.nr-data.net",
            "headers": { "api-key": config.license_key.expose() },
        }),
    );

    // Declared order, not insertion order: security -> enrich -> transform
    // (no transform flag in UserConfig yet) -> cardinality -> batch. Exporter
    // is never part of the chain itself; it is the pipeline's `exporters[]`.
    let mut processor_chain: Vec<String> = Vec::new();
    if config.redact_secrets {
        processor_chain.push("redaction".to_string());
    }
    if config.enrich_host_metadata {
        processor_chain.push("resourcedetection/host".to_string());
    }
    processor_chain.push("cardinalitylimiter".to_string());
    processor_chain.push("batch".to_string());

    let mut pipelines = BTreeMap::new();
    if config.metrics_enabled {
        pipelines.insert(
            "metrics".to_string(),
            json!({
                "receivers": ["otlp"],
                "processors": processor_chain,
                "exporters": ["otlphttp/newrelic"],
            }),
        );
    }

    let document = json!({
        "receivers": receivers,
        "processors": processors,
        "exporters": exporters,
        "service": {
            "pipelines": pipelines,
            "telemetry": {
                "resource": {
                    "service.name": config.service_name,
                    "deployment.environment": config.environment,
                    "labels": config.labels,
                }
            }
        },
    });

    CollectorConfig(document)
}

/// Deterministic, compact byte encoding used to compare two generated
/// configs for equality (no floats in this document, so `serde_json`'s
/// compact writer round-trips exactly the same bytes for equal values).
pub fn canonical_bytes(config: &CollectorConfig) -> Vec<u8> {
    serde_json::to_vec(&config.0).expect("CollectorConfig is always representable as JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LicenseKey;
    use std::time::Duration;

    fn base_config() -> UserConfig {
        UserConfig {
            service_name: "checkout-svc".into(),
            environment: "production".into(),
            license_key: LicenseKey::new("x".repeat(32)),
            metrics_enabled: true,
            metrics_interval: Duration::from_secs(60),
            redact_secrets: true,
            enrich_host_metadata: true,
            cardinality_global_limit: 1000,
            per_metric_limits: Default::default(),
            labels: Default::default(),
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let config = base_config();
        let a = canonical_bytes(&generate(&config));
        let b = canonical_bytes(&generate(&config));
        assert_eq!(a, b);
    }

    #[test]
    fn disabling_metrics_drops_the_metrics_pipeline() {
        let mut config = base_config();
        config.metrics_enabled = false;
        let generated = generate(&config);
        let pipelines = generated.as_value()["service"]["pipelines"].as_object().unwrap();
        assert!(!pipelines.contains_key("metrics"));
    }

    #[test]
    fn disabling_redaction_removes_the_processor_and_the_chain_entry() {
        let mut config = base_config();
        config.redact_secrets = false;
        let generated = generate(&config);
        assert!(generated.as_value()["processors"].get("redaction").is_none());
        let chain = generated.as_value()["service"]["pipelines"]["metrics"]["processors"]
            .as_array()
            .unwrap();
        assert!(!chain.iter().any(|p| p == "redaction"));
    }

    #[test]
    fn different_license_keys_still_produce_identical_bytes_modulo_the_key() {
        let a = base_config();
        let mut b = base_config();
        b.license_key = LicenseKey::new("y".repeat(32));
        assert_ne!(canonical_bytes(&generate(&a)), canonical_bytes(&generate(&b)));
    }
}
