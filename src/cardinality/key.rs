//! Deterministic identity for a metric series: a metric name plus its full
//! label set, canonicalized so two equal label sets always hash and compare
//! equal regardless of the order labels were recorded in.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// `labels` is taken as `BTreeMap` specifically so callers can't
    /// accidentally pass in an order-dependent map; the sorted iteration
    /// order is what makes the resulting string canonical.
    pub fn new(metric_name: &str, labels: &BTreeMap<String, String>) -> Self {
        let mut buf = String::with_capacity(metric_name.len() + labels.len() * 16);
        buf.push_str(metric_name);
        for (k, v) in labels {
            buf.push('\u{1}');
            buf.push_str(k);
            buf.push('\u{2}');
            buf.push_str(v);
        }
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_order_does_not_affect_identity() {
        let mut a = BTreeMap::new();
        a.insert("region".to_string(), "us".to_string());
        a.insert("host".to_string(), "h1".to_string());

        let mut b = BTreeMap::new();
        b.insert("host".to_string(), "h1".to_string());
        b.insert("region".to_string(), "us".to_string());

        assert_eq!(SeriesKey::new("cpu.usage", &a), SeriesKey::new("cpu.usage", &b));
    }

    #[test]
    fn different_label_values_differ() {
        let mut a = BTreeMap::new();
        a.insert("host".to_string(), "h1".to_string());
        let mut b = BTreeMap::new();
        b.insert("host".to_string(), "h2".to_string());
        assert_ne!(SeriesKey::new("cpu.usage", &a), SeriesKey::new("cpu.usage", &b));
    }
}
