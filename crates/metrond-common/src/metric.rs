//! The metric domain entity.
//!
//! Two kinds of metric exist:
//! - `gauge` (f64): a new value completely replaces the stored one.
//! - `counter` (i64): the agent ships a delta which the server adds to the
//!   stored value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricType::Gauge => write!(f, "gauge"),
            MetricType::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricType {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            other => Err(MetricError::Validation(format!(
                "unknown metric type: {other}"
            ))),
        }
    }
}

/// A typed metric value: the gauge/counter split replaces any runtime
/// type switching on the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("metric validation error: {0}")]
    Validation(String),
}

/// Wire form: `{"id": ..., "type": ..., "delta"?: ..., "value"?: ...}`.
/// Exactly one of `delta`/`value` is populated, matching `mtype`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    /// Seeds id and type only; the value is set through [`Metric::update_value`].
    pub fn new(id: impl Into<String>, mtype: MetricType) -> Self {
        Self {
            id: id.into(),
            mtype,
            delta: None,
            value: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricType::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricType::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Returns the typed value, `None` when the metric carries no value yet.
    pub fn value(&self) -> Option<MetricValue> {
        match self.mtype {
            MetricType::Gauge => self.value.map(MetricValue::Gauge),
            MetricType::Counter => self.delta.map(MetricValue::Counter),
        }
    }

    /// Applies an incoming value: gauges are replaced, counters add the
    /// delta to the stored one (or seed it when empty).
    pub fn update_value(&mut self, incoming: MetricValue) -> Result<(), MetricError> {
        match (self.mtype, incoming) {
            (MetricType::Gauge, MetricValue::Gauge(v)) => {
                self.value = Some(v);
                Ok(())
            }
            (MetricType::Counter, MetricValue::Counter(d)) => {
                self.delta = Some(self.delta.unwrap_or(0).saturating_add(d));
                Ok(())
            }
            (mtype, _) => Err(MetricError::Validation(format!(
                "value kind does not match metric type {mtype}: id={}",
                self.id
            ))),
        }
    }

    /// Textual form of the value: shortest-roundtrip float for gauges,
    /// decimal integer for counters. Empty when no value is set.
    pub fn value_str(&self) -> String {
        match self.value() {
            Some(MetricValue::Gauge(v)) => format!("{v}"),
            Some(MetricValue::Counter(d)) => format!("{d}"),
            None => String::new(),
        }
    }

    /// Validates id shape, and (when `require_value`) that the field
    /// matching the type is populated.
    pub fn check(&self, require_value: bool) -> Result<(), MetricError> {
        if !valid_id(&self.id) {
            return Err(MetricError::Validation(format!(
                "metric id is incorrect: {:?}",
                self.id
            )));
        }

        if require_value && self.value().is_none() {
            return Err(MetricError::Validation(format!(
                "metric value is missing: id={}, type={}, delta={:?}, value={:?}",
                self.id, self.mtype, self.delta, self.value
            )));
        }
        Ok(())
    }

    /// Fails when the incoming type differs from this metric's type.
    pub fn compare_types(&self, incoming: MetricType) -> Result<(), MetricError> {
        if self.mtype != incoming {
            return Err(MetricError::Validation(format!(
                "metric type mismatch for {}: expected {}, have {incoming}",
                self.id, self.mtype
            )));
        }
        Ok(())
    }
}

/// Valid ids match `^[A-Za-z][A-Za-z0-9]*$`.
pub fn valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Ids of a batch, in order.
pub fn metric_ids(metrics: &[Metric]) -> Vec<String> {
    metrics.iter().map(|m| m.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_update_replaces() {
        let mut m = Metric::gauge("Alloc", 1.0);
        m.update_value(MetricValue::Gauge(2.5)).unwrap();
        assert_eq!(m.value, Some(2.5));
        assert_eq!(m.value_str(), "2.5");
    }

    #[test]
    fn counter_update_adds_or_seeds() {
        let mut m = Metric::new("PollCount", MetricType::Counter);
        m.update_value(MetricValue::Counter(5)).unwrap();
        m.update_value(MetricValue::Counter(7)).unwrap();
        assert_eq!(m.delta, Some(12));
        assert_eq!(m.value_str(), "12");
    }

    #[test]
    fn update_rejects_mismatched_value_kind() {
        let mut m = Metric::new("Alloc", MetricType::Gauge);
        assert!(m.update_value(MetricValue::Counter(1)).is_err());
    }

    #[test]
    fn gauge_value_str_is_shortest_roundtrip() {
        assert_eq!(Metric::gauge("A", 200.0).value_str(), "200");
        assert_eq!(Metric::gauge("A", 0.1).value_str(), "0.1");
    }

    #[test]
    fn id_validation() {
        assert!(valid_id("Alloc"));
        assert!(valid_id("CPUutilization0"));
        assert!(valid_id("x"));
        assert!(!valid_id(""));
        assert!(!valid_id("9lives"));
        assert!(!valid_id("has space"));
        assert!(!valid_id("semi;colon"));
        assert!(!valid_id("under_score"));
    }

    #[test]
    fn check_requires_matching_value_field() {
        let m = Metric::new("Alloc", MetricType::Gauge);
        assert!(m.check(false).is_ok());
        assert!(m.check(true).is_err());
        assert!(Metric::gauge("Alloc", 1.0).check(true).is_ok());

        let bad = Metric::new("bad id", MetricType::Gauge);
        assert!(bad.check(false).is_err());
    }

    #[test]
    fn compare_types_mismatch_fails() {
        let m = Metric::gauge("Alloc", 1.0);
        assert!(m.compare_types(MetricType::Gauge).is_ok());
        assert!(m.compare_types(MetricType::Counter).is_err());
    }

    #[test]
    fn wire_form_skips_absent_fields() {
        let g = serde_json::to_value(Metric::gauge("Alloc", 1.5)).unwrap();
        assert_eq!(
            g,
            serde_json::json!({"id": "Alloc", "type": "gauge", "value": 1.5})
        );

        let c = serde_json::to_value(Metric::counter("C", 3)).unwrap();
        assert_eq!(
            c,
            serde_json::json!({"id": "C", "type": "counter", "delta": 3})
        );

        let parsed: Metric = serde_json::from_str(r#"{"id":"C","type":"counter"}"#).unwrap();
        assert_eq!(parsed.delta, None);
    }
}
