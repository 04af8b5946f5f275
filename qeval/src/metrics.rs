use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, warn};

use crate::evaluation::MetricScores;

pub const DEFAULT_NAMESPACE: &str = "QEvaluationLambda";
pub const APPLICATION_DIMENSION: &str = "QApplicationId";

/// Collects metrics and writes them as one CloudWatch Embedded Metric
/// Format document.
#[derive(Debug, Clone)]
pub struct MetricsLogger {
    namespace: String,
    dimensions: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
}

impl MetricsLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            dimensions: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn put_dimension(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.dimensions.insert(name.into(), value.into());
    }

    pub fn put_metric(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if !value.is_finite() {
            warn!("Skipping non-finite value for metric {}", name);
            return;
        }
        self.metrics.insert(name, value);
    }

    /// Record every aggregated score that has a value.
    pub fn put_scores(&mut self, scores: &MetricScores) {
        for (name, value) in scores {
            match value {
                Some(v) => self.put_metric(name.clone(), *v),
                None => warn!("No score for metric {}, not emitted", name),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn to_document(&self, timestamp: DateTime<Utc>) -> Value {
        let definitions: Vec<Value> = self
            .metrics
            .keys()
            .map(|name| json!({"Name": name, "Unit": "None"}))
            .collect();
        let dimension_keys: Vec<&String> = self.dimensions.keys().collect();

        let mut document = Map::new();
        document.insert(
            "_aws".to_string(),
            json!({
                "Timestamp": timestamp.timestamp_millis(),
                "CloudWatchMetrics": [{
                    "Namespace": self.namespace,
                    "Dimensions": [dimension_keys],
                    "Metrics": definitions,
                }],
            }),
        );
        for (key, value) in &self.dimensions {
            document.insert(key.clone(), Value::from(value.as_str()));
        }
        for (key, value) in &self.metrics {
            document.insert(key.clone(), json!(value));
        }
        Value::Object(document)
    }

    /// Write the document as a single line and clear the recorded metrics.
    pub fn flush<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        if self.is_empty() {
            debug!("No metrics to flush");
            return Ok(());
        }
        let document = self.to_document(Utc::now());
        writeln!(out, "{}", document)?;
        out.flush()?;
        self.metrics.clear();
        Ok(())
    }
}
