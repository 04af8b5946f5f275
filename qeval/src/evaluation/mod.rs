//! Evaluation runner.
//!
//! Scoring is delegated to an external RAG evaluation framework. The runner
//! binds each metric to its model backends, hands the dataset over, and
//! aggregates the per-row scores it gets back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::common::{EvaluationDataset, ModelConfig, RunConfig};
use crate::error::{CallError, PipelineError, PipelineResult};

pub mod remote;

pub use remote::HttpScoringFramework;

/// Per-metric scores keyed by metric name
pub type MetricScores = BTreeMap<String, Option<f64>>;

/// Quality metrics understood by the scoring framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AnswerRelevancy,
    Faithfulness,
    ContextRecall,
    ContextPrecision,
}

impl Metric {
    pub const DEFAULTS: [Metric; 4] = [
        Metric::AnswerRelevancy,
        Metric::Faithfulness,
        Metric::ContextRecall,
        Metric::ContextPrecision,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::AnswerRelevancy => "answer_relevancy",
            Self::Faithfulness => "faithfulness",
            Self::ContextRecall => "context_recall",
            Self::ContextPrecision => "context_precision",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::DEFAULTS
            .into_iter()
            .find(|m| m.name() == s.trim())
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::DEFAULTS.iter().map(Metric::name).collect();
                format!("unknown metric {:?}, expected one of {:?}", s, valid)
            })
    }
}

/// A model the framework calls while scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBackend {
    pub model_id: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

/// A metric together with the embedding and generation models it uses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricBinding {
    pub metric: Metric,
    pub embeddings: ModelBackend,
    pub llm: ModelBackend,
}

/// Bind every metric to the configured Bedrock models.
pub fn bind_metrics(metrics: &[Metric], models: &ModelConfig) -> Vec<MetricBinding> {
    let embeddings = ModelBackend {
        model_id: models.embedding_model_id.clone(),
        region: models.region.clone(),
        endpoint_url: None,
    };
    let llm = ModelBackend {
        model_id: models.text_model_id.clone(),
        region: models.region.clone(),
        endpoint_url: Some(bedrock_runtime_endpoint(&models.region)),
    };

    metrics
        .iter()
        .map(|metric| MetricBinding {
            metric: *metric,
            embeddings: embeddings.clone(),
            llm: llm.clone(),
        })
        .collect()
}

pub fn bedrock_runtime_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

/// Everything the framework needs for one scoring run
#[derive(Debug, Clone, Serialize)]
pub struct ScoringRequest {
    pub dataset: EvaluationDataset,
    pub metrics: Vec<MetricBinding>,
    pub run_config: RunConfig,
}

/// Per-row scores, in dataset order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub scores: Vec<MetricScores>,
}

/// External RAG evaluation framework
#[async_trait]
pub trait ScoringFramework: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, CallError>;
}

/// Per-row and aggregated scores of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub rows: Vec<MetricScores>,
    pub scores: MetricScores,
}

/// Mean of the finite values; `None` when there are none.
pub fn nan_mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub struct EvaluationRunner {
    framework: Arc<dyn ScoringFramework>,
    models: ModelConfig,
}

impl EvaluationRunner {
    pub fn new(framework: Arc<dyn ScoringFramework>, models: ModelConfig) -> Self {
        Self { framework, models }
    }

    #[instrument(skip_all, fields(rows = dataset.len(), metrics = metrics.len()))]
    pub async fn run(
        &self,
        dataset: &EvaluationDataset,
        metrics: &[Metric],
        run_config: &RunConfig,
    ) -> PipelineResult<EvaluationReport> {
        if metrics.is_empty() {
            return Err(PipelineError::evaluation("no metrics selected"));
        }

        let names: Vec<&str> = metrics.iter().map(Metric::name).collect();
        if dataset.is_empty() {
            warn!("Empty dataset, nothing to score");
            return Ok(EvaluationReport {
                rows: Vec::new(),
                scores: names.iter().map(|n| (n.to_string(), None)).collect(),
            });
        }

        info!(
            "Scoring {} rows on {:?} with max_workers={}",
            dataset.len(),
            names,
            run_config.max_workers
        );

        let request = ScoringRequest {
            dataset: dataset.clone(),
            metrics: bind_metrics(metrics, &self.models),
            run_config: run_config.clone(),
        };

        let response = self.framework.score(&request).await.map_err(|e| {
            error!("Scoring failed: {}", e);
            PipelineError::evaluation("scoring framework failed").with_source(e)
        })?;

        if response.scores.len() != dataset.len() {
            return Err(PipelineError::evaluation(format!(
                "scoring framework returned {} rows for a dataset of {}",
                response.scores.len(),
                dataset.len()
            )));
        }

        let scores: MetricScores = names
            .iter()
            .map(|name| {
                let mean = nan_mean(response.scores.iter().map(|row| row.get(*name).copied().flatten()));
                (name.to_string(), mean)
            })
            .collect();

        info!("Evaluation scores: {:?}", scores);
        Ok(EvaluationReport {
            rows: response.scores,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DatasetRow;
    use crate::testing::{CallLog, FakeScoring};

    fn models() -> ModelConfig {
        ModelConfig {
            region: "us-west-2".to_string(),
            embedding_model_id: "amazon.titan-embed-text-v1".to_string(),
            text_model_id: "anthropic.claude-v2".to_string(),
        }
    }

    fn dataset(rows: usize) -> EvaluationDataset {
        EvaluationDataset {
            rows: (0..rows)
                .map(|i| DatasetRow {
                    question: format!("q{}", i),
                    answer: "a".to_string(),
                    ground_truth: "gt".to_string(),
                    contexts: vec!["ctx".to_string()],
                })
                .collect(),
        }
    }

    #[test]
    fn test_nan_mean_skips_missing_and_nan() {
        assert_eq!(nan_mean(vec![Some(1.0), Some(f64::NAN), None, Some(0.5)]), Some(0.75));
        assert_eq!(nan_mean(vec![Some(f64::NAN), None]), None);
        assert_eq!(nan_mean(Vec::new()), None);
    }

    #[test]
    fn test_metric_names_parse() {
        assert_eq!("context_recall".parse::<Metric>().unwrap(), Metric::ContextRecall);
        assert!("bleu".parse::<Metric>().is_err());
    }

    #[test]
    fn test_bindings_use_configured_models() {
        let bindings = bind_metrics(&Metric::DEFAULTS, &models());
        assert_eq!(bindings.len(), 4);
        assert_eq!(bindings[0].metric.name(), "answer_relevancy");
        assert_eq!(bindings[0].embeddings.model_id, "amazon.titan-embed-text-v1");
        assert_eq!(bindings[0].llm.model_id, "anthropic.claude-v2");
        assert_eq!(
            bindings[0].llm.endpoint_url.as_deref(),
            Some("https://bedrock-runtime.us-west-2.amazonaws.com")
        );
    }

    #[tokio::test]
    async fn test_run_aggregates_per_metric() {
        let log = CallLog::default();
        let scoring = Arc::new(FakeScoring::new(&log, 0.75));
        let runner = EvaluationRunner::new(scoring.clone(), models());

        let report = runner
            .run(&dataset(3), &Metric::DEFAULTS, &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.scores.len(), 4);
        assert_eq!(report.scores["faithfulness"], Some(0.75));

        let request = scoring.last_request().unwrap();
        assert_eq!(request.run_config.max_workers, 2);
        assert_eq!(request.dataset.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_dataset_is_not_sent() {
        let log = CallLog::default();
        let runner = EvaluationRunner::new(Arc::new(FakeScoring::new(&log, 1.0)), models());

        let report = runner
            .run(&dataset(0), &[Metric::Faithfulness], &RunConfig::default())
            .await
            .unwrap();

        assert_eq!(report.scores["faithfulness"], None);
        assert_eq!(log.count("Score"), 0);
    }

    struct BrokenFramework;

    #[async_trait]
    impl ScoringFramework for BrokenFramework {
        async fn score(&self, _request: &ScoringRequest) -> Result<ScoringResponse, CallError> {
            Err(CallError::transient("Score", "model throttled"))
        }
    }

    #[tokio::test]
    async fn test_framework_failure_is_an_evaluation_error() {
        let runner = EvaluationRunner::new(Arc::new(BrokenFramework), models());

        let err = runner
            .run(&dataset(1), &Metric::DEFAULTS, &RunConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Evaluation { .. }));
        assert_eq!(err.exit_code(), 8);
    }
}
