use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::broker::{CredentialBroker, FederationPath, UserDirectory};
use crate::chat::{ChatClient, ChatServiceFactory};
use crate::common::{ChatResponse, EvaluationConfig, EvaluationDataset, RunConfig, TestCase, TestSet};
use crate::error::{PipelineError, PipelineResult};
use crate::evaluation::{EvaluationReport, EvaluationRunner, Metric};
use crate::metrics::{MetricsLogger, APPLICATION_DIMENSION};
use crate::secrets::{resolve_user_credentials, SecretStore};
use crate::shaper::shape_dataset;

/// External services one invocation talks to
pub struct Collaborators {
    pub secrets: Arc<dyn SecretStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub federation: FederationPath,
    pub chat_factory: Arc<dyn ChatServiceFactory>,
}

/// Scoring and metrics emission settings
pub struct ScoringStage {
    pub runner: EvaluationRunner,
    pub metrics: Vec<Metric>,
    pub run_config: RunConfig,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub invocation_id: Uuid,
    pub dataset: EvaluationDataset,
    pub report: EvaluationReport,
}

/// One evaluation invocation. Consumed by the run, nothing is reused.
pub struct Pipeline {
    invocation_id: Uuid,
    config: EvaluationConfig,
    collaborators: Collaborators,
}

impl Pipeline {
    pub fn new(config: EvaluationConfig, collaborators: Collaborators) -> PipelineResult<Self> {
        let configured = config.identity_source();
        let wired = collaborators.federation.identity_source();
        if configured != wired {
            return Err(PipelineError::configuration(format!(
                "identity source {} does not match the {} federation path",
                configured, wired
            )));
        }

        Ok(Self {
            invocation_id: Uuid::new_v4(),
            config,
            collaborators,
        })
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// Run the identity chain and ask every question of the test set.
    #[instrument(skip_all, fields(invocation_id = %self.invocation_id, identity_source = %self.config.identity_source()))]
    pub async fn collect_responses(
        self,
        testset: &TestSet,
    ) -> PipelineResult<HashMap<String, ChatResponse>> {
        let Self {
            config,
            collaborators,
            ..
        } = self;

        let user = resolve_user_credentials(
            collaborators.secrets.as_ref(),
            &config.user_secret_id,
            config.fallback_username.as_deref(),
        )
        .await?;

        let mut broker = CredentialBroker::new(
            collaborators.directory,
            collaborators.federation,
            config.role_arn.clone(),
        );
        let credential = broker.obtain_credentials(&user).await?;

        let client = ChatClient::connect(
            collaborators.chat_factory.as_ref(),
            credential,
            &config.chat,
        )
        .await;
        client
            .ask(&testset.questions(), &config.application_id)
            .await
    }

    /// Ask ad-hoc questions and shape the answers without scoring.
    pub async fn ask(self, questions: Vec<String>) -> PipelineResult<EvaluationDataset> {
        let testset = TestSet::new(
            questions
                .into_iter()
                .map(|question| TestCase {
                    question,
                    ground_truth: String::new(),
                })
                .collect(),
        )?;
        let responses = self.collect_responses(&testset).await?;
        Ok(shape_dataset(&testset, &responses))
    }

    /// Full evaluation of a validated test set: chat, shape, score, emit.
    pub async fn evaluate<W: Write>(
        self,
        testset: &TestSet,
        scoring: &ScoringStage,
        metrics_out: &mut W,
    ) -> PipelineResult<EvaluationOutcome> {
        if testset.is_empty() {
            warn!("Test set is empty, nothing to ask");
        }
        info!("Evaluating {} test cases", testset.len());

        let invocation_id = self.invocation_id;
        let application_id = self.config.application_id.clone();

        let responses = self.collect_responses(testset).await?;
        let dataset = shape_dataset(testset, &responses);

        let report = scoring
            .runner
            .run(&dataset, &scoring.metrics, &scoring.run_config)
            .await?;

        let mut logger = MetricsLogger::new(scoring.namespace.clone());
        logger.put_dimension(APPLICATION_DIMENSION, application_id);
        logger.put_scores(&report.scores);
        logger.flush(metrics_out).map_err(|e| {
            PipelineError::evaluation("failed to emit evaluation metrics").with_source(e)
        })?;

        Ok(EvaluationOutcome {
            invocation_id,
            dataset,
            report,
        })
    }
}
