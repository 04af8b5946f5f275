use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::broker::ScopedCredential;
use crate::common::{ChatConfig, ChatRequest, ChatResponse};
use crate::error::{CallError, PipelineError, PipelineResult};
use crate::retry::RetryPolicy;

/// Synchronous chat against a Q application
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, CallError>;
}

/// Builds the chat service from the scoped credential
#[async_trait]
pub trait ChatServiceFactory: Send + Sync {
    async fn connect(&self, credential: ScopedCredential) -> Arc<dyn ChatService>;
}

/// Sends the test questions to the chat service.
///
/// Every question is an independent request. The first failure aborts the
/// batch; no partial answers are returned.
pub struct ChatClient {
    service: Arc<dyn ChatService>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(service: Arc<dyn ChatService>, config: &ChatConfig) -> Self {
        Self {
            service,
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::new(config.retry.clone()),
        }
    }

    /// Build the service once from the credential and wrap it.
    pub async fn connect(
        factory: &dyn ChatServiceFactory,
        credential: ScopedCredential,
        config: &ChatConfig,
    ) -> Self {
        debug!("Connecting chat service with {:?}", credential);
        Self::new(factory.connect(credential).await, config)
    }

    #[instrument(skip_all, fields(application_id = %application_id, questions = questions.len()))]
    pub async fn ask(
        &self,
        questions: &[String],
        application_id: &str,
    ) -> PipelineResult<HashMap<String, ChatResponse>> {
        info!(
            "Asking {} questions with up to {} in flight",
            questions.len(),
            self.concurrency
        );

        let service = &self.service;
        let retry = &self.retry;

        let responses = stream::iter(questions.iter().cloned())
            .map(|question| async move {
                let request = ChatRequest::new(application_id, question.clone());
                let response = retry
                    .run(|| service.chat(&request))
                    .await
                    .map_err(|e| {
                        error!("Chat request failed for question {:?}: {}", question, e);
                        PipelineError::chat_service(format!(
                            "chat request failed for question {:?}",
                            question
                        ))
                        .with_source(e)
                    })?;
                debug!("Received answer for question {:?}", question);
                Ok::<_, PipelineError>((question, response))
            })
            .buffer_unordered(self.concurrency)
            .try_collect::<HashMap<_, _>>()
            .await?;

        info!("Received {} answers", responses.len());
        Ok(responses)
    }
}
