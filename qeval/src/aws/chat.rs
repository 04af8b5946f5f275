use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_qbusiness::operation::chat_sync::ChatSyncOutput;
use aws_sdk_qbusiness::Client as QBusinessClient;
use std::sync::Arc;
use tracing::info;

use super::call_error;
use crate::broker::ScopedCredential;
use crate::chat::{ChatService, ChatServiceFactory};
use crate::common::{ChatRequest, ChatResponse, SourceAttribution};
use crate::error::CallError;

/// Q Business chat under the scoped credential
pub struct QBusinessChatService {
    client: QBusinessClient,
}

impl QBusinessChatService {
    pub fn new(client: QBusinessClient) -> Self {
        Self { client }
    }
}

fn to_response(output: &ChatSyncOutput) -> ChatResponse {
    // the service may return null entries in the citation list
    let citations: Vec<SourceAttribution> = output
        .source_attributions()
        .iter()
        .flatten()
        .map(|a| SourceAttribution {
            title: a.title().map(str::to_string),
            snippet: a.snippet().map(str::to_string),
            url: a.url().map(str::to_string),
            citation_number: a.citation_number().into(),
        })
        .collect();

    ChatResponse {
        conversation_id: output.conversation_id().map(str::to_string),
        system_message: output.system_message().map(str::to_string),
        system_message_id: output.system_message_id().map(str::to_string),
        user_message_id: output.user_message_id().map(str::to_string),
        source_attributions: if citations.is_empty() {
            None
        } else {
            Some(citations)
        },
    }
}

#[async_trait]
impl ChatService for QBusinessChatService {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, CallError> {
        let output = self
            .client
            .chat_sync()
            .application_id(&request.application_id)
            .user_message(&request.message)
            .set_conversation_id(request.conversation_id.clone())
            .set_parent_message_id(request.parent_message_id.clone())
            .send()
            .await
            .map_err(|e| call_error("ChatSync", e))?;

        Ok(to_response(&output))
    }
}

/// Builds the Q Business client from the scoped credential only
pub struct QBusinessChatFactory {
    region: String,
}

impl QBusinessChatFactory {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
        }
    }
}

#[async_trait]
impl ChatServiceFactory for QBusinessChatFactory {
    async fn connect(&self, credential: ScopedCredential) -> Arc<dyn ChatService> {
        info!(
            "Creating Q Business client for access key {}",
            credential.access_key_id()
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credential.into_sdk_credentials())
            .load()
            .await;

        Arc::new(QBusinessChatService::new(QBusinessClient::new(&sdk_config)))
    }
}
