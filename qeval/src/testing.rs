//! In-memory collaborators used by unit tests.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::broker::{
    AuthenticationResult, ContextRoleAssumer, IdentityIdResolver, OpenIdTokenIssuer,
    ScopedCredential, TokenExchanger, UserDirectory, WebIdentityRoleAssumer,
};
use crate::chat::{ChatService, ChatServiceFactory};
use crate::common::{ChatRequest, ChatResponse, SourceAttribution};
use crate::error::CallError;
use crate::evaluation::{ScoringFramework, ScoringRequest, ScoringResponse};
use crate::secrets::SecretStore;

pub fn jwt_with(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

pub fn test_chat_response() -> ChatResponse {
    ChatResponse {
        conversation_id: Some("1111111".to_string()),
        system_message: Some("test message".to_string()),
        source_attributions: Some(vec![SourceAttribution {
            title: Some("data source title".to_string()),
            snippet: Some("data snippet".to_string()),
            url: Some("test_url.com".to_string()),
            citation_number: Some(123),
        }]),
        ..ChatResponse::default()
    }
}

/// Ordered record of every collaborator call
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<&'static str>>>,
    session_names: Arc<Mutex<Vec<String>>>,
    contexts: Arc<Mutex<Vec<(String, String)>>>,
}

impl CallLog {
    pub fn record(&self, operation: &'static str) {
        self.calls.lock().unwrap().push(operation);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    pub fn last_session_name(&self) -> Option<String> {
        self.session_names.lock().unwrap().last().cloned()
    }

    pub fn last_context(&self) -> Option<(String, String)> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

pub struct FakeSecretStore {
    log: CallLog,
    response: Result<Option<String>, CallError>,
}

impl FakeSecretStore {
    pub fn with_secret(log: &CallLog, secret: &str) -> Self {
        Self {
            log: log.clone(),
            response: Ok(Some(secret.to_string())),
        }
    }

    pub fn denied(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            response: Err(CallError::rejected("GetSecretValue", "access denied")
                .with_code("AccessDeniedException")),
        }
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get_secret_string(&self, _secret_id: &str) -> Result<Option<String>, CallError> {
        self.log.record("GetSecretValue");
        self.response.clone()
    }
}

pub struct FakeDirectory {
    log: CallLog,
    response: Result<Option<AuthenticationResult>, CallError>,
}

impl FakeDirectory {
    pub fn with_token(log: &CallLog, token: &str) -> Self {
        Self {
            log: log.clone(),
            response: Ok(Some(AuthenticationResult {
                id_token: Some(token.to_string()),
                expires_in: Some(123),
            })),
        }
    }

    pub fn without_token(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            response: Ok(Some(AuthenticationResult {
                expires_in: Some(3600),
                ..AuthenticationResult::default()
            })),
        }
    }

    pub fn failing(log: &CallLog, error: CallError) -> Self {
        Self {
            log: log.clone(),
            response: Err(error),
        }
    }
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn initiate_password_auth(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<Option<AuthenticationResult>, CallError> {
        self.log.record("InitiateAuth");
        self.response.clone()
    }
}

pub struct FakeExchanger {
    log: CallLog,
    response: Result<Option<String>, CallError>,
}

impl FakeExchanger {
    pub fn returning(log: &CallLog, response: Result<Option<String>, CallError>) -> Self {
        Self {
            log: log.clone(),
            response,
        }
    }
}

#[async_trait]
impl TokenExchanger for FakeExchanger {
    async fn exchange_token(
        &self,
        _client_id: &str,
        _grant_type: &str,
        _assertion: &str,
    ) -> Result<Option<String>, CallError> {
        self.log.record("CreateTokenWithIAM");
        self.response.clone()
    }
}

pub struct FakeIdentityPool {
    log: CallLog,
    fail_get_id: bool,
}

impl FakeIdentityPool {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail_get_id: false,
        }
    }

    pub fn failing_get_id(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail_get_id: true,
        }
    }
}

#[async_trait]
impl IdentityIdResolver for FakeIdentityPool {
    async fn resolve_identity_id(
        &self,
        _identity_pool_id: &str,
        _account_id: Option<&str>,
        _login_provider: &str,
        _id_token: &str,
    ) -> Result<Option<String>, CallError> {
        self.log.record("GetId");
        if self.fail_get_id {
            return Err(CallError::rejected("GetId", "Invalid login token")
                .with_code("NotAuthorizedException"));
        }
        Ok(Some("testIdentityId".to_string()))
    }
}

#[async_trait]
impl OpenIdTokenIssuer for FakeIdentityPool {
    async fn issue_open_id_token(
        &self,
        _identity_id: &str,
        _login_provider: &str,
        _id_token: &str,
    ) -> Result<Option<String>, CallError> {
        self.log.record("GetOpenIdToken");
        Ok(Some("testToken".to_string()))
    }
}

pub struct FakeAssumer {
    log: CallLog,
    fail: bool,
}

impl FakeAssumer {
    pub fn succeeding(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail: false,
        }
    }

    pub fn failing(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail: true,
        }
    }

    fn respond(&self, operation: &'static str) -> Result<Option<ScopedCredential>, CallError> {
        if self.fail {
            return Err(CallError::rejected(operation, "Not authorized to perform sts:AssumeRole")
                .with_code("AccessDenied"));
        }
        Ok(Some(ScopedCredential::new(
            "testAccessKeyId",
            "testSecretAccessKey",
            "testSessionToken",
            None,
        )))
    }
}

#[async_trait]
impl WebIdentityRoleAssumer for FakeAssumer {
    async fn assume_role_with_web_identity(
        &self,
        _role_arn: &str,
        session_name: &str,
        _web_identity_token: &str,
    ) -> Result<Option<ScopedCredential>, CallError> {
        self.log.record("AssumeRoleWithWebIdentity");
        self.log
            .session_names
            .lock()
            .unwrap()
            .push(session_name.to_string());
        self.respond("AssumeRoleWithWebIdentity")
    }
}

#[async_trait]
impl ContextRoleAssumer for FakeAssumer {
    async fn assume_role_with_context(
        &self,
        _role_arn: &str,
        session_name: &str,
        provider_arn: &str,
        context_assertion: &str,
    ) -> Result<Option<ScopedCredential>, CallError> {
        self.log.record("AssumeRole");
        self.log
            .session_names
            .lock()
            .unwrap()
            .push(session_name.to_string());
        self.log
            .contexts
            .lock()
            .unwrap()
            .push((provider_arn.to_string(), context_assertion.to_string()));
        self.respond("AssumeRole")
    }
}

/// Chat service answering from a fixed table; unknown questions fail
pub struct FakeChatService {
    log: CallLog,
    answers: HashMap<String, Result<ChatResponse, CallError>>,
}

impl FakeChatService {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            answers: HashMap::new(),
        }
    }

    pub fn answer(mut self, question: &str, response: Result<ChatResponse, CallError>) -> Self {
        self.answers.insert(question.to_string(), response);
        self
    }
}

#[async_trait]
impl ChatService for FakeChatService {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, CallError> {
        self.log.record("ChatSync");
        self.answers
            .get(&request.message)
            .cloned()
            .unwrap_or_else(|| Err(CallError::rejected("ChatSync", "unknown question")))
    }
}

pub struct FakeChatFactory {
    log: CallLog,
    service: Arc<FakeChatService>,
}

impl FakeChatFactory {
    pub fn new(log: &CallLog, service: FakeChatService) -> Self {
        Self {
            log: log.clone(),
            service: Arc::new(service),
        }
    }
}

#[async_trait]
impl ChatServiceFactory for FakeChatFactory {
    async fn connect(&self, _credential: ScopedCredential) -> Arc<dyn ChatService> {
        self.log.record("ConnectChat");
        self.service.clone()
    }
}

/// Scoring framework returning a fixed score per metric for every row
pub struct FakeScoring {
    log: CallLog,
    score: f64,
    requests: Mutex<Vec<ScoringRequest>>,
}

impl FakeScoring {
    pub fn new(log: &CallLog, score: f64) -> Self {
        Self {
            log: log.clone(),
            score,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> Option<ScoringRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ScoringFramework for FakeScoring {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, CallError> {
        self.log.record("Score");
        self.requests.lock().unwrap().push(request.clone());
        let rows = request
            .dataset
            .rows
            .iter()
            .map(|_| {
                request
                    .metrics
                    .iter()
                    .map(|b| (b.metric.name().to_string(), Some(self.score)))
                    .collect()
            })
            .collect();
        Ok(ScoringResponse { scores: rows })
    }
}
