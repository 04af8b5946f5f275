use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Hard cap on the number of test cases accepted per invocation.
pub const MAX_ALLOWED_ENTRIES: usize = 10;

/// Which identity source the Q application trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentitySource {
    #[default]
    Cognito,
    Idc,
}

impl IdentitySource {
    pub const VALID: [&'static str; 2] = ["COGNITO", "IDC"];
}

impl FromStr for IdentitySource {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COGNITO" => Ok(Self::Cognito),
            "IDC" => Ok(Self::Idc),
            other => Err(PipelineError::configuration(format!(
                "Invalid identity source {:?}. Valid values are {:?}",
                other,
                Self::VALID
            ))),
        }
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cognito => write!(f, "COGNITO"),
            Self::Idc => write!(f, "IDC"),
        }
    }
}

/// Path-specific settings, chosen once from the identity source.
#[derive(Debug, Clone, PartialEq)]
pub enum FederationSettings {
    Cognito {
        identity_pool_id: String,
        account_id: Option<String>,
    },
    Idc {
        /// Identity Center application ARN used as the token-exchange client id
        application_arn: String,
    },
}

impl FederationSettings {
    pub fn identity_source(&self) -> IdentitySource {
        match self {
            Self::Cognito { .. } => IdentitySource::Cognito,
            Self::Idc { .. } => IdentitySource::Idc,
        }
    }
}

/// Immutable per-invocation configuration for the credential chain and chat client
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// AWS region for every service client
    pub region: String,

    /// Q Business application to evaluate
    pub application_id: String,

    /// Cognito user pool the evaluation user lives in
    pub user_pool_id: String,

    /// Cognito app client id used for password auth
    pub client_id: String,

    /// Role assumed at the end of the chain
    pub role_arn: String,

    /// Secret holding the evaluation user's credentials
    pub user_secret_id: String,

    /// Username used when the secret carries only a password
    pub fallback_username: Option<String>,

    /// Federation path settings
    pub federation: FederationSettings,

    /// Chat client settings
    pub chat: ChatConfig,
}

impl EvaluationConfig {
    pub fn identity_source(&self) -> IdentitySource {
        self.federation.identity_source()
    }

    /// Login provider key used by the identity pool, `<idp host>/<user pool id>`.
    pub fn login_provider(&self) -> String {
        format!(
            "cognito-idp.{}.amazonaws.com/{}",
            self.region, self.user_pool_id
        )
    }
}

/// Chat client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum number of in-flight chat requests
    #[serde(default = "default_chat_concurrency")]
    pub concurrency: usize,

    /// Retry policy for transient chat failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            concurrency: default_chat_concurrency(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_retries")]
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum retry delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on the total time spent waiting between attempts
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,
}

impl RetryConfig {
    /// A policy that never retries.
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_elapsed_ms: default_max_elapsed(),
        }
    }
}

/// Configuration handed to the scoring framework with every run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Worker bound inside the scoring framework
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_run_timeout")]
    pub timeout: u64,

    /// Retries the framework may spend per model call
    #[serde(default = "default_run_max_retries")]
    pub max_retries: u32,

    /// Longest single wait between framework retries, in seconds
    #[serde(default = "default_run_max_wait")]
    pub max_wait: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timeout: default_run_timeout(),
            max_retries: default_run_max_retries(),
            max_wait: default_run_max_wait(),
        }
    }
}

/// Bedrock models the scoring metrics are bound to
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub region: String,
    pub embedding_model_id: String,
    pub text_model_id: String,
}

/// Scoring stage configuration
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Scoring service endpoint
    pub endpoint: String,

    pub models: ModelConfig,

    pub run: RunConfig,

    /// CloudWatch namespace for emitted metrics
    pub metrics_namespace: String,
}

// Default value functions
fn default_chat_concurrency() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_elapsed() -> u64 {
    120000
}

fn default_max_workers() -> usize {
    2
}
fn default_run_timeout() -> u64 {
    180
}
fn default_run_max_retries() -> u32 {
    10
}
fn default_run_max_wait() -> u64 {
    60
}
