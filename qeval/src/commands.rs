use clap::{Args, Parser};

use crate::common::{
    ChatConfig, EvaluationConfig, FederationSettings, IdentitySource, ModelConfig, RetryConfig,
    RunConfig, ScoringConfig,
};
use crate::error::PipelineError;
use crate::evaluation::Metric;
use crate::metrics::DEFAULT_NAMESPACE;

/// Deployment settings shared by every command
#[derive(Args, Debug, Clone)]
pub struct DeploymentArgs {
    /// AWS region of the Q application and the identity resources
    #[arg(long, env = "Region")]
    pub region: String,

    /// Account owning the identity pool
    #[arg(long, env = "AccountId")]
    pub account_id: Option<String>,

    /// Q Business application id
    #[arg(long, env = "QBusinessApplicationId")]
    pub application_id: String,

    /// Cognito user pool id
    #[arg(long, env = "UserPoolId")]
    pub user_pool_id: String,

    /// Cognito user pool app client id
    #[arg(long, env = "ClientId")]
    pub client_id: String,

    /// Cognito identity pool id (COGNITO identity source)
    #[arg(long, env = "IdentityPoolId")]
    pub identity_pool_id: Option<String>,

    /// Role assumed for the chat calls
    #[arg(long, env = "QAppRoleArn")]
    pub role_arn: String,

    /// Evaluation user, used when the secret carries no username
    #[arg(long, env = "UserEmail")]
    pub user_email: Option<String>,

    /// Secret holding the evaluation user's credentials
    #[arg(long, env = "UserSecretId")]
    pub user_secret_id: String,

    /// Identity source trusted by the Q application (COGNITO or IDC)
    #[arg(long, env = "QAppIdentitySource", default_value = "COGNITO")]
    pub identity_source: String,

    /// Identity Center application used for trusted identity propagation (IDC identity source)
    #[arg(long, env = "IdcAppTrustedIdentityPropagationArn")]
    pub idc_application_arn: Option<String>,

    /// Maximum number of chat requests in flight
    #[arg(long, env = "ChatConcurrency", default_value = "2")]
    pub chat_concurrency: usize,

    /// Attempts per chat request, 1 disables retries
    #[arg(long, env = "ChatMaxAttempts", default_value = "3")]
    pub chat_max_attempts: u32,

    /// First retry delay in milliseconds
    #[arg(long, env = "ChatInitialDelayMs", default_value = "1000")]
    pub chat_initial_delay_ms: u64,

    /// Longest retry delay in milliseconds
    #[arg(long, env = "ChatMaxDelayMs", default_value = "30000")]
    pub chat_max_delay_ms: u64,

    /// Total retry wait budget per request in milliseconds
    #[arg(long, env = "ChatMaxElapsedMs", default_value = "120000")]
    pub chat_max_elapsed_ms: u64,
}

fn required(value: &Option<String>, name: &str, source: IdentitySource) -> Result<String, PipelineError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(PipelineError::configuration(format!(
            "{} is required for the {} identity source",
            name, source
        ))),
    }
}

impl TryFrom<&DeploymentArgs> for EvaluationConfig {
    type Error = PipelineError;

    fn try_from(args: &DeploymentArgs) -> Result<Self, Self::Error> {
        let source: IdentitySource = args.identity_source.parse()?;
        let federation = match source {
            IdentitySource::Cognito => FederationSettings::Cognito {
                identity_pool_id: required(&args.identity_pool_id, "IdentityPoolId", source)?,
                account_id: args.account_id.clone().filter(|a| !a.is_empty()),
            },
            IdentitySource::Idc => FederationSettings::Idc {
                application_arn: required(
                    &args.idc_application_arn,
                    "IdcAppTrustedIdentityPropagationArn",
                    source,
                )?,
            },
        };

        Ok(EvaluationConfig {
            region: args.region.clone(),
            application_id: args.application_id.clone(),
            user_pool_id: args.user_pool_id.clone(),
            client_id: args.client_id.clone(),
            role_arn: args.role_arn.clone(),
            user_secret_id: args.user_secret_id.clone(),
            fallback_username: args.user_email.clone().filter(|u| !u.is_empty()),
            federation,
            chat: ChatConfig {
                concurrency: args.chat_concurrency,
                retry: RetryConfig {
                    max_attempts: args.chat_max_attempts,
                    initial_delay_ms: args.chat_initial_delay_ms,
                    max_delay_ms: args.chat_max_delay_ms,
                    max_elapsed_ms: args.chat_max_elapsed_ms,
                    ..RetryConfig::default()
                },
            },
        })
    }
}

/// Scoring settings
#[derive(Args, Debug, Clone)]
pub struct ScoringArgs {
    /// Scoring service endpoint
    #[arg(long, env = "ScoringEndpoint")]
    pub scoring_endpoint: String,

    /// Bedrock embedding model
    #[arg(long, env = "BedrockEmbeddingModelId")]
    pub embedding_model_id: String,

    /// Bedrock text generation model
    #[arg(long, env = "BedrockTextModelId")]
    pub text_model_id: String,

    /// Metrics to compute
    #[arg(long = "metric", value_delimiter = ',', default_values_t = Metric::DEFAULTS.to_vec())]
    pub metrics: Vec<Metric>,

    /// Worker bound inside the scoring framework
    #[arg(long, env = "MaxWorkers", default_value = "2")]
    pub max_workers: usize,

    /// Scoring timeout in seconds
    #[arg(long, env = "ScoringTimeoutSecs", default_value = "180")]
    pub scoring_timeout: u64,

    /// Retries the framework may spend per model call
    #[arg(long, env = "ScoringMaxRetries", default_value = "10")]
    pub scoring_max_retries: u32,

    /// Longest wait between framework retries in seconds
    #[arg(long, env = "ScoringMaxWaitSecs", default_value = "60")]
    pub scoring_max_wait: u64,

    /// CloudWatch namespace for the emitted scores
    #[arg(long, env = "MetricsNamespace", default_value = DEFAULT_NAMESPACE)]
    pub metrics_namespace: String,
}

impl ScoringArgs {
    pub fn scoring_config(&self, region: &str) -> ScoringConfig {
        ScoringConfig {
            endpoint: self.scoring_endpoint.clone(),
            models: ModelConfig {
                region: region.to_string(),
                embedding_model_id: self.embedding_model_id.clone(),
                text_model_id: self.text_model_id.clone(),
            },
            run: RunConfig {
                max_workers: self.max_workers.max(1),
                timeout: self.scoring_timeout,
                max_retries: self.scoring_max_retries,
                max_wait: self.scoring_max_wait,
            },
            metrics_namespace: self.metrics_namespace.clone(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct EvaluateCommand {
    #[command(flatten)]
    pub deployment: DeploymentArgs,

    #[command(flatten)]
    pub scoring: ScoringArgs,

    /// Event file holding {"testset": [...]}, or - for stdin
    #[arg(long, default_value = "-")]
    pub event: String,
}

#[derive(Parser, Debug, Clone)]
pub struct AskCommand {
    #[command(flatten)]
    pub deployment: DeploymentArgs,

    /// Question to ask, repeat for several
    #[arg(short, long = "question", required = true)]
    pub questions: Vec<String>,
}
