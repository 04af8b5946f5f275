//! AWS SDK implementations of the collaborator traits.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

use crate::broker::FederationPath;
use crate::common::{EvaluationConfig, FederationSettings};
use crate::error::CallError;
use crate::pipeline::Collaborators;

pub mod chat;
pub mod identity;
pub mod secrets;

pub use chat::QBusinessChatFactory;
pub use identity::{CognitoIdentityPool, CognitoUserDirectory, IdcTokenExchanger, StsRoleAssumer};
pub use secrets::SecretsManagerStore;

/// Error codes worth another attempt
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ProvisionedThroughputExceededException",
    "InternalServerException",
    "InternalServerError",
    "InternalFailure",
    "InternalErrorException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "RequestTimeout",
    "RequestTimeoutException",
];

pub fn is_transient_code(code: Option<&str>) -> bool {
    code.map(|c| TRANSIENT_CODES.contains(&c)).unwrap_or(false)
}

/// Translate an SDK failure into a `CallError`, marking what may be retried.
pub fn call_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> CallError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(_) => is_transient_code(code.as_deref()),
        _ => false,
    };
    let message = DisplayErrorContext(err).to_string();

    let error = if transient {
        CallError::transient(operation, message)
    } else {
        CallError::rejected(operation, message)
    };
    match code {
        Some(code) => error.with_code(code),
        None => error,
    }
}

/// Shared SDK configuration for the deployment region, using ambient credentials.
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Build the collaborators for `config`. Only the configured federation
/// path's clients are created.
pub async fn collaborators(config: &EvaluationConfig) -> Collaborators {
    let sdk_config = load_sdk_config(&config.region).await;
    info!(
        "Using {} federation in {}",
        config.identity_source(),
        config.region
    );

    let federation = match &config.federation {
        FederationSettings::Idc { application_arn } => {
            FederationPath::Idc {
                exchanger: Arc::new(IdcTokenExchanger::new(&sdk_config)),
                assumer: Arc::new(StsRoleAssumer::new(&sdk_config)),
                application_arn: application_arn.clone(),
            }
        }
        FederationSettings::Cognito {
            identity_pool_id,
            account_id,
        } => {
            let pool = Arc::new(CognitoIdentityPool::new(&sdk_config));
            FederationPath::Cognito {
                resolver: pool.clone(),
                issuer: pool,
                assumer: Arc::new(StsRoleAssumer::new(&sdk_config)),
                identity_pool_id: identity_pool_id.clone(),
                account_id: account_id.clone(),
                login_provider: config.login_provider(),
            }
        }
    };

    Collaborators {
        secrets: Arc::new(SecretsManagerStore::new(&sdk_config)),
        directory: Arc::new(CognitoUserDirectory::new(
            &sdk_config,
            &config.user_pool_id,
            &config.client_id,
        )),
        federation,
        chat_factory: Arc::new(QBusinessChatFactory::new(&config.region)),
    }
}
