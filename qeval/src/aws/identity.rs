use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cognitoidentity::Client as CognitoIdentityClient;
use aws_sdk_cognitoidentityprovider::types::AuthFlowType;
use aws_sdk_cognitoidentityprovider::Client as CognitoIdpClient;
use aws_sdk_ssooidc::Client as SsoOidcClient;
use aws_sdk_sts::types::ProvidedContext;
use aws_sdk_sts::Client as StsClient;
use chrono::DateTime;
use tokio::sync::OnceCell;
use tracing::debug;

use super::call_error;
use crate::broker::{
    secret_hash, AuthenticationResult, ContextRoleAssumer, IdentityIdResolver, OpenIdTokenIssuer,
    ScopedCredential, TokenExchanger, UserDirectory, WebIdentityRoleAssumer,
};
use crate::error::CallError;

/// Cognito user pool app client
pub struct CognitoUserDirectory {
    client: CognitoIdpClient,
    user_pool_id: String,
    client_id: String,
    client_secret: OnceCell<Option<String>>,
}

impl CognitoUserDirectory {
    pub fn new(sdk_config: &SdkConfig, user_pool_id: &str, client_id: &str) -> Self {
        Self {
            client: CognitoIdpClient::new(sdk_config),
            user_pool_id: user_pool_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: OnceCell::new(),
        }
    }

    /// The app client's secret, if it has one. Looked up once.
    async fn client_secret(&self) -> Result<Option<&str>, CallError> {
        let secret = self
            .client_secret
            .get_or_try_init(|| async {
                let output = self
                    .client
                    .describe_user_pool_client()
                    .user_pool_id(&self.user_pool_id)
                    .client_id(&self.client_id)
                    .send()
                    .await
                    .map_err(|e| call_error("DescribeUserPoolClient", e))?;
                Ok::<_, CallError>(
                    output
                        .user_pool_client()
                        .and_then(|c| c.client_secret())
                        .map(str::to_string),
                )
            })
            .await?;
        Ok(secret.as_deref())
    }
}

#[async_trait]
impl UserDirectory for CognitoUserDirectory {
    async fn initiate_password_auth(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<AuthenticationResult>, CallError> {
        let mut request = self
            .client
            .initiate_auth()
            .client_id(&self.client_id)
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .auth_parameters("USERNAME", username)
            .auth_parameters("PASSWORD", password);

        if let Some(client_secret) = self.client_secret().await? {
            debug!("App client has a secret, adding SECRET_HASH");
            let hash = secret_hash(username, &self.client_id, client_secret)
                .map_err(|e| CallError::rejected("InitiateAuth", e))?;
            request = request.auth_parameters("SECRET_HASH", hash);
        }

        let output = request
            .send()
            .await
            .map_err(|e| call_error("InitiateAuth", e))?;

        Ok(output
            .authentication_result()
            .map(|result| AuthenticationResult {
                id_token: result.id_token().map(str::to_string),
                expires_in: result.expires_in().into(),
            }))
    }
}

/// Identity Center OIDC token exchange
pub struct IdcTokenExchanger {
    client: SsoOidcClient,
}

impl IdcTokenExchanger {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: SsoOidcClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl TokenExchanger for IdcTokenExchanger {
    async fn exchange_token(
        &self,
        client_id: &str,
        grant_type: &str,
        assertion: &str,
    ) -> Result<Option<String>, CallError> {
        let output = self
            .client
            .create_token_with_iam()
            .client_id(client_id)
            .grant_type(grant_type)
            .assertion(assertion)
            .send()
            .await
            .map_err(|e| call_error("CreateTokenWithIAM", e))?;

        Ok(output.id_token().map(str::to_string))
    }
}

/// Cognito identity pool, resolving identity ids and issuing open-id tokens
pub struct CognitoIdentityPool {
    client: CognitoIdentityClient,
}

impl CognitoIdentityPool {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: CognitoIdentityClient::new(sdk_config),
        }
    }
}

#[async_trait]
impl IdentityIdResolver for CognitoIdentityPool {
    async fn resolve_identity_id(
        &self,
        identity_pool_id: &str,
        account_id: Option<&str>,
        login_provider: &str,
        id_token: &str,
    ) -> Result<Option<String>, CallError> {
        let output = self
            .client
            .get_id()
            .set_account_id(account_id.map(str::to_string))
            .identity_pool_id(identity_pool_id)
            .logins(login_provider, id_token)
            .send()
            .await
            .map_err(|e| call_error("GetId", e))?;

        Ok(output.identity_id().map(str::to_string))
    }
}

#[async_trait]
impl OpenIdTokenIssuer for CognitoIdentityPool {
    async fn issue_open_id_token(
        &self,
        identity_id: &str,
        login_provider: &str,
        id_token: &str,
    ) -> Result<Option<String>, CallError> {
        let output = self
            .client
            .get_open_id_token()
            .identity_id(identity_id)
            .logins(login_provider, id_token)
            .send()
            .await
            .map_err(|e| call_error("GetOpenIdToken", e))?;

        Ok(output.token().map(str::to_string))
    }
}

/// STS role assumption for both federation paths
pub struct StsRoleAssumer {
    client: StsClient,
}

impl StsRoleAssumer {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: StsClient::new(sdk_config),
        }
    }
}

fn scoped_credential(credentials: Option<&aws_sdk_sts::types::Credentials>) -> Option<ScopedCredential> {
    credentials.map(|c| {
        ScopedCredential::new(
            c.access_key_id(),
            c.secret_access_key(),
            c.session_token(),
            DateTime::from_timestamp(c.expiration().secs(), 0),
        )
    })
}

#[async_trait]
impl WebIdentityRoleAssumer for StsRoleAssumer {
    async fn assume_role_with_web_identity(
        &self,
        role_arn: &str,
        session_name: &str,
        web_identity_token: &str,
    ) -> Result<Option<ScopedCredential>, CallError> {
        let output = self
            .client
            .assume_role_with_web_identity()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .web_identity_token(web_identity_token)
            .send()
            .await
            .map_err(|e| call_error("AssumeRoleWithWebIdentity", e))?;

        Ok(scoped_credential(output.credentials()))
    }
}

#[async_trait]
impl ContextRoleAssumer for StsRoleAssumer {
    async fn assume_role_with_context(
        &self,
        role_arn: &str,
        session_name: &str,
        provider_arn: &str,
        context_assertion: &str,
    ) -> Result<Option<ScopedCredential>, CallError> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .provided_contexts(
                ProvidedContext::builder()
                    .provider_arn(provider_arn)
                    .context_assertion(context_assertion)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| call_error("AssumeRole", e))?;

        Ok(scoped_credential(output.credentials()))
    }
}
