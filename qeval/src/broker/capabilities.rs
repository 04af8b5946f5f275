use async_trait::async_trait;

use super::tokens::ScopedCredential;
use crate::error::CallError;

/// Tokens returned by a successful password-grant authentication
#[derive(Clone, Default, PartialEq)]
pub struct AuthenticationResult {
    pub id_token: Option<String>,
    pub expires_in: Option<i32>,
}

/// User directory supporting password-grant authentication
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `None` when the directory answered without an authentication result
    async fn initiate_password_auth(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<AuthenticationResult>, CallError>;
}

/// Federation broker exchanging a directory token for an Identity Center token
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Returns the exchanged id token
    async fn exchange_token(
        &self,
        client_id: &str,
        grant_type: &str,
        assertion: &str,
    ) -> Result<Option<String>, CallError>;
}

/// Identity pool lookup of the identity id for a login
#[async_trait]
pub trait IdentityIdResolver: Send + Sync {
    async fn resolve_identity_id(
        &self,
        identity_pool_id: &str,
        account_id: Option<&str>,
        login_provider: &str,
        id_token: &str,
    ) -> Result<Option<String>, CallError>;
}

/// Identity pool issuance of an open-id token for an identity id
#[async_trait]
pub trait OpenIdTokenIssuer: Send + Sync {
    async fn issue_open_id_token(
        &self,
        identity_id: &str,
        login_provider: &str,
        id_token: &str,
    ) -> Result<Option<String>, CallError>;
}

/// Role assumption backed by a web identity token
#[async_trait]
pub trait WebIdentityRoleAssumer: Send + Sync {
    async fn assume_role_with_web_identity(
        &self,
        role_arn: &str,
        session_name: &str,
        web_identity_token: &str,
    ) -> Result<Option<ScopedCredential>, CallError>;
}

/// Role assumption backed by a provided context assertion
#[async_trait]
pub trait ContextRoleAssumer: Send + Sync {
    async fn assume_role_with_context(
        &self,
        role_arn: &str,
        session_name: &str,
        provider_arn: &str,
        context_assertion: &str,
    ) -> Result<Option<ScopedCredential>, CallError>;
}
