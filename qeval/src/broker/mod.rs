//! Identity federation chain.
//!
//! Three hops, each consuming the previous hop's output:
//! authenticate against the user directory, federate the resulting ID token
//! (Identity Center token exchange or Cognito identity pool), then assume the
//! target role with the federated assertion. The federation path is fixed
//! when the broker is built and cannot change mid-chain.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::common::IdentitySource;
use crate::error::{PipelineError, PipelineResult};
use crate::secrets::UserCredentials;

pub mod capabilities;
pub mod tokens;

pub use capabilities::*;
pub use tokens::*;

/// Where the chain currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainState {
    Unauthenticated,
    HasPrimaryToken,
    HasFederatedAssertion,
    HasScopedCredential,
    Failed(String),
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "UNAUTHENTICATED"),
            Self::HasPrimaryToken => write!(f, "HAS_PRIMARY_TOKEN"),
            Self::HasFederatedAssertion => write!(f, "HAS_FEDERATED_ASSERTION"),
            Self::HasScopedCredential => write!(f, "HAS_SCOPED_CREDENTIAL"),
            Self::Failed(reason) => write!(f, "FAILED({})", reason),
        }
    }
}

/// The federation path with only the collaborators that path needs.
pub enum FederationPath {
    Idc {
        exchanger: Arc<dyn TokenExchanger>,
        assumer: Arc<dyn ContextRoleAssumer>,
        /// Identity Center application used as the exchange client id
        application_arn: String,
    },
    Cognito {
        resolver: Arc<dyn IdentityIdResolver>,
        issuer: Arc<dyn OpenIdTokenIssuer>,
        assumer: Arc<dyn WebIdentityRoleAssumer>,
        identity_pool_id: String,
        account_id: Option<String>,
        /// `cognito-idp.<region>.amazonaws.com/<user pool id>`
        login_provider: String,
    },
}

impl FederationPath {
    pub fn identity_source(&self) -> IdentitySource {
        match self {
            Self::Idc { .. } => IdentitySource::Idc,
            Self::Cognito { .. } => IdentitySource::Cognito,
        }
    }
}

/// Single-use broker that walks the chain for one invocation.
pub struct CredentialBroker {
    directory: Arc<dyn UserDirectory>,
    path: FederationPath,
    role_arn: String,
    state: ChainState,
}

impl CredentialBroker {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        path: FederationPath,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            path,
            role_arn: role_arn.into(),
            state: ChainState::Unauthenticated,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn identity_source(&self) -> IdentitySource {
        self.path.identity_source()
    }

    /// Run all three hops and return the scoped credential.
    #[instrument(skip_all, fields(identity_source = %self.identity_source(), username = %credentials.username))]
    pub async fn obtain_credentials(
        &mut self,
        credentials: &UserCredentials,
    ) -> PipelineResult<ScopedCredential> {
        let token = self.authenticate(credentials).await?;
        let assertion = self.federate(&token).await?;
        self.assume_role(&credentials.username, &assertion).await
    }

    /// Hop 1: password-grant authentication against the user directory.
    pub async fn authenticate(
        &mut self,
        credentials: &UserCredentials,
    ) -> PipelineResult<PrimaryIdentityToken> {
        self.expect_state(ChainState::Unauthenticated, |m| PipelineError::authentication(m))?;
        info!("Started signing-in user {}", credentials.username);

        let result = self
            .directory
            .initiate_password_auth(&credentials.username, &credentials.password)
            .await
            .map_err(|e| {
                PipelineError::authentication(format!(
                    "failed to sign in user {}",
                    credentials.username
                ))
                .with_source(e)
            });

        let token = result.and_then(|auth| {
            auth.and_then(|a| {
                debug!(expires_in = ?a.expires_in, "Received authentication result");
                a.id_token
            })
            .filter(|t| !t.is_empty())
            .map(PrimaryIdentityToken::new)
            .ok_or_else(|| PipelineError::authentication("authentication result has no IdToken"))
        });

        self.advance(token, ChainState::HasPrimaryToken)
    }

    /// Hop 2: turn the primary token into a federated assertion.
    pub async fn federate(
        &mut self,
        token: &PrimaryIdentityToken,
    ) -> PipelineResult<FederatedAssertion> {
        self.expect_state(ChainState::HasPrimaryToken, |m| PipelineError::federation(m))?;

        let assertion = match &self.path {
            FederationPath::Idc {
                exchanger,
                application_arn,
                ..
            } => federate_idc(exchanger.as_ref(), application_arn, token).await,
            FederationPath::Cognito {
                resolver,
                issuer,
                identity_pool_id,
                account_id,
                login_provider,
                ..
            } => {
                federate_cognito(
                    resolver.as_ref(),
                    issuer.as_ref(),
                    identity_pool_id,
                    account_id.as_deref(),
                    login_provider,
                    token,
                )
                .await
            }
        };

        self.advance(assertion, ChainState::HasFederatedAssertion)
    }

    /// Hop 3: assume the target role with the federated assertion.
    pub async fn assume_role(
        &mut self,
        username: &str,
        assertion: &FederatedAssertion,
    ) -> PipelineResult<ScopedCredential> {
        self.expect_state(ChainState::HasFederatedAssertion, |m| {
            PipelineError::role_assumption(m)
        })?;
        let session = session_name(username);

        let response = match (&self.path, assertion) {
            (
                FederationPath::Idc { assumer, .. },
                FederatedAssertion::IdentityContext {
                    context,
                    provider_arn,
                },
            ) => {
                info!("Assuming role {} with context assertion", self.role_arn);
                assumer
                    .assume_role_with_context(&self.role_arn, &session, provider_arn, context)
                    .await
            }
            (FederationPath::Cognito { assumer, .. }, FederatedAssertion::OpenIdToken(token)) => {
                info!("Assuming role {} with web identity", self.role_arn);
                assumer
                    .assume_role_with_web_identity(&self.role_arn, &session, token)
                    .await
            }
            _ => {
                let err = PipelineError::role_assumption(format!(
                    "assertion does not belong to the {} federation path",
                    self.identity_source()
                ));
                return self.advance(Err(err), ChainState::HasScopedCredential);
            }
        };

        let credential = response
            .map_err(|e| {
                PipelineError::role_assumption(format!("failed to assume role {}", self.role_arn))
                    .with_source(e)
            })
            .and_then(|c| {
                c.ok_or_else(|| {
                    PipelineError::role_assumption("role assumption returned no credentials")
                })
            });

        let credential = self.advance(credential, ChainState::HasScopedCredential)?;
        info!(
            access_key_id = %credential.access_key_id(),
            expiration = ?credential.expiration(),
            "Obtained scoped credentials"
        );
        Ok(credential)
    }

    fn expect_state(
        &self,
        expected: ChainState,
        error: fn(String) -> PipelineError,
    ) -> PipelineResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(error(format!(
                "credential chain is in state {}, expected {}",
                self.state, expected
            )))
        }
    }

    fn advance<T>(&mut self, result: PipelineResult<T>, next: ChainState) -> PipelineResult<T> {
        match result {
            Ok(value) => {
                debug!("Credential chain {} -> {}", self.state, next);
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                error!(stage = e.stage(), "Credential chain failed: {}", e);
                self.state = ChainState::Failed(e.to_string());
                Err(e)
            }
        }
    }
}

async fn federate_idc(
    exchanger: &dyn TokenExchanger,
    application_arn: &str,
    token: &PrimaryIdentityToken,
) -> PipelineResult<FederatedAssertion> {
    info!("Exchanging token with Identity Center");
    let id_token = exchanger
        .exchange_token(application_arn, JWT_BEARER_GRANT_TYPE, token.as_str())
        .await
        .map_err(|e| PipelineError::federation("failed to create token").with_source(e))?
        .ok_or_else(|| PipelineError::federation("token exchange returned no idToken"))?;

    let claims = decode_unverified_claims(&id_token).map_err(|e| {
        PipelineError::federation(format!("exchanged idToken could not be decoded: {}", e))
    })?;

    let context = claims
        .get(IDENTITY_CONTEXT_CLAIM)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            PipelineError::federation(format!(
                "exchanged idToken has no {} claim",
                IDENTITY_CONTEXT_CLAIM
            ))
        })?;

    Ok(FederatedAssertion::IdentityContext {
        context: context.to_string(),
        provider_arn: IDC_CONTEXT_PROVIDER_ARN.to_string(),
    })
}

async fn federate_cognito(
    resolver: &dyn IdentityIdResolver,
    issuer: &dyn OpenIdTokenIssuer,
    identity_pool_id: &str,
    account_id: Option<&str>,
    login_provider: &str,
    token: &PrimaryIdentityToken,
) -> PipelineResult<FederatedAssertion> {
    info!("Getting identity id for identity pool {}", identity_pool_id);
    let identity_id = resolver
        .resolve_identity_id(identity_pool_id, account_id, login_provider, token.as_str())
        .await
        .map_err(|e| PipelineError::federation("failed to get identity id").with_source(e))?
        .ok_or_else(|| PipelineError::federation("identity pool returned no IdentityId"))?;

    info!("Getting open id token for identity pool {}", identity_pool_id);
    let open_id = issuer
        .issue_open_id_token(&identity_id, login_provider, token.as_str())
        .await
        .map_err(|e| PipelineError::federation("failed to get open id token").with_source(e))?
        .ok_or_else(|| PipelineError::federation("identity pool returned no open id Token"))?;

    Ok(FederatedAssertion::OpenIdToken(open_id))
}
