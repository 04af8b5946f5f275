use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::fmt;

/// Provider ARN tagging an Identity Center context assertion.
pub const IDC_CONTEXT_PROVIDER_ARN: &str = "arn:aws:iam::aws:contextProvider/IdentityCenter";

/// Claim carrying the identity context in the token-exchange id token.
pub const IDENTITY_CONTEXT_CLAIM: &str = "sts:identity_context";

/// Grant type used for the Identity Center token exchange.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const SESSION_NAME_SUFFIX: &str = "OIDC";
const MAX_SESSION_NAME_LEN: usize = 64;

/// ID token obtained from the user directory
#[derive(Clone, PartialEq)]
pub struct PrimaryIdentityToken(String);

impl PrimaryIdentityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrimaryIdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimaryIdentityToken(<{} bytes>)", self.0.len())
    }
}

/// Intermediate assertion produced by the federation hop
#[derive(Clone, PartialEq)]
pub enum FederatedAssertion {
    /// Identity Center path: context claim plus the provider that vouches for it
    IdentityContext {
        context: String,
        provider_arn: String,
    },
    /// Cognito path: identity pool open-id token, used as a web identity
    OpenIdToken(String),
}

impl fmt::Debug for FederatedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityContext { provider_arn, .. } => f
                .debug_struct("IdentityContext")
                .field("context", &"<redacted>")
                .field("provider_arn", provider_arn)
                .finish(),
            Self::OpenIdToken(_) => f.debug_tuple("OpenIdToken").field(&"<redacted>").finish(),
        }
    }
}

/// Temporary credential triple returned by the final hop.
#[derive(Clone, PartialEq)]
pub struct ScopedCredential {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: Option<DateTime<Utc>>,
}

impl ScopedCredential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiration,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// Convert into SDK credentials, consuming the triple.
    pub fn into_sdk_credentials(self) -> aws_credential_types::Credentials {
        aws_credential_types::Credentials::new(
            self.access_key_id,
            self.secret_access_key,
            Some(self.session_token),
            self.expiration.map(Into::into),
            "qeval-federation",
        )
    }
}

impl fmt::Debug for ScopedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Read the claims of a JWT WITHOUT verifying its signature.
///
/// The receiving service validates the assertion; this is the only place
/// claims are read locally, so real verification would be added here.
pub fn decode_unverified_claims(token: &str) -> Result<Map<String, Value>, String> {
    jsonwebtoken::dangerous::insecure_decode::<Map<String, Value>>(token)
        .map(|data| data.claims)
        .map_err(|e| format!("token is not a readable JWT: {}", e))
}

/// `SECRET_HASH` for user pool clients that carry a client secret:
/// base64(HMAC-SHA256(client_secret, username + client_id)).
pub fn secret_hash(username: &str, client_id: &str, client_secret: &str) -> Result<String, String> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| format!("invalid client secret: {}", e))?;
    mac.update(username.as_bytes());
    mac.update(client_id.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Role session name derived from the username.
pub fn session_name(username: &str) -> String {
    let mut name: String = username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "_+=,.@-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect();
    name.push_str(SESSION_NAME_SUFFIX);
    name.truncate(MAX_SESSION_NAME_LEN);
    name
}
