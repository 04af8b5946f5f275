use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tracing::{error, info};

use crate::error::{CallError, PipelineError, PipelineResult};

/// Read access to a secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the raw secret string for `secret_id`
    async fn get_secret_string(&self, secret_id: &str) -> Result<Option<String>, CallError>;
}

/// Fetch a structured secret and decode it into a string map.
pub async fn get_secret(
    store: &dyn SecretStore,
    secret_id: &str,
) -> PipelineResult<HashMap<String, String>> {
    info!("Getting secret from secret {}", secret_id);

    let raw = store.get_secret_string(secret_id).await.map_err(|e| {
        error!("Failed to get secret {}: {}", secret_id, e);
        PipelineError::secret_access(format!("failed to read secret {}", secret_id)).with_source(e)
    })?;

    let raw = raw.ok_or_else(|| {
        PipelineError::secret_access(format!("secret {} has no string value", secret_id))
    })?;

    serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|e| {
        PipelineError::secret_access(format!(
            "secret {} is not a JSON object of strings",
            secret_id
        ))
        .with_source(e)
    })
}

/// Username and password of the evaluation user.
#[derive(Clone)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolve the evaluation user's credentials from the secret store.
///
/// The secret must hold a `password`; the username comes from the secret's
/// `username` key, or from `fallback_username` when the secret has none.
pub async fn resolve_user_credentials(
    store: &dyn SecretStore,
    secret_id: &str,
    fallback_username: Option<&str>,
) -> PipelineResult<UserCredentials> {
    let mut secret = get_secret(store, secret_id).await?;

    let password = secret
        .remove("password")
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            PipelineError::secret_access("No 'password' key found in secret value")
        })?;

    let username = secret
        .remove("username")
        .filter(|u| !u.is_empty())
        .or_else(|| fallback_username.map(str::to_string))
        .ok_or_else(|| {
            PipelineError::secret_access(
                "No 'username' key found in secret value and no user name configured",
            )
        })?;

    Ok(UserCredentials { username, password })
}
