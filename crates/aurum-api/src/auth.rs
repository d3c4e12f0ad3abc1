use std::time::Duration;

use aurum_types::Role;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Resolves bearer tokens into users. Credentials are checked here only,
/// nothing downstream re-validates them.
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;
}

#[derive(Debug, Default, Deserialize)]
struct ProviderMetadata {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    app_metadata: ProviderMetadata,
}

impl From<ProviderUser> for AuthUser {
    fn from(user: ProviderUser) -> Self {
        let role = user
            .app_metadata
            .role
            .as_deref()
            .and_then(|role| role.parse().ok())
            .unwrap_or_default();
        Self { id: user.id, role }
    }
}

/// Verifier calling the hosted auth provider's user endpoint.
pub struct HttpIdentityVerifier {
    http_client: Client,
    user_endpoint: Url,
    api_key: String,
}

impl HttpIdentityVerifier {
    pub fn new(base_url: &Url, api_key: String) -> anyhow::Result<Self> {
        let http_client = Client::builder().timeout(PROVIDER_TIMEOUT).build()?;
        let user_endpoint = base_url.join("auth/v1/user")?;

        Ok(Self {
            http_client,
            user_endpoint,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .http_client
            .get(self.user_endpoint.clone())
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user = response
                    .json::<ProviderUser>()
                    .await
                    .map_err(|e| AuthError::Provider(e.to_string()))?;
                Ok(user.into())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidToken),
            status => Err(AuthError::Provider(format!(
                "unexpected status {status} from identity provider"
            ))),
        }
    }
}
