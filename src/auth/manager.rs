//! Cached IAM credential with single-flight refresh

use super::service_account::AssertionSigner;
use super::AuthError;
use crate::config::AuthConfig;
use crate::metrics::METRICS;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Source of bearer tokens for provider calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid bearer token
    async fn get_token(&self) -> Result<SecretString, AuthError>;

    /// Forget the cached token, e.g. after the provider answered 401
    async fn invalidate(&self) {}
}

/// Short-lived bearer credential
#[derive(Debug, Clone)]
pub struct Credential {
    pub bearer_token: SecretString,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Valid for at least `margin` more
    pub fn is_fresh(&self, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() + margin < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IamTokenResponse {
    iam_token: SecretString,
    expires_at: DateTime<Utc>,
}

/// IAM token manager
pub struct AuthManager {
    http: Client,
    signer: Arc<dyn AssertionSigner>,
    iam_url: String,
    refresh_margin: Duration,
    jwt_lifetime: Duration,
    credential: RwLock<Option<Credential>>,
    refresh: Mutex<()>,
}

impl AuthManager {
    /// Create a new auth manager
    pub fn new(config: &AuthConfig, signer: Arc<dyn AssertionSigner>) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            http,
            signer,
            iam_url: config.iam_url.clone(),
            refresh_margin: config.refresh_margin(),
            jwt_lifetime: config.jwt_lifetime(),
            credential: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    /// Snapshot of the cached credential
    pub async fn credential(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    async fn cached_token(&self) -> Option<SecretString> {
        self.credential
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_fresh(self.refresh_margin))
            .map(|c| c.bearer_token.clone())
    }

    /// Sign an assertion and exchange it for a credential
    async fn issue(&self) -> Result<Credential, AuthError> {
        let result = self.exchange().await;
        METRICS.record_iam_exchange(result.is_ok());
        result
    }

    async fn exchange(&self) -> Result<Credential, AuthError> {
        let jwt = self.signer.sign(&self.iam_url, self.jwt_lifetime)?;

        let response = self
            .http
            .post(&self.iam_url)
            .json(&serde_json::json!({ "jwt": jwt }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: IamTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        Ok(Credential {
            bearer_token: parsed.iam_token,
            issued_at: Utc::now(),
            expires_at: parsed.expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for AuthManager {
    async fn get_token(&self) -> Result<SecretString, AuthError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _refreshing = self.refresh.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached_token().await {
            debug!("Using IAM token refreshed by a concurrent caller");
            return Ok(token);
        }

        let credential = match self.issue().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("IAM token exchange failed: {}", e);
                return Err(e);
            }
        };
        info!("Issued IAM token, expires at {}", credential.expires_at);

        let token = credential.bearer_token.clone();
        *self.credential.write().await = Some(credential);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.credential.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use mockito::Matcher;
    use secrecy::ExposeSecret;

    /// Signer returning a fixed assertion
    struct FixedSigner;

    impl AssertionSigner for FixedSigner {
        fn sign(&self, _audience: &str, _lifetime: Duration) -> Result<String, AuthError> {
            Ok("signed-assertion".to_string())
        }
    }

    fn manager(iam_url: String, refresh_margin_secs: u64) -> AuthManager {
        let config = AuthConfig {
            iam_url,
            refresh_margin_secs,
            ..AuthConfig::default()
        };
        AuthManager::new(&config, Arc::new(FixedSigner)).unwrap()
    }

    fn token_body(token: &str, expires_in: chrono::Duration) -> String {
        serde_json::json!({
            "iamToken": token,
            "expiresAt": (Utc::now() + expires_in).to_rfc3339(),
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_token_reused_within_validity_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/iam/v1/tokens")
            .match_body(Matcher::Json(serde_json::json!({"jwt": "signed-assertion"})))
            .with_status(200)
            .with_body(token_body("t1.abc", chrono::Duration::hours(12)))
            .expect(1)
            .create_async()
            .await;

        let auth = manager(format!("{}/iam/v1/tokens", server.url()), 300);
        let first = auth.get_token().await.unwrap();
        let second = auth.get_token().await.unwrap();

        assert_eq!(first.expose_secret(), "t1.abc");
        assert_eq!(second.expose_secret(), "t1.abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_reissued_inside_refresh_margin() {
        let mut server = mockito::Server::new_async().await;
        // Expires in 60s, margin is 300s: never fresh
        let mock = server
            .mock("POST", "/iam/v1/tokens")
            .with_status(200)
            .with_body(token_body("t-short", chrono::Duration::seconds(60)))
            .expect(2)
            .create_async()
            .await;

        let auth = manager(format!("{}/iam/v1/tokens", server.url()), 300);
        auth.get_token().await.unwrap();
        auth.get_token().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/iam/v1/tokens")
            .with_status(200)
            .with_body(token_body("shared", chrono::Duration::hours(12)))
            .expect(1)
            .create_async()
            .await;

        let auth = Arc::new(manager(format!("{}/iam/v1/tokens", server.url()), 300));
        let calls = (0..16).map(|_| {
            let auth = auth.clone();
            async move { auth.get_token().await }
        });
        let tokens = join_all(calls).await;

        assert!(tokens
            .iter()
            .all(|t| matches!(t, Ok(s) if s.expose_secret() == "shared")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_exchange() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/iam/v1/tokens")
            .with_status(200)
            .with_body(token_body("t", chrono::Duration::hours(12)))
            .expect(2)
            .create_async()
            .await;

        let auth = manager(format!("{}/iam/v1/tokens", server.url()), 300);
        auth.get_token().await.unwrap();
        auth.invalidate().await;
        assert!(auth.credential().await.is_none());
        auth.get_token().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_assertion() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/iam/v1/tokens")
            .with_status(401)
            .with_body(r#"{"message":"invalid jwt"}"#)
            .create_async()
            .await;

        let auth = manager(format!("{}/iam/v1/tokens", server.url()), 300);
        let result = auth.get_token().await;

        assert!(matches!(result, Err(AuthError::Rejected { status: 401, .. })));
        assert!(auth.credential().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_iam_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/iam/v1/tokens")
            .with_status(200)
            .with_body(r#"{"token":"missing fields"}"#)
            .create_async()
            .await;

        let auth = manager(format!("{}/iam/v1/tokens", server.url()), 300);
        assert!(matches!(auth.get_token().await, Err(AuthError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_iam_service() {
        let auth = manager("http://127.0.0.1:1/iam/v1/tokens".to_string(), 300);
        assert!(matches!(auth.get_token().await, Err(AuthError::Network(_))));
    }

    #[test]
    fn test_credential_freshness() {
        let credential = Credential {
            bearer_token: SecretString::new("t".to_string()),
            issued_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::minutes(10),
        };
        assert!(credential.is_fresh(Duration::from_secs(60)));
        assert!(!credential.is_fresh(Duration::from_secs(900)));
    }
}
