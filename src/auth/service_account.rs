//! Service-account keys and JWT assertions

use super::AuthError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Contents of an `authorized_key.json` file
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Key id, sent as the JWT `kid`
    pub id: String,
    pub service_account_id: String,
    pub private_key: SecretString,
    #[serde(default)]
    pub key_algorithm: Option<String>,
}

impl ServiceAccountKey {
    /// Parse a key from its JSON form
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        serde_json::from_str(json).map_err(|e| AuthError::KeyLoad(e.to_string()))
    }

    /// Read a key file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AuthError::KeyLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

/// Produces the signed assertion exchanged for a bearer token
pub trait AssertionSigner: Send + Sync {
    fn sign(&self, audience: &str, lifetime: Duration) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// PS256 signer for service-account keys
pub struct ServiceAccountSigner {
    key_id: String,
    service_account_id: String,
    encoding_key: EncodingKey,
}

impl ServiceAccountSigner {
    /// Create a signer from a key; text before the PEM block is ignored
    pub fn new(key: &ServiceAccountKey) -> Result<Self, AuthError> {
        let raw = key.private_key.expose_secret();
        let pem = raw
            .find("-----BEGIN")
            .map(|start| &raw[start..])
            .ok_or_else(|| AuthError::KeyLoad("private_key has no PEM block".to_string()))?;

        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| AuthError::KeyLoad(e.to_string()))?;

        Ok(Self {
            key_id: key.id.clone(),
            service_account_id: key.service_account_id.clone(),
            encoding_key,
        })
    }
}

impl AssertionSigner for ServiceAccountSigner {
    fn sign(&self, audience: &str, lifetime: Duration) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: self.service_account_id.clone(),
            aud: audience.to_string(),
            iat: now,
            exp: now + lifetime.as_secs() as i64,
        };

        let mut header = Header::new(Algorithm::PS256);
        header.kid = Some(self.key_id.clone());

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    const KEY_JSON: &str = include_str!("../../tests/fixtures/authorized_key.json");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/service_account_public.pem");
    const AUDIENCE: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";

    #[test]
    fn test_key_parsing() {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        assert_eq!(key.id, "ajetestkeyid0000000");
        assert_eq!(key.service_account_id, "ajetestserviceacct00");
        assert_eq!(key.key_algorithm.as_deref(), Some("RSA_2048"));
    }

    #[test]
    fn test_signed_assertion_verifies() {
        let key = ServiceAccountKey::from_json(KEY_JSON).unwrap();
        let signer = ServiceAccountSigner::new(&key).unwrap();

        let jwt = signer.sign(AUDIENCE, Duration::from_secs(3600)).unwrap();

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::PS256);
        assert_eq!(header.kid.as_deref(), Some("ajetestkeyid0000000"));

        let mut validation = Validation::new(Algorithm::PS256);
        validation.set_audience(&[AUDIENCE]);
        let decoded = jsonwebtoken::decode::<Claims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims.iss, "ajetestserviceacct00");
        assert_eq!(decoded.claims.exp - decoded.claims.iat, 3600);
    }

    #[test]
    fn test_missing_pem_block_rejected() {
        let key = ServiceAccountKey {
            id: "k".to_string(),
            service_account_id: "sa".to_string(),
            private_key: SecretString::new("not a key".to_string()),
            key_algorithm: None,
        };
        assert!(matches!(ServiceAccountSigner::new(&key), Err(AuthError::KeyLoad(_))));
    }

    #[test]
    fn test_missing_key_file() {
        let result = ServiceAccountKey::from_file("/nonexistent/authorized_key.json");
        assert!(matches!(result, Err(AuthError::KeyLoad(_))));
    }
}
