use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::models::Principal;

/// Issues and verifies the HS256 bearer tokens shared with the account service.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

/// Token payload: `{ user: { id, role }, iat, exp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user: Principal,
    pub iat: i64,
    pub exp: i64,
}

impl TokenService {
    pub fn new(secret: &Secret<String>, expiry_hours: i64) -> Self {
        let key = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            expiry_hours,
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = TokenClaims {
            user: principal.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expiry_hours)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Principal, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            ServiceError::Unauthorized("Invalid or expired token".to_string())
        })?;

        Ok(data.claims.user)
    }
}
