use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const DEFAULT_EXPIRATION_HOURS: i64 = 24;

/// Bearer token claims issued by the identity provider. `sub` is the
/// provider's principal, not the internal user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(sub: impl Into<String>, email: Option<String>) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(DEFAULT_EXPIRATION_HOURS);

        Self {
            sub: sub.into(),
            email,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Issues a token for `claims`. Used by tests and local tooling; real
    /// tokens come from the identity provider.
    pub fn create_token(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let service = JwtService::new("secret");
        let claims = Claims::new("idp|123", Some("ada@example.com".to_string()));
        let token = service.create_token(&claims).unwrap();
        let decoded = service.verify_token(&token).unwrap();
        assert_eq!(decoded.sub, "idp|123");
        assert_eq!(decoded.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = JwtService::new("secret")
            .create_token(&Claims::new("idp|123", None))
            .unwrap();
        let err = JwtService::new("other").verify_token(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = JwtService::new("secret");
        let mut claims = Claims::new("idp|123", None);
        claims.iat -= 7200;
        claims.exp = Utc::now().timestamp() - 3600;
        let token = service.create_token(&claims).unwrap();
        assert!(service.verify_token(&token).is_err());
    }
}
