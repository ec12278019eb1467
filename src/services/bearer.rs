// Signed bearer credential for API auth.
// HS256 with a server-held secret; the payload binds the user id to the
// store-backed session token so revocation can be checked per request.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims carried by the bearer credential.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BearerClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Opaque store-backed session token
    pub session_token: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Clone)]
pub struct BearerTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime_hours: i64,
}

impl BearerTokenService {
    #[must_use]
    pub fn new(secret: &str, lifetime_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_hours,
        }
    }

    /// Mint a credential binding `{user_id, session_token}` with a fixed
    /// expiry window.
    pub fn issue(&self, user_id: i32, session_token: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.lifetime_hours);

        let claims = BearerClaims {
            sub: user_id.to_string(),
            session_token: session_token.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .context("Failed to encode bearer token")
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<BearerClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<BearerClaims>(token, &self.decoding_key, &validation)
            .context("Invalid bearer token")?;

        Ok(data.claims)
    }

    /// Signature-only decode: expiry is ignored. Used by logout, which still
    /// wants to revoke the session an expired token points at.
    #[must_use]
    pub fn decode_lenient(&self, token: &str) -> Option<BearerClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        decode::<BearerClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> BearerTokenService {
        BearerTokenService::new("test-secret-key-for-testing", 24)
    }

    #[test]
    fn test_issue_and_verify() {
        let svc = service();
        let token = svc.issue(7, "abc123").unwrap();
        assert!(!token.is_empty());

        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.session_token, "abc123");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let svc = service();
        assert!(svc.verify("not-a-token").is_err());
        assert!(svc.decode_lenient("not-a-token").is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let svc = service();
        let other = BearerTokenService::new("a-different-secret", 24);

        let token = svc.issue(7, "abc123").unwrap();
        assert!(other.verify(&token).is_err());
        assert!(other.decode_lenient(&token).is_none());
    }

    #[test]
    fn test_expired_token_fails_verify_but_decodes_leniently() {
        // Negative lifetime backdates the expiry.
        let svc = BearerTokenService::new("test-secret-key-for-testing", -1);
        let token = svc.issue(7, "abc123").unwrap();

        assert!(svc.verify(&token).is_err());

        let claims = svc.decode_lenient(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.session_token, "abc123");
    }
}
