//! JWT token encoding and decoding using HS256.
//!
//! Tokens are issued elsewhere; this service only verifies them and reads
//! the tenant claims. `encode_jwt` exists for tooling and tests.

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user UUID
    pub sub: String,
    /// Owning company of the user; absent for platform administrators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Platform administrator (may act without a company)
    #[serde(default)]
    pub admin: bool,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Encode a JWT token for the given user.
pub fn encode_jwt(
    user_id: Uuid,
    company_id: Option<&str>,
    admin: bool,
    secret: &str,
    expiry_secs: u64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        company_id: company_id.map(str::to_string),
        admin,
        iat: now,
        exp: now + expiry_secs as i64,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to encode JWT")
}

/// Decode and validate a JWT token.
///
/// Returns the claims if the token is valid, not expired, and
/// signed with the correct secret.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data: TokenData<Claims> = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("Failed to decode JWT")?;

    Ok(token_data.claims)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-minimum-32-chars!!";

    #[test]
    fn test_encode_decode_tenant_claims() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, Some("company-a"), false, TEST_SECRET, 3600)
            .expect("encode should succeed");

        let claims = decode_jwt(&token, TEST_SECRET).expect("decode should succeed");
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.company_id.as_deref(), Some("company-a"));
        assert!(!claims.admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_admin_token_without_company() {
        let token = encode_jwt(Uuid::new_v4(), None, true, TEST_SECRET, 60).unwrap();
        let claims = decode_jwt(&token, TEST_SECRET).unwrap();
        assert!(claims.admin);
        assert!(claims.company_id.is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            company_id: Some("company-a".to_string()),
            admin: false,
            iat: now - 7200,
            exp: now - 3600,
        };

        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("encode should succeed");

        assert!(decode_jwt(&token, TEST_SECRET).is_err());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let token = encode_jwt(Uuid::new_v4(), None, false, TEST_SECRET, 3600).unwrap();
        assert!(decode_jwt(&token, "wrong-secret-that-is-also-32chars!").is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(decode_jwt("not.a.valid.jwt", TEST_SECRET).is_err());
        assert!(decode_jwt("", TEST_SECRET).is_err());
    }
}
