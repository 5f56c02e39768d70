//! Token service: issues and verifies the two token kinds.
//!
//! Access and refresh tokens are HS256 JWTs signed with distinct
//! secrets and carrying a `kind` claim; verification yields a sum type
//! so callers can distinguish expiry (client should refresh) from
//! everything else.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use vidhub_core::config::AuthConfig;
use vidhub_core::models::{User, UserRole};

const KIND_ACCESS: &str = "access";
const KIND_REFRESH: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Tenant: the user's organization id.
    pub org: Uuid,
    pub role: UserRole,
    pub kind: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub kind: String,
    pub iat: i64,
    pub exp: i64,
}

/// Outcome of verifying a token. Claims are only produced after the
/// signature checked out.
#[derive(Debug)]
pub enum TokenVerification<C> {
    Valid(C),
    Expired,
    Malformed,
    BadSignature,
    WrongKind,
}

#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

fn classify_error<C>(err: jsonwebtoken::errors::Error) -> TokenVerification<C> {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenVerification::Expired,
        ErrorKind::InvalidSignature => TokenVerification::BadSignature,
        _ => TokenVerification::Malformed,
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    pub fn issue_access(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id,
            org: user.organization_id,
            role: user.role,
            kind: KIND_ACCESS.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.access_encoding)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id,
            kind: KIND_REFRESH.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.refresh_encoding)
    }

    pub fn verify_access(&self, token: &str) -> TokenVerification<AccessClaims> {
        match decode::<AccessClaims>(token, &self.access_decoding, &strict_validation()) {
            Ok(data) if data.claims.kind == KIND_ACCESS => TokenVerification::Valid(data.claims),
            Ok(_) => TokenVerification::WrongKind,
            Err(e) => classify_error(e),
        }
    }

    pub fn verify_refresh(&self, token: &str) -> TokenVerification<RefreshClaims> {
        match decode::<RefreshClaims>(token, &self.refresh_decoding, &strict_validation()) {
            Ok(data) if data.claims.kind == KIND_REFRESH => TokenVerification::Valid(data.claims),
            Ok(_) => TokenVerification::WrongKind,
            Err(e) => classify_error(e),
        }
    }

    /// Digest stored in the user's one-slot refresh column; the raw
    /// token never touches the database.
    pub fn refresh_digest(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            access_token_secret: "access-secret-0123456789abcdef0123".to_string(),
            refresh_token_secret: "refresh-secret-0123456789abcdef012".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            bcrypt_cost: 4,
        }
    }

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@x.io".to_string(),
            password_hash: String::new(),
            name: "A".to_string(),
            role: UserRole::Admin,
            organization_id: Uuid::new_v4(),
            active: true,
            last_login_at: None,
            refresh_token_current: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let service = TokenService::new(&auth_config());
        let user = test_user();
        let token = service.issue_access(&user).unwrap();

        match service.verify_access(&token) {
            TokenVerification::Valid(claims) => {
                assert_eq!(claims.sub, user.id);
                assert_eq!(claims.org, user.organization_id);
                assert_eq!(claims.role, UserRole::Admin);
            }
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[test]
    fn refresh_token_round_trips() {
        let service = TokenService::new(&auth_config());
        let user_id = Uuid::new_v4();
        let token = service.issue_refresh(user_id).unwrap();

        match service.verify_refresh(&token) {
            TokenVerification::Valid(claims) => assert_eq!(claims.sub, user_id),
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        // the two kinds use different secrets, so cross-verification
        // dies at the signature check
        let service = TokenService::new(&auth_config());
        let user = test_user();

        let access = service.issue_access(&user).unwrap();
        assert!(matches!(
            service.verify_refresh(&access),
            TokenVerification::BadSignature | TokenVerification::Malformed
        ));

        let refresh = service.issue_refresh(user.id).unwrap();
        assert!(matches!(
            service.verify_access(&refresh),
            TokenVerification::BadSignature | TokenVerification::Malformed
        ));
    }

    #[test]
    fn kind_claim_is_enforced_even_with_the_right_secret() {
        let config = auth_config();
        let service = TokenService::new(&config);

        // forge a token signed with the access secret but claiming to
        // be a refresh token
        let now = Utc::now();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            role: UserRole::Viewer,
            kind: "refresh".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(5)).timestamp(),
        };
        let forged = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            service.verify_access(&forged),
            TokenVerification::WrongKind
        ));
    }

    #[test]
    fn expired_token_reports_expired() {
        let config = auth_config();
        let service = TokenService::new(&config);

        let now = Utc::now();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            org: Uuid::new_v4(),
            role: UserRole::Editor,
            kind: "access".to_string(),
            iat: (now - Duration::minutes(30)).timestamp(),
            exp: (now - Duration::minutes(15)).timestamp(),
        };
        let expired = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.access_token_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            service.verify_access(&expired),
            TokenVerification::Expired
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let service = TokenService::new(&auth_config());
        assert!(matches!(
            service.verify_access("not-a-jwt"),
            TokenVerification::Malformed
        ));
        assert!(matches!(
            service.verify_access(""),
            TokenVerification::Malformed
        ));
    }

    #[test]
    fn tampered_token_fails_signature() {
        let service = TokenService::new(&auth_config());
        let user = test_user();
        let token = service.issue_access(&user).unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

        assert!(matches!(
            service.verify_access(&tampered),
            TokenVerification::BadSignature | TokenVerification::Malformed
        ));
    }

    #[test]
    fn refresh_digest_is_stable_and_opaque() {
        let digest_a = TokenService::refresh_digest("token-one");
        let digest_b = TokenService::refresh_digest("token-one");
        let digest_c = TokenService::refresh_digest("token-two");
        assert_eq!(digest_a, digest_b);
        assert_ne!(digest_a, digest_c);
        assert_eq!(digest_a.len(), 64);
    }
}
