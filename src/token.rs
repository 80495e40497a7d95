//! Session credentials: HS256 JWTs carrying a permission snapshot.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::permissions::PermissionSet;

/// Fixed credential lifetime, in seconds.
pub const TOKEN_TTL_SECS: i64 = 3600;

fn ttl() -> Duration {
    Duration::seconds(TOKEN_TTL_SECS)
}

/// Errors from credential verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("session credential expired")]
    Expired,
    #[error("malformed session credential: {0}")]
    Malformed(String),
    #[error("no session credential")]
    NoCredential,
}

/// JWT claims for a session credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Username of the holder.
    pub user: String,
    pub permissions: PermissionSet,
    pub iat: i64,
    pub exp: i64,
}

/// What a successfully verified credential carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    pub subject: String,
    pub permissions: PermissionSet,
}

/// Issues and verifies session credentials with a process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a credential valid for [`TOKEN_TTL_SECS`] from now.
    pub fn issue(&self, subject: &str, permissions: PermissionSet) -> Result<String, AuthError> {
        self.issue_at(subject, permissions, Utc::now())
    }

    /// Issue a credential as if it had been minted at `issued_at`.
    pub fn issue_at(
        &self,
        subject: &str,
        permissions: PermissionSet,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = SessionClaims {
            user: subject.to_string(),
            permissions,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl()).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Malformed(e.to_string()))
    }

    /// Verify signature and expiry, returning the embedded subject and snapshot.
    pub fn verify(&self, token: &str) -> Result<VerifiedSession, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed(e.to_string()),
            }
        })?;

        Ok(VerifiedSession {
            subject: data.claims.user,
            permissions: data.claims.permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> TokenService {
        TokenService::new(b"test-secret-key")
    }

    fn shutdown_only() -> PermissionSet {
        PermissionSet {
            shutdown: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let svc = service();
        let token = svc.issue("alice", shutdown_only()).unwrap();
        let session = svc.verify(&token).unwrap();
        assert_eq!(session.subject, "alice");
        assert_eq!(session.permissions, shutdown_only());
    }

    #[test]
    fn test_expired_after_ttl() {
        let svc = service();
        let issued = Utc::now() - ttl() - Duration::seconds(5);
        let token = svc.issue_at("alice", shutdown_only(), issued).unwrap();
        assert_eq!(svc.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_still_valid_just_before_ttl() {
        let svc = service();
        let issued = Utc::now() - ttl() + Duration::seconds(60);
        let token = svc.issue_at("alice", shutdown_only(), issued).unwrap();
        assert!(svc.verify(&token).is_ok());
    }

    #[test]
    fn test_expiry_is_issued_plus_ttl() {
        let svc = service();
        let issued = Utc::now();
        let token = svc.issue_at("bob", PermissionSet::default(), issued).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        let claims = decode::<SessionClaims>(&token, &DecodingKey::from_secret(b""), &validation)
            .unwrap()
            .claims;
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn test_wrong_secret_is_malformed() {
        let token = TokenService::new(b"secret-1")
            .issue("alice", shutdown_only())
            .unwrap();
        match TokenService::new(b"secret-2").verify(&token) {
            Err(AuthError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        match service().verify("not-a-jwt") {
            Err(AuthError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_of_other_shape_is_malformed() {
        let secret = b"test-secret-key";
        let now = Utc::now().timestamp();
        let claims = json!({
            "user": "alice",
            "permissions": { "shutdown": true },
            "iat": now,
            "exp": now + 3600,
        });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        match TokenService::new(secret).verify(&token) {
            Err(AuthError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }
}
