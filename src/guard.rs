//! Request-time session check.
//!
//! Every protected request runs [`SessionGuard::check`] before its handler.
//! The credential's embedded permission snapshot is compared against the
//! stored record so a revoked capability stops working on the very next
//! request instead of at token expiry.

use tracing::{debug, info, warn};

use crate::permissions::PermissionSet;
use crate::store::{PermissionStore, StoreError};
use crate::token::{AuthError, TokenService};

/// Authenticated caller, with permissions read from the store this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: String,
    pub permissions: PermissionSet,
}

/// Why a request must re-authenticate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("no session credential")]
    NoCredential,
    #[error("invalid session credential: {0}")]
    Invalid(AuthError),
    #[error("account no longer exists")]
    UserMissing,
    #[error("permission store unavailable: {0}")]
    StoreUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Run the handler.
    Allow(Session),
    /// Permissions drifted: hand back a fresh credential, skip the handler.
    Rotate {
        token: String,
        permissions: PermissionSet,
    },
    /// Force re-authentication.
    Reject(RejectReason),
}

pub struct SessionGuard<'a> {
    tokens: &'a TokenService,
    store: &'a dyn PermissionStore,
}

impl<'a> SessionGuard<'a> {
    pub fn new(tokens: &'a TokenService, store: &'a dyn PermissionStore) -> Self {
        Self { tokens, store }
    }

    pub fn check(&self, credential: Option<&str>) -> GuardDecision {
        let token = match credential.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => {
                debug!("request without credential");
                return GuardDecision::Reject(RejectReason::NoCredential);
            }
        };

        let verified = match self.tokens.verify(token) {
            Ok(v) => v,
            Err(e) => {
                info!(error = %e, "rejecting credential");
                return GuardDecision::Reject(RejectReason::Invalid(e));
            }
        };

        let current = match self.store.get(&verified.subject) {
            Ok(p) => p,
            Err(StoreError::NotFound) => {
                info!(user = %verified.subject, "credential for deleted account");
                return GuardDecision::Reject(RejectReason::UserMissing);
            }
            Err(e) => {
                warn!(user = %verified.subject, error = %e, "permission lookup failed");
                return GuardDecision::Reject(RejectReason::StoreUnavailable(e.to_string()));
            }
        };

        if verified.permissions != current {
            info!(user = %verified.subject, "permissions changed, rotating credential");
            return match self.tokens.issue(&verified.subject, current) {
                Ok(token) => GuardDecision::Rotate {
                    token,
                    permissions: current,
                },
                Err(e) => GuardDecision::Reject(RejectReason::Invalid(e)),
            };
        }

        GuardDecision::Allow(Session {
            subject: verified.subject,
            permissions: current,
        })
    }
}
