//! Panel operations behind the HTTP surface.
//!
//! Every protected operation takes the [`Session`] produced by the guard and
//! re-checks the capability it needs against the freshly read permissions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::actions::{
    Action, ActionDispatcher, ActionOutput, CommandExecutor, CommandRegistry, MetricsReport,
    Platform, VolumeStatus,
};
use crate::error::ControlError;
use crate::guard::{GuardDecision, Session, SessionGuard};
use crate::password::{hash_password, verify_password};
use crate::permissions::{Capability, PermissionSet};
use crate::store::{AccountSummary, OverrideStore, PermissionStore, StoreError};
use crate::token::TokenService;

/// Credential handed out at login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginGrant {
    pub token: String,
    pub username: String,
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub user: String,
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionUpdate {
    pub permissions: PermissionSet,
    /// Set when the caller changed their own account.
    #[serde(skip)]
    pub rotated_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deletion {
    /// The caller deleted their own account; their credential is void.
    pub self_deleted: bool,
}

pub struct ControlPanel {
    tokens: TokenService,
    accounts: Arc<dyn PermissionStore>,
    dispatcher: ActionDispatcher,
}

fn require(session: &Session, cap: Capability) -> Result<(), ControlError> {
    if session.permissions.allows(cap) {
        Ok(())
    } else {
        Err(ControlError::Forbidden(cap))
    }
}

impl ControlPanel {
    pub fn new(
        tokens: TokenService,
        accounts: Arc<dyn PermissionStore>,
        overrides: Arc<dyn OverrideStore>,
        executor: Arc<dyn CommandExecutor>,
        platform: Platform,
    ) -> Self {
        let registry = CommandRegistry::new(overrides, platform);
        Self {
            tokens,
            accounts,
            dispatcher: ActionDispatcher::new(registry, executor),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// First-run setup: default administrator and default command table.
    pub fn bootstrap(&self, username: &str, password: &str) -> Result<(), ControlError> {
        if self.accounts.count()? == 0 {
            let hash = hash_password(password)?;
            self.accounts
                .create(username, &hash, PermissionSet::all())?;
            warn!(user = %username, "no accounts found, created default administrator");
        }
        if self.dispatcher.registry().seed_defaults_if_empty()? {
            info!("seeded default commands");
        }
        Ok(())
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginGrant, ControlError> {
        let account = match self.accounts.find_by_username(username) {
            Ok(a) => a,
            Err(StoreError::NotFound) => {
                info!(user = %username, "login for unknown user");
                return Err(ControlError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };

        match verify_password(password, &account.password_hash) {
            Ok(true) => {}
            Ok(false) => {
                info!(user = %username, "login with wrong password");
                return Err(ControlError::Unauthorized);
            }
            Err(e) => {
                warn!(user = %username, error = %e, "stored password hash unreadable");
                return Err(ControlError::Unauthorized);
            }
        }

        let token = self
            .tokens
            .issue(&account.username, account.permissions)
            .map_err(|e| ControlError::Token(e.to_string()))?;
        info!(user = %account.username, "login successful");
        Ok(LoginGrant {
            token,
            username: account.username,
            permissions: account.permissions,
        })
    }

    pub fn guard(&self, credential: Option<&str>) -> GuardDecision {
        SessionGuard::new(&self.tokens, self.accounts.as_ref()).check(credential)
    }

    pub fn dashboard(&self, session: &Session) -> DashboardData {
        DashboardData {
            user: session.subject.clone(),
            permissions: session.permissions,
        }
    }

    // ─── Account management ──────────────────────────────────────

    pub fn register(
        &self,
        session: &Session,
        username: &str,
        password: &str,
        permissions: &Map<String, Value>,
    ) -> Result<i64, ControlError> {
        require(session, Capability::ManageUsers)?;
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ControlError::InvalidParameter(
                "username and password are required".into(),
            ));
        }
        let hash = hash_password(password)?;
        let id = self
            .accounts
            .create(username, &hash, PermissionSet::from_partial(permissions))?;
        info!(by = %session.subject, user = %username, id, "user registered");
        Ok(id)
    }

    pub fn list_users(&self, session: &Session) -> Result<Vec<AccountSummary>, ControlError> {
        require(session, Capability::ManageUsers)?;
        Ok(self.accounts.list()?)
    }

    pub fn update_permissions(
        &self,
        session: &Session,
        id: i64,
        partial: &Map<String, Value>,
    ) -> Result<PermissionUpdate, ControlError> {
        require(session, Capability::ManageUsers)?;
        let target = self.accounts.find_by_id(id)?;
        let permissions = self.accounts.update(id, partial)?;
        info!(by = %session.subject, user = %target.username, "permissions updated");

        let rotated_token = if target.username == session.subject {
            Some(
                self.tokens
                    .issue(&target.username, permissions)
                    .map_err(|e| ControlError::Token(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(PermissionUpdate {
            permissions,
            rotated_token,
        })
    }

    pub fn delete_user(&self, session: &Session, id: i64) -> Result<Deletion, ControlError> {
        require(session, Capability::ManageUsers)?;
        let target = self.accounts.find_by_id(id)?;
        self.accounts.delete(id)?;
        info!(by = %session.subject, user = %target.username, "user deleted");
        Ok(Deletion {
            self_deleted: target.username == session.subject,
        })
    }

    // ─── Command bindings ────────────────────────────────────────

    pub fn list_commands(
        &self,
        session: &Session,
    ) -> Result<BTreeMap<String, String>, ControlError> {
        require(session, Capability::ModifyCommands)?;
        self.dispatcher.registry().list_effective()
    }

    pub fn update_commands(&self, session: &Session, input: &Value) -> Result<(), ControlError> {
        require(session, Capability::ModifyCommands)?;
        self.dispatcher.registry().set_overrides(input)
    }

    pub fn reset_commands(&self, session: &Session) -> Result<(), ControlError> {
        require(session, Capability::ModifyCommands)?;
        self.dispatcher.registry().reset_to_defaults()
    }

    // ─── Host actions ────────────────────────────────────────────

    pub fn run_action(
        &self,
        session: &Session,
        action: Action,
        param: Option<i64>,
    ) -> Result<ActionOutput, ControlError> {
        let result = self
            .dispatcher
            .invoke(action, &session.permissions, param);
        if let Err(e) = &result {
            warn!(user = %session.subject, action = action.key(), error = %e, "action declined");
        }
        result
    }

    pub fn set_volume(
        &self,
        session: &Session,
        level: Option<i64>,
    ) -> Result<ActionOutput, ControlError> {
        self.run_action(session, Action::SetVolume, level)
    }

    pub fn metrics(&self, session: &Session) -> Result<MetricsReport, ControlError> {
        self.dispatcher.metrics(&session.permissions)
    }

    pub fn volume_status(&self, session: &Session) -> Result<VolumeStatus, ControlError> {
        self.dispatcher.volume_status(&session.permissions)
    }
}
