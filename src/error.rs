use crate::actions::parsers::ParseError;
use crate::password::PasswordError;
use crate::permissions::Capability;
use crate::store::StoreError;

/// Declined outcome of a panel operation.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("incorrect credentials")]
    Unauthorized,
    #[error("permission denied: '{}' required", .0.key())]
    Forbidden(Capability),
    #[error("no command configured for '{0}'")]
    Unconfigured(String),
    #[error("actions are not supported on platform '{0}'")]
    UnsupportedPlatform(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("username already exists")]
    Conflict,
    #[error("cannot delete the last administrator user")]
    LastAdminGuard,
    #[error("{0} not found")]
    NotFound(String),
    #[error("command failed: {0}")]
    ExecutionFailure(String),
    #[error("unexpected command output: {0}")]
    ParseFailure(#[from] ParseError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("session token error: {0}")]
    Token(String),
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => ControlError::Conflict,
            StoreError::NotFound => ControlError::NotFound("user".to_string()),
            StoreError::LastAdminGuard => ControlError::LastAdminGuard,
            other => ControlError::Store(other),
        }
    }
}
