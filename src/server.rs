//! HTTP surface: JSON routes over [`ControlPanel`].
//!
//! Store access, password hashing and command execution all block, so every
//! handler body runs on tokio's blocking pool.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::actions::Action;
use crate::error::ControlError;
use crate::guard::{GuardDecision, RejectReason, Session};
use crate::service::ControlPanel;

pub const SESSION_COOKIE: &str = "syspilot_token";

pub type AppState = Arc<ControlPanel>;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub permissions: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsRequest {
    #[serde(default)]
    pub permissions: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    #[serde(default)]
    pub level: Option<Value>,
}

impl VolumeRequest {
    /// Whole-number level, `None` when absent or null.
    pub fn level(&self) -> Result<Option<i64>, ControlError> {
        match &self.level {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                ControlError::InvalidParameter(format!("volume level must be an integer, got {v}"))
            }),
        }
    }
}

/// Decode a JSON request body. An empty body reads as `{}`.
pub fn parse_body<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ControlError> {
    let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        bytes.as_ref()
    };
    serde_json::from_slice(raw)
        .map_err(|e| ControlError::InvalidFormat(format!("request body: {e}")))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/dashboard-data", get(dashboard))
        .route("/api/users", get(list_users))
        .route("/api/users/register", post(register))
        .route("/api/users/{id}/permissions", put(update_permissions))
        .route("/api/users/{id}", delete(delete_user))
        .route("/api/commands", get(list_commands).put(update_commands))
        .route("/api/commands/reset", post(reset_commands))
        .route("/api/actions/set_volume", post(set_volume))
        .route("/api/actions/{action}", post(run_action))
        .route("/api/volume", get(volume_status))
        .route("/api/metrics", get(metrics))
        .with_state(state)
}

// ─── Cookies and credentials ─────────────────────────────────────────

/// Bearer header first, then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim().to_string());
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/")
}

pub fn cleared_cookie() -> String {
    format!("{SESSION_COOKIE}=; Max-Age=0; HttpOnly; SameSite=Lax; Path=/")
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

// ─── Response mapping ────────────────────────────────────────────────

pub fn status_for(err: &ControlError) -> StatusCode {
    match err {
        ControlError::Unauthorized => StatusCode::UNAUTHORIZED,
        ControlError::Forbidden(_) => StatusCode::FORBIDDEN,
        ControlError::InvalidParameter(_)
        | ControlError::InvalidFormat(_)
        | ControlError::LastAdminGuard => StatusCode::BAD_REQUEST,
        ControlError::Conflict => StatusCode::CONFLICT,
        ControlError::NotFound(_) => StatusCode::NOT_FOUND,
        ControlError::Unconfigured(_) | ControlError::UnsupportedPlatform(_) => {
            StatusCode::NOT_IMPLEMENTED
        }
        ControlError::ExecutionFailure(_)
        | ControlError::ParseFailure(_)
        | ControlError::Store(_)
        | ControlError::Password(_)
        | ControlError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ControlError) -> Response {
    let status = status_for(&err);
    (status, Json(json!({"success": false, "message": err.to_string()}))).into_response()
}

fn ok(mut body: Value) -> Response {
    if let Value::Object(map) = &mut body {
        map.insert("success".into(), Value::Bool(true));
    }
    Json(body).into_response()
}

fn reject_response(reason: &RejectReason) -> Response {
    let body = Json(json!({
        "success": false,
        "reauth": true,
        "message": reason.to_string(),
    }));
    with_cookie(
        (StatusCode::UNAUTHORIZED, body).into_response(),
        &cleared_cookie(),
    )
}

/// Run `handler` on the blocking pool once the guard allows the request.
async fn guarded<F>(app: AppState, headers: HeaderMap, handler: F) -> Response
where
    F: FnOnce(&ControlPanel, Session) -> Response + Send + 'static,
{
    let token = session_token(&headers);
    let joined = tokio::task::spawn_blocking(move || match app.guard(token.as_deref()) {
        GuardDecision::Allow(session) => handler(app.as_ref(), session),
        GuardDecision::Rotate { token, permissions } => {
            let body = Json(json!({
                "success": false,
                "permissions_changed": true,
                "message": "Permissions changed, session refreshed.",
                "permissions": permissions,
            }));
            with_cookie(body.into_response(), &session_cookie(&token))
        }
        GuardDecision::Reject(reason) => reject_response(&reason),
    })
    .await;

    joined.unwrap_or_else(|e| {
        error!(error = %e, "request handler panicked");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "message": "internal error"})),
        )
            .into_response()
    })
}

fn respond<T: serde::Serialize>(result: Result<T, ControlError>, field: &str) -> Response {
    match result {
        Ok(value) => {
            let mut body = Map::new();
            body.insert(field.to_string(), json!(value));
            ok(Value::Object(body))
        }
        Err(e) => error_response(e),
    }
}

// ─── Handlers ────────────────────────────────────────────────────────

async fn login(State(app): State<AppState>, body: Bytes) -> Response {
    let req: LoginRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(e) => return error_response(e),
    };
    let joined =
        tokio::task::spawn_blocking(move || app.login(&req.username, &req.password)).await;
    match joined {
        Ok(Ok(grant)) => {
            let cookie = session_cookie(&grant.token);
            let body = ok(json!({
                "message": "Login successful",
                "token": grant.token,
                "user": grant.username,
                "permissions": grant.permissions,
            }));
            with_cookie(body, &cookie)
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            error!(error = %e, "login task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout() -> Response {
    info!("logout");
    with_cookie(
        ok(json!({"message": "Logged out successfully"})),
        &cleared_cookie(),
    )
}

async fn dashboard(State(app): State<AppState>, headers: HeaderMap) -> Response {
    guarded(app, headers, |app, session| {
        respond(Ok::<_, ControlError>(app.dashboard(&session)), "data")
    })
    .await
}

async fn list_users(State(app): State<AppState>, headers: HeaderMap) -> Response {
    guarded(app, headers, |app, session| {
        respond(app.list_users(&session), "users")
    })
    .await
}

async fn register(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    guarded(app, headers, move |app, session| {
        let req: RegisterRequest = match parse_body(&body) {
            Ok(req) => req,
            Err(e) => return error_response(e),
        };
        match app.register(&session, &req.username, &req.password, &req.permissions) {
            Ok(id) => (
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "id": id,
                    "message": format!("User {} registered successfully", req.username.trim()),
                })),
            )
                .into_response(),
            Err(e) => error_response(e),
        }
    })
    .await
}

async fn update_permissions(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Response {
    guarded(app, headers, move |app, session| {
        let req: PermissionsRequest = match parse_body(&body) {
            Ok(req) => req,
            Err(e) => return error_response(e),
        };
        match app.update_permissions(&session, id, &req.permissions) {
            Ok(update) => {
                let body = ok(json!({"permissions": update.permissions}));
                match update.rotated_token {
                    Some(token) => with_cookie(body, &session_cookie(&token)),
                    None => body,
                }
            }
            Err(e) => error_response(e),
        }
    })
    .await
}

async fn delete_user(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    guarded(app, headers, move |app, session| {
        match app.delete_user(&session, id) {
            Ok(deletion) => {
                let body = ok(json!({
                    "message": "User deleted successfully",
                    "logged_out": deletion.self_deleted,
                }));
                if deletion.self_deleted {
                    with_cookie(body, &cleared_cookie())
                } else {
                    body
                }
            }
            Err(e) => error_response(e),
        }
    })
    .await
}

async fn list_commands(State(app): State<AppState>, headers: HeaderMap) -> Response {
    guarded(app, headers, |app, session| {
        respond(app.list_commands(&session), "commands")
    })
    .await
}

async fn update_commands(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    guarded(app, headers, move |app, session| {
        let input: Value = match parse_body(&body) {
            Ok(input) => input,
            Err(e) => return error_response(e),
        };
        // Accept either a bare object or {"commands": {...}}.
        let commands = input.get("commands").cloned().unwrap_or(input);
        match app.update_commands(&session, &commands) {
            Ok(()) => ok(json!({"message": "Commands updated successfully"})),
            Err(e) => error_response(e),
        }
    })
    .await
}

async fn reset_commands(State(app): State<AppState>, headers: HeaderMap) -> Response {
    guarded(app, headers, |app, session| match app.reset_commands(&session) {
        Ok(()) => ok(json!({"message": "Commands reset to defaults"})),
        Err(e) => error_response(e),
    })
    .await
}

async fn run_action(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    guarded(app, headers, move |app, session| {
        let action = match Action::from_key(&key) {
            Some(a) if a.is_trigger() => a,
            _ => return error_response(ControlError::NotFound(format!("action '{key}'"))),
        };
        respond(app.run_action(&session, action, None), "result")
    })
    .await
}

async fn set_volume(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    guarded(app, headers, move |app, session| {
        let level = match parse_body::<VolumeRequest>(&body).and_then(|req| req.level()) {
            Ok(level) => level,
            Err(e) => return error_response(e),
        };
        respond(app.set_volume(&session, level), "result")
    })
    .await
}

async fn volume_status(State(app): State<AppState>, headers: HeaderMap) -> Response {
    guarded(app, headers, |app, session| {
        respond(app.volume_status(&session), "volume")
    })
    .await
}

async fn metrics(State(app): State<AppState>, headers: HeaderMap) -> Response {
    guarded(app, headers, |app, session| {
        respond(app.metrics(&session), "metrics")
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::parsers::ParseError;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_token_from_bearer() {
        let h = headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(session_token(&h).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_token_from_cookie() {
        let h = headers(&[("cookie", "theme=dark; syspilot_token=tok123; lang=en")]);
        assert_eq!(session_token(&h).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_no_token() {
        let h = headers(&[("cookie", "theme=dark")]);
        assert_eq!(session_token(&h), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_strings() {
        assert!(session_cookie("t").starts_with("syspilot_token=t;"));
        assert!(session_cookie("t").contains("HttpOnly"));
        assert!(cleared_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ControlError::Forbidden(crate::permissions::Capability::Lock)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(&ControlError::Conflict), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&ControlError::LastAdminGuard),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ControlError::ParseFailure(ParseError::Empty)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&ControlError::UnsupportedPlatform("windows".into())),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_empty_body_reads_as_empty_object() {
        let req: RegisterRequest = parse_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(req.username.is_empty());
        assert!(req.permissions.is_empty());
    }

    #[test]
    fn test_malformed_body_is_invalid_format() {
        assert!(matches!(
            parse_body::<PermissionsRequest>(&Bytes::from_static(b"{not json")),
            Err(ControlError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_volume_level_must_be_whole_number() {
        let level = |raw: &'static [u8]| {
            parse_body::<VolumeRequest>(&Bytes::from_static(raw)).and_then(|r| r.level())
        };
        assert_eq!(level(br#"{"level": 40}"#).unwrap(), Some(40));
        assert_eq!(level(b"{}").unwrap(), None);
        assert_eq!(level(br#"{"level": null}"#).unwrap(), None);
        assert!(matches!(
            level(br#"{"level": 55.5}"#),
            Err(ControlError::InvalidParameter(_))
        ));
        assert!(matches!(
            level(br#"{"level": "50"}"#),
            Err(ControlError::InvalidParameter(_))
        ));
    }
}
