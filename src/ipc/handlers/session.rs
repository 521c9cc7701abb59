use crate::ipc::error::{err, ok};
use crate::ipc::helpers::optional_str;
use crate::ipc::types::{AppState, Request, Session};
use serde_json::json;
use tracing::{info, warn};

const DEFAULT_USER: &str = "Admin";

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(token) = optional_str(&req.params, "token") else {
        return err(&req.id, "bad_params", "missing token", None);
    };
    if let Some(expected) = state.config.admin_token.as_deref() {
        if token != expected {
            warn!("session.open with unrecognised token");
            return err(&req.id, "unauthenticated", "invalid token", None);
        }
    }

    let user = optional_str(&req.params, "user").unwrap_or_else(|| DEFAULT_USER.to_string());
    info!(%user, "session opened");
    state.session = Some(Session { user: user.clone() });
    ok(&req.id, json!({ "user": user }))
}

fn handle_session_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(s) = state.session.take() {
        info!(user = %s.user, "session closed");
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "active": state.session.is_some(),
            "user": state.session.as_ref().map(|s| s.user.clone())
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(handle_session_open(state, req)),
        "session.close" => Some(handle_session_close(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        _ => None,
    }
}
