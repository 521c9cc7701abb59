use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 4;

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn handle_accounts_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let username: Result<Option<String>, _> = store
        .conn()
        .query_row(
            "SELECT username FROM student_accounts WHERE student_id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional();
    match username {
        Ok(username) => ok(
            &req.id,
            json!({
                "hasAccount": username.is_some(),
                "username": username
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_accounts_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v.trim().to_string(),
        Err(resp) => return resp,
    };
    // Not trimmed: whitespace is part of the password.
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing password", None);
    };
    if username.chars().count() < MIN_USERNAME_LEN {
        return err(
            &req.id,
            "bad_params",
            format!("username must be at least {MIN_USERNAME_LEN} characters"),
            None,
        );
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return err(
            &req.id,
            "bad_params",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            None,
        );
    }

    match db::get_student(store.conn(), &student_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let salt = Uuid::new_v4().simple().to_string();
    let hash = password_digest(&salt, password);
    let sql = format!(
        "INSERT INTO student_accounts(student_id, username, password_salt, password_hash, updated_at)
         VALUES(?, ?, ?, ?, {now})
         ON CONFLICT(student_id) DO UPDATE SET
           username = excluded.username,
           password_salt = excluded.password_salt,
           password_hash = excluded.password_hash,
           updated_at = {now}",
        now = db::now_sql()
    );
    if let Err(e) = store
        .conn()
        .execute(&sql, (&student_id, &username, &salt, &hash))
    {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "student_accounts" })),
        );
    }

    info!(student = %student_id, %username, "student account saved");
    ok(
        &req.id,
        json!({ "studentId": student_id, "username": username }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "studentAccounts.get" => Some(handle_accounts_get(state, req)),
        "studentAccounts.set" => Some(handle_accounts_set(state, req)),
        _ => None,
    }
}
