use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, patch_object, patch_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{is_plausible_email, validate_name};
use rusqlite::OptionalExtension;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Teacher {
    id: String,
    name: String,
    email: String,
    subject: String,
    phone: String,
}

impl Teacher {
    fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)?;
        if !is_plausible_email(&self.email) {
            return Err("invalid email".into());
        }
        Ok(())
    }
}

fn teacher_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        subject: r.get(3)?,
        phone: r.get(4)?,
    })
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut stmt = match store
        .conn()
        .prepare("SELECT id, name, email, subject, phone FROM teachers ORDER BY name, rowid")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], teacher_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let teacher = Teacher {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        subject: optional_str(&req.params, "subject").unwrap_or_default(),
        phone: optional_str(&req.params, "phone").unwrap_or_default(),
    };
    if let Err(msg) = teacher.validate() {
        return err(&req.id, "bad_params", msg, None);
    }

    let sql = format!(
        "INSERT INTO teachers(id, name, email, subject, phone, created_at)
         VALUES(?, ?, ?, ?, ?, {})",
        db::now_sql()
    );
    if let Err(e) = store.conn().execute(
        &sql,
        (
            &teacher.id,
            &teacher.name,
            &teacher.email,
            &teacher.subject,
            &teacher.phone,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }
    ok(&req.id, json!({ "teacher": teacher }))
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let patch = match patch_object(req, &["name", "email", "subject", "phone"]) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let current = store
        .conn()
        .query_row(
            "SELECT id, name, email, subject, phone FROM teachers WHERE id = ?",
            [&id],
            teacher_from_row,
        )
        .optional();
    let mut teacher = match current {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "teacher not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    for key in ["name", "email", "subject", "phone"] {
        let v = match patch_str(req, patch, key) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if let Some(v) = v {
            match key {
                "name" => teacher.name = v,
                "email" => teacher.email = v,
                "subject" => teacher.subject = v,
                _ => teacher.phone = v,
            }
        }
    }
    if let Err(msg) = teacher.validate() {
        return err(&req.id, "bad_params", msg, None);
    }

    if let Err(e) = store.conn().execute(
        "UPDATE teachers SET name = ?, email = ?, subject = ?, phone = ? WHERE id = ?",
        (
            &teacher.name,
            &teacher.email,
            &teacher.subject,
            &teacher.phone,
            &id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }
    ok(&req.id, json!({ "teacher": teacher }))
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store
        .conn()
        .execute("DELETE FROM teachers WHERE id = ?", [&id])
    {
        Ok(0) => err(&req.id, "not_found", "teacher not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        _ => None,
    }
}
