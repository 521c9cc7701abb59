use crate::allocator;
use crate::db;
use crate::ipc::error::{alloc_err, err, ok};
use crate::ipc::helpers::{optional_str, patch_nullable_str, patch_object, patch_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, StudentDraft};
use serde_json::json;

const PATCH_FIELDS: &[&str] = &["name", "classId", "email", "phone", "dob", "studentId"];

fn class_exists(conn: &rusqlite::Connection, class_id: &str) -> rusqlite::Result<bool> {
    Ok(db::get_class(conn, class_id)?.is_some())
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = optional_str(&req.params, "classId");

    match db::list_students(store.conn(), class_id.as_deref()) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match db::get_student(store.conn(), &id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let draft = StudentDraft {
        name,
        class_id,
        email,
        phone: optional_str(&req.params, "phone"),
        dob: optional_str(&req.params, "dob"),
    };
    if let Err(msg) = draft.validate() {
        return err(&req.id, "bad_params", msg, None);
    }

    match class_exists(store.conn(), &draft.class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    // Untrimmed: a manual id is stored exactly as entered.
    let requested = req.params.get("studentId").and_then(|v| v.as_str());
    match allocator::create_student(store, &draft, requested) {
        Ok(created) => ok(
            &req.id,
            json!({
                "student": created.student,
                "idSource": created.source
            }),
        ),
        Err(e) => alloc_err(&req.id, &e),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let conn = store.conn();

    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let patch = match patch_object(req, PATCH_FIELDS) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if patch.contains_key("studentId") {
        return err(&req.id, "bad_params", "studentId cannot be changed", None);
    }

    let current = match db::get_student(conn, &id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut draft = StudentDraft {
        name: current.name,
        class_id: current.class_id.clone(),
        email: current.email,
        phone: current.phone,
        dob: current.dob,
    };
    for key in ["name", "classId", "email"] {
        let v = match patch_str(req, patch, key) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if let Some(v) = v {
            match key {
                "name" => draft.name = v,
                "classId" => draft.class_id = v,
                _ => draft.email = v,
            }
        }
    }
    for key in ["phone", "dob"] {
        let v = match patch_nullable_str(req, patch, key) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if let Some(v) = v {
            if key == "phone" {
                draft.phone = v;
            } else {
                draft.dob = v;
            }
        }
    }
    if let Err(msg) = draft.validate() {
        return err(&req.id, "bad_params", msg, None);
    }
    if draft.class_id != current.class_id {
        match class_exists(conn, &draft.class_id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "class not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let sql = format!(
        "UPDATE students
         SET name = ?, class_id = ?, email = ?, phone = ?, dob = ?, updated_at = {}
         WHERE id = ?",
        db::now_sql()
    );
    if let Err(e) = conn.execute(
        &sql,
        (
            draft.name.trim(),
            &draft.class_id,
            draft.email.trim(),
            draft.phone.as_deref(),
            draft.dob.as_deref(),
            &id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    match db::get_student(conn, &id) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match store.conn().unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Accounts reference students; delete them first. The scheme counter is
    // left alone: ids are never recycled.
    if let Err(e) = tx.execute("DELETE FROM student_accounts WHERE student_id = ?", [&id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "student_accounts" })),
        );
    }
    let deleted = match tx.execute("DELETE FROM students WHERE id = ?", [&id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            );
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "student not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_group_by_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let classes = match db::list_classes(store.conn()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = match db::list_students(store.conn(), None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let groups = model::group_by_class(&classes, students);
    ok(&req.id, json!({ "groups": groups }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.groupByClass" => Some(handle_students_group_by_class(state, req)),
        _ => None,
    }
}
