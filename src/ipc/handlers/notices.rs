use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_notices_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Newest first; rowid breaks ties inside one millisecond.
    let mut stmt = match store.conn().prepare(
        "SELECT id, title, content, author, created_at
         FROM notices
         ORDER BY created_at DESC, rowid DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let content: String = row.get(2)?;
            let author: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "title": title,
                "content": content,
                "author": author,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(notices) => ok(&req.id, json!({ "notices": notices })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_notices_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let content = match required_str(req, "content") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if title.is_empty() || content.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "title/content must not be empty",
            None,
        );
    }
    let author = state
        .session
        .as_ref()
        .map(|s| s.user.clone())
        .unwrap_or_else(|| "Admin".to_string());

    let notice_id = Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO notices(id, title, content, author, created_at)
         VALUES(?, ?, ?, ?, {})",
        db::now_sql()
    );
    if let Err(e) = store
        .conn()
        .execute(&sql, (&notice_id, &title, &content, &author))
    {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "notices" })),
        );
    }
    ok(
        &req.id,
        json!({ "noticeId": notice_id, "author": author }),
    )
}

fn handle_notices_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store.conn().execute("DELETE FROM notices WHERE id = ?", [&id]) {
        Ok(0) => err(&req.id, "not_found", "notice not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "notices" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notices.list" => Some(handle_notices_list(state, req)),
        "notices.create" => Some(handle_notices_create(state, req)),
        "notices.delete" => Some(handle_notices_delete(state, req)),
        _ => None,
    }
}
