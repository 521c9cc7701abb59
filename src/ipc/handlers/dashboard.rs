use crate::db;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::store::DocumentStore;
use serde_json::json;

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut counts = serde_json::Map::new();
    for table in ["students", "classes", "teachers", "notices"] {
        match db::count_rows(store.conn(), table) {
            Ok(n) => {
                counts.insert(table.to_string(), json!(n));
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let next_id_preview = match store.id_scheme() {
        Ok(scheme) => scheme.and_then(|s| s.preview()),
        Err(e) => return store_err(&req.id, &e),
    };

    ok(
        &req.id,
        json!({
            "counts": counts,
            "nextIdPreview": next_id_preview
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        _ => None,
    }
}
