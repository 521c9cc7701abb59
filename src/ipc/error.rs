use crate::allocator::AllocError;
use crate::store::StoreError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Write-path store failures: "retry the write" unless the stored data
/// itself is bad.
pub fn store_err(id: &str, e: &StoreError) -> serde_json::Value {
    match e {
        StoreError::Malformed { record, .. } => err(
            id,
            "malformed_record",
            e.to_string(),
            Some(json!({ "record": record })),
        ),
        StoreError::RetriesExhausted { attempts } => err(
            id,
            "save_failed",
            e.to_string(),
            Some(json!({ "retryable": true, "attempts": attempts })),
        ),
        _ => err(
            id,
            "save_failed",
            e.to_string(),
            Some(json!({ "retryable": e.is_retryable() })),
        ),
    }
}

pub fn alloc_err(id: &str, e: &AllocError) -> serde_json::Value {
    match e {
        AllocError::NotConfigured { reason } => err(
            id,
            "scheme_not_configured",
            e.to_string(),
            Some(json!({ "reason": reason })),
        ),
        AllocError::StudentIdRequired => err(id, "bad_params", e.to_string(), None),
        AllocError::Store(se) => store_err(id, se),
    }
}
