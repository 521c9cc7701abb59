use crate::ipc::error::err;
use crate::ipc::types::Request;
use serde_json::Value;

/// Trimmed string param, `bad_params` response if absent.
pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) => Ok(v.trim().to_string()),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

/// Trimmed string, `None` when missing, null or blank.
pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .and_then(|s| if s.is_empty() { None } else { Some(s) })
}

/// Patch object for `*.update` methods, rejecting keys outside `allowed`.
pub fn patch_object<'a>(
    req: &'a Request,
    allowed: &[&str],
) -> Result<&'a serde_json::Map<String, Value>, Value> {
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "patch must be an object", None));
    };
    for k in patch.keys() {
        if !allowed.contains(&k.as_str()) {
            return Err(err(
                &req.id,
                "bad_params",
                format!("unknown patch field: {}", k),
                None,
            ));
        }
    }
    Ok(patch)
}

/// Patch value for a nullable text column: `Some(None)` clears it.
pub fn patch_nullable_str(
    req: &Request,
    patch: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<Option<String>>, Value> {
    match patch.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(Some(if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }))
        }
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a string or null", key),
            None,
        )),
    }
}

pub fn patch_str(
    req: &Request,
    patch: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<String>, Value> {
    match patch.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a string", key),
            None,
        )),
    }
}
