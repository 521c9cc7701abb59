use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::model::{IdScheme, SchemeError};
use crate::store::{DocumentStore, StoreError, TxError};
use serde_json::json;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
enum SchemeUpdateError {
    #[error(transparent)]
    Invalid(#[from] SchemeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TxError for SchemeUpdateError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict))
    }
}

fn handle_id_scheme_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match store.id_scheme() {
        Ok(Some(scheme)) => ok(
            &req.id,
            json!({
                "scheme": scheme,
                "exists": true,
                "nextIdPreview": scheme.preview()
            }),
        ),
        Ok(None) => {
            let scheme = IdScheme::default_form();
            ok(
                &req.id,
                json!({
                    "scheme": scheme,
                    "exists": false,
                    "nextIdPreview": scheme.preview()
                }),
            )
        }
        Err(e) => store_err(&req.id, &e),
    }
}

fn parse_scheme(req: &Request) -> Result<IdScheme, serde_json::Value> {
    let Some(use_scheme) = req.params.get("useScheme").and_then(|v| v.as_bool()) else {
        return Err(err(&req.id, "bad_params", "useScheme must be boolean", None));
    };
    let prefix = match req.params.get("prefix") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(v) => match v.as_str() {
            Some(s) => s.to_string(),
            None => return Err(err(&req.id, "bad_params", "prefix must be string", None)),
        },
    };
    let Some(next_id) = req.params.get("nextId").and_then(|v| v.as_u64()) else {
        return Err(err(
            &req.id,
            "bad_params",
            "nextId must be a positive integer",
            None,
        ));
    };
    Ok(IdScheme {
        use_scheme,
        prefix,
        next_id,
    })
}

fn handle_id_scheme_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let scheme = match parse_scheme(req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Err(e) = scheme.validate() {
        return err(&req.id, "bad_params", e.to_string(), None);
    }

    // Goes through a transaction like every other write to this record.
    let res = store.run_transaction(|tx| -> Result<(), SchemeUpdateError> {
        let current = match tx.id_scheme() {
            Ok(c) => c,
            // An unreadable record may be replaced outright.
            Err(StoreError::Malformed { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        scheme.validate_replacing(current.as_ref())?;
        tx.put_id_scheme(&scheme)?;
        Ok(())
    });

    match res {
        Ok(()) => {
            info!(
                use_scheme = scheme.use_scheme,
                prefix = %scheme.prefix,
                next_id = scheme.next_id,
                "student id scheme saved"
            );
            ok(
                &req.id,
                json!({
                    "scheme": scheme,
                    "nextIdPreview": scheme.preview()
                }),
            )
        }
        Err(SchemeUpdateError::Invalid(e)) => err(&req.id, "bad_params", e.to_string(), None),
        Err(SchemeUpdateError::Store(e)) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "idScheme.get" => Some(handle_id_scheme_get(state, req)),
        "idScheme.update" => Some(handle_id_scheme_update(state, req)),
        _ => None,
    }
}
