//! FFI layer for mobile hosts.
//!
//! C-compatible functions that expose the merge and fold rules to an app
//! that keeps its own storage and network code. All data crosses the
//! boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `fitsync_*` functions are allocated by Rust
//! - Caller must free them with `fitsync_string_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{
    decode_documents,
    error::Result,
    reconcile::{fold_remote, merge, FoldAction, MergeReport},
    ChatMessage, DataKind, Document, MealPlanEntry, Routine, SyncRecord, WorkoutLogEntry,
};
use serde::Serialize;
use std::ffi::{c_char, CStr, CString};

/// Result wrapper for FFI responses.
#[derive(Serialize)]
#[serde(untagged)]
enum FfiResult<T: Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: Serialize> FfiResult<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => FfiResult::Ok { ok: value },
            Err(e) => FfiResult::err(e.to_string()),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

/// A record the host should write to the remote store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushDocument {
    /// Set for keyed kinds; otherwise the store generates one
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    data: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeResponse {
    /// New local storage text
    merged: String,
    to_push: Vec<PushDocument>,
    report: MergeReport,
    /// Remote documents that could not be decoded
    skipped: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FoldResponse {
    changed: bool,
    /// Local storage text to write; absent when unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    replacement: Option<String>,
}

fn merge_json<R: SyncRecord>(local_text: &str, remote_docs: &[Document]) -> Result<MergeResponse> {
    let local = R::decode_local(local_text)?;
    let (remote, errors) = decode_documents::<R>(remote_docs);
    let outcome = merge(&local, &remote);

    let to_push = outcome
        .to_push
        .iter()
        .map(|r| {
            Ok(PushDocument {
                id: r.document_id(),
                data: r.to_document_data()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MergeResponse {
        merged: R::encode_local(&outcome.merged)?,
        report: outcome.report(local.len(), remote.len()),
        to_push,
        skipped: errors.iter().map(|e| e.to_string()).collect(),
    })
}

fn fold_json<R: SyncRecord>(current_text: &str, remote_docs: &[Document]) -> Result<FoldResponse> {
    let current = R::decode_local(current_text)?;
    let (remote, _) = decode_documents::<R>(remote_docs);
    match fold_remote(&current, remote) {
        FoldAction::Unchanged => Ok(FoldResponse {
            changed: false,
            replacement: None,
        }),
        FoldAction::Replace(records) => Ok(FoldResponse {
            changed: true,
            replacement: Some(R::encode_local(&records)?),
        }),
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `fitsync_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::new(r#"{"error":"string contained null bytes"}"#)
            .unwrap_or_default()
            .into_raw(),
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

struct Inputs {
    kind: DataKind,
    local: String,
    remote: Vec<Document>,
}

unsafe fn read_inputs(
    kind: *const c_char,
    local_json: *const c_char,
    remote_docs_json: *const c_char,
) -> std::result::Result<Inputs, String> {
    let kind = from_c_string(kind).ok_or("invalid kind")?;
    let kind: DataKind = kind.parse().map_err(|e: crate::Error| e.to_string())?;
    let local = from_c_string(local_json).ok_or("invalid local JSON")?;
    let remote_str = from_c_string(remote_docs_json).ok_or("invalid remote documents JSON")?;
    let remote = serde_json::from_str(&remote_str).map_err(|e| format!("parse error: {}", e))?;
    Ok(Inputs {
        kind,
        local,
        remote,
    })
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `fitsync_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn fitsync_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Merge a local collection with a remote snapshot.
///
/// # Arguments
/// - `kind`: storage suffix or collection name (`"routines"`, `"workoutLogs"`, ...)
/// - `local_json`: local storage text of the kind
/// - `remote_docs_json`: JSON array of `{"id": ..., "data": ...}`
///
/// # Returns
/// JSON string: `{"ok": {"merged", "toPush", "report", "skipped"}}` or `{"error": "message"}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `fitsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn fitsync_merge(
    kind: *const c_char,
    local_json: *const c_char,
    remote_docs_json: *const c_char,
) -> *mut c_char {
    let inputs = match read_inputs(kind, local_json, remote_docs_json) {
        Ok(i) => i,
        Err(e) => return to_c_string(FfiResult::<()>::err(e).to_json()),
    };

    let result = match inputs.kind {
        DataKind::Routines => merge_json::<Routine>(&inputs.local, &inputs.remote),
        DataKind::WorkoutLogs => merge_json::<WorkoutLogEntry>(&inputs.local, &inputs.remote),
        DataKind::ChatLogs => merge_json::<ChatMessage>(&inputs.local, &inputs.remote),
        DataKind::MealPlans => merge_json::<MealPlanEntry>(&inputs.local, &inputs.remote),
    };
    to_c_string(FfiResult::from_result(result).to_json())
}

/// Fold a live remote snapshot into the current local collection.
///
/// # Returns
/// JSON string: `{"ok": {"changed": bool, "replacement"?: string}}` or `{"error": "message"}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `fitsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn fitsync_fold(
    kind: *const c_char,
    current_json: *const c_char,
    remote_docs_json: *const c_char,
) -> *mut c_char {
    let inputs = match read_inputs(kind, current_json, remote_docs_json) {
        Ok(i) => i,
        Err(e) => return to_c_string(FfiResult::<()>::err(e).to_json()),
    };

    let result = match inputs.kind {
        DataKind::Routines => fold_json::<Routine>(&inputs.local, &inputs.remote),
        DataKind::WorkoutLogs => fold_json::<WorkoutLogEntry>(&inputs.local, &inputs.remote),
        DataKind::ChatLogs => fold_json::<ChatMessage>(&inputs.local, &inputs.remote),
        DataKind::MealPlans => fold_json::<MealPlanEntry>(&inputs.local, &inputs.remote),
    };
    to_c_string(FfiResult::from_result(result).to_json())
}

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn fitsync_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
