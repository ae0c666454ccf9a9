//! JSON message builders for the four wire shapes.

use betterspotlight_domain::error::{Error, IpcErrorCode};
use serde_json::{json, Value};

/// Build a request message.
#[must_use]
pub fn make_request(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut msg = json!({
        "type": "request",
        "id": id,
        "method": method,
    });
    if let (Some(obj), Some(p)) = (msg.as_object_mut(), params) {
        obj.insert("params".to_owned(), p);
    }
    msg
}

/// Build a success response.
#[must_use]
pub fn make_response(id: u64, result: Value) -> Value {
    json!({
        "type": "response",
        "id": id,
        "result": result,
    })
}

/// Build an error response.
#[must_use]
pub fn make_error(id: u64, code: IpcErrorCode, message: &str) -> Value {
    json!({
        "type": "error",
        "id": id,
        "error": {
            "code": code.code(),
            "codeString": code.as_str(),
            "message": message,
        },
    })
}

/// Build an error response from a domain error.
#[must_use]
pub fn make_error_from(id: u64, err: &Error) -> Value {
    make_error(id, err.ipc_code(), &err.to_string())
}

/// Build a notification (no id).
#[must_use]
pub fn make_notification(method: &str, params: Option<Value>) -> Value {
    let mut msg = json!({
        "type": "notification",
        "method": method,
    });
    if let (Some(obj), Some(p)) = (msg.as_object_mut(), params) {
        obj.insert("params".to_owned(), p);
    }
    msg
}

/// Message `type` field, if present.
#[must_use]
pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

/// Message `id` field, if present.
#[must_use]
pub fn message_id(message: &Value) -> Option<u64> {
    message.get("id").and_then(Value::as_u64)
}

/// Message `method` field, if present.
#[must_use]
pub fn message_method(message: &Value) -> Option<&str> {
    message.get("method").and_then(Value::as_str)
}
