/// Wire envelope — spec.md §6: every non-binary response is
/// `{"code": <u16>, "msg": <string|object>}`. The HTTP status is set to
/// match `code` for proxy/tooling friendliness, but the protocol itself
/// dispatches on the JSON body, not the transport status.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ObjError;

#[derive(Serialize, Deserialize)]
pub struct Envelope {
    pub code: u16,
    pub msg: Value,
}

fn http_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Builds a `{code, msg}` envelope with the HTTP status mirroring `code`.
pub fn envelope(code: u16, msg: impl Into<Value>) -> Response {
    (http_status(code), Json(Envelope { code, msg: msg.into() })).into_response()
}

pub fn ok(msg: impl Into<Value>) -> Response {
    envelope(200, msg)
}

pub fn ok_json(value: impl Serialize) -> Response {
    envelope(200, serde_json::to_value(value).unwrap_or(Value::Null))
}

impl IntoResponse for ObjError {
    fn into_response(self) -> Response {
        let code = self.code();
        envelope(code, self.to_string())
    }
}
