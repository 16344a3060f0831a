use axum::{http::StatusCode, response::IntoResponse, Json};
use dashlink_core::{BridgeError, Reply};
use serde_json::json;

pub fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_caller_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

pub fn bridge_error(err: &BridgeError) -> axum::response::Response {
    (status_for(err), Json(json!({ "message": err.to_string() }))).into_response()
}

pub fn reply(reply: Reply) -> axum::response::Response {
    match reply {
        Reply::Json(value) => (StatusCode::OK, Json(value)).into_response(),
        Reply::Empty => StatusCode::NO_CONTENT.into_response(),
    }
}
