use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use super::dto::SolveResponse;

/// JSON body extractor whose rejection still answers `200 {"solution": ""}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(EmptySolution))]
pub struct AppJson<T>(pub T);

/// A request the solver never saw, answered with an empty solution.
#[derive(Debug)]
pub struct EmptySolution {
    pub reason: String,
}

impl From<JsonRejection> for EmptySolution {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            reason: describe_rejection(&rejection),
        }
    }
}

impl IntoResponse for EmptySolution {
    fn into_response(self) -> Response {
        warn!(reason = %self.reason, "Rejected solve request");
        (StatusCode::OK, Json(SolveResponse::empty())).into_response()
    }
}

fn describe_rejection(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let message = err.body_text();
            match extract_invalid_field(&message) {
                Some(field) => format!("Invalid field: {field}"),
                None => format!("Invalid JSON: {message}"),
            }
        }
        JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err.body_text()),
        JsonRejection::MissingJsonContentType(_) => {
            "Missing `Content-Type: application/json` header".to_string()
        }
        JsonRejection::BytesRejection(err) => {
            format!("Failed to read request body: {}", err.body_text())
        }
        other => other.body_text(),
    }
}

/// serde reports type errors as ``... at line 1 column 14`` after naming the
/// field path, e.g. ``captcha: invalid type: integer `5`, expected a string``.
fn extract_invalid_field(message: &str) -> Option<&str> {
    let start = message.find(": ")? + 2;
    let remaining = message.get(start..)?;
    let end = remaining.find(':')?;
    remaining.get(..end).filter(|field| !field.contains(' '))
}
