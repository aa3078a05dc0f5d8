//! Converts raw HTTP responses into [`Envelope`]s and server error bodies
//! into the [`Error`] taxonomy.

use rowlink_core::{AuthErrorSource, Envelope, Error, ServerError};
use serde_json::Value;

use crate::transport::HttpResponse;

/// Server codes reporting a missing, invalid or expired JWT.
const JWT_CODES: &[&str] = &["PGRST301", "PGRST302", "PGRST303"];

/// Postgres `insufficient_privilege`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Single-object request whose result was not exactly one row.
const SINGULAR_CARDINALITY: &str = "PGRST116";

/// Normalizes a received response.
///
/// A 2xx response becomes a success envelope whose `data` is the parsed
/// JSON body (`None` for an empty body) and whose `count` comes from
/// `Content-Range`. Any other status becomes a failure envelope.
pub fn normalize(response: &HttpResponse) -> Envelope<Value> {
    let status = response.status;
    if (200..300).contains(&status) {
        let count = response
            .header("content-range")
            .and_then(parse_content_range);
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Envelope::success(None, count, status);
        }
        return match serde_json::from_slice::<Value>(&response.body) {
            Ok(value) => Envelope::success(Some(value), count, status),
            Err(e) => Envelope::failure(
                Error::Decode(format!("response body is not valid JSON: {e}")),
                status,
            ),
        };
    }

    let error = parse_server_error(status, &response.body);
    Envelope::failure(map_server_error(status, error), status)
}

/// Reads a `{code, message, details, hint}` body, falling back to the raw
/// text when the body is not that shape.
pub fn parse_server_error(status: u16, body: &[u8]) -> ServerError {
    if let Ok(error) = serde_json::from_slice::<ServerError>(body) {
        if error.code.is_some() || !error.message.is_empty() {
            return error;
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    ServerError {
        code: None,
        message: if text.is_empty() {
            http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("request failed")
                .to_string()
        } else {
            text
        },
        details: None,
        hint: None,
    }
}

/// Classifies a server-reported failure.
pub fn map_server_error(status: u16, error: ServerError) -> Error {
    let code = error.code.as_deref();
    let is_auth = status == 401
        || status == 403
        || code.is_some_and(|c| JWT_CODES.contains(&c) || c == INSUFFICIENT_PRIVILEGE);
    if is_auth {
        return Error::Auth {
            origin: AuthErrorSource::Server,
            status: Some(status),
            code: error.code,
            message: error.message,
        };
    }
    if code == Some(SINGULAR_CARDINALITY) {
        match error.details.as_deref().and_then(row_count_from_details) {
            Some(0) => return Error::NotFound,
            Some(n) => return Error::MultipleRowsFound(n),
            None => {}
        }
    }
    Error::Database { status, error }
}

/// `"The result contains 3 rows"` -> 3.
fn row_count_from_details(details: &str) -> Option<usize> {
    details
        .split_whitespace()
        .find_map(|word| word.parse::<usize>().ok())
}

/// Total from `Content-Range: 0-9/25` or `*/25`. An unknown total (`/*`)
/// yields `None`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}
