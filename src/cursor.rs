//! Opaque pagination cursors for the job listing.
//!
//! A cursor is the base64 of a small JSON document naming the last row the
//! client saw (created_at + id). Decoding is defensive; cursors come straight
//! off the query string.

use axum::http::StatusCode;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

const MAX_ENCODED_LEN: usize = 1000;
const MAX_DECODED_LEN: usize = 500;

/// Position within the created_at-descending job listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorData {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

fn bad_cursor(reason: &str) -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "VALIDATION_FAILED",
        format!("cursor {}", reason),
    )
}

/// Encode a listing position as an opaque string
pub fn encode_cursor(created_at: &DateTime<Utc>, id: &Uuid) -> String {
    let data = CursorData {
        created_at: *created_at,
        id: *id,
    };
    BASE64.encode(serde_json::to_vec(&data).unwrap())
}

/// Decode and validate a client-supplied cursor
pub fn decode_cursor(cursor: &str) -> Result<CursorData, ApiError> {
    if cursor.is_empty() {
        return Err(bad_cursor("cannot be empty"));
    }
    if cursor.len() > MAX_ENCODED_LEN {
        return Err(bad_cursor("is too long"));
    }

    let bytes = BASE64
        .decode(cursor)
        .map_err(|_| bad_cursor("is not valid base64"))?;
    if bytes.is_empty() || bytes.len() > MAX_DECODED_LEN {
        return Err(bad_cursor("payload size is out of bounds"));
    }

    let data: CursorData =
        serde_json::from_slice(&bytes).map_err(|_| bad_cursor("payload is malformed"))?;
    if data.id.is_nil() {
        return Err(bad_cursor("references a nil id"));
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_position() {
        let created_at = Utc::now();
        let id = Uuid::new_v4();

        let decoded = decode_cursor(&encode_cursor(&created_at, &id)).expect("decodes");
        assert_eq!(decoded.created_at, created_at);
        assert_eq!(decoded.id, id);
    }

    #[test]
    fn rejects_empty_and_oversized_input() {
        assert!(decode_cursor("").is_err());
        assert!(decode_cursor(&"A".repeat(MAX_ENCODED_LEN + 1)).is_err());
    }

    #[test]
    fn rejects_garbage_base64() {
        let err = decode_cursor("not base64 at all!").unwrap_err();
        assert_eq!(err.code, "VALIDATION_FAILED");
    }

    #[test]
    fn rejects_valid_base64_with_malformed_payload() {
        let cursor = BASE64.encode(br#"{"created_at": 12}"#);
        let err = decode_cursor(&cursor).unwrap_err();
        assert!(err.message.contains("malformed"));
    }

    #[test]
    fn rejects_nil_id() {
        let cursor = encode_cursor(&Utc::now(), &Uuid::nil());
        let err = decode_cursor(&cursor).unwrap_err();
        assert!(err.message.contains("nil id"));
    }
}
