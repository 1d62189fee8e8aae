//! Body duplication, parsing, and content-length resolution.
//!
//! Request bodies are single-consumption streams: the handler needs one
//! pass and the event assembler needs another, in unspecified relative
//! order. [`tee`] drains the stream to memory once and hands back two
//! independent views over the same bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::HeaderMap;
use http_body::Body;
use http_body_util::BodyExt;
use serde_json::Value;

use crate::error::CaptureError;
use crate::mask;

/// Encoding tag for bodies that decoded as JSON.
pub const ENCODING_JSON: &str = "json";

/// Encoding tag for opaque bodies carried as base64 text.
pub const ENCODING_BASE64: &str = "base64";

/// Drain a body to exhaustion and return two independent copies.
///
/// The first copy replaces the request body for the downstream handler;
/// the second is retained for event assembly. Consuming one never affects
/// the other ([`Bytes`] clones share the buffer but cursor independently).
///
/// A body that is already at end-of-stream short-circuits to two empty
/// copies without buffering. A read failure yields [`CaptureError`]; the
/// caller degrades to best-effort capture rather than failing the request.
pub async fn tee<B>(body: B) -> Result<(Bytes, Bytes), CaptureError>
where
    B: Body,
    B::Error: Into<crate::error::BoxError>,
{
    if body.is_end_stream() {
        return Ok((Bytes::new(), Bytes::new()));
    }
    let collected = body
        .collect()
        .await
        .map_err(|err| CaptureError::Body(err.into()))?;
    let bytes = collected.to_bytes();
    Ok((bytes.clone(), bytes))
}

/// Classify captured bytes as structured JSON or opaque binary.
///
/// A successful JSON decode is masked with the given rule set (when the
/// top-level value is an object; anything else skips masking with a
/// diagnostic) and tagged [`ENCODING_JSON`]. Decode failure falls back to
/// a base64 rendition of the raw bytes tagged [`ENCODING_BASE64`]; that
/// path never fails.
///
/// Callers are expected to check for empty input first; an empty body is
/// "no body", not an empty document.
pub fn parse_body(raw: &[u8], masks: &[String]) -> (Value, &'static str) {
    match serde_json::from_slice::<Value>(raw) {
        Ok(mut value) => {
            if !masks.is_empty() {
                if value.is_object() {
                    mask::mask_value(&mut value, masks);
                } else {
                    tracing::debug!(
                        "body decoded to a non-object JSON value, masking skipped"
                    );
                }
            }
            (value, ENCODING_JSON)
        }
        Err(_) => (Value::String(BASE64.encode(raw)), ENCODING_BASE64),
    }
}

/// Resolve the content length for an event record.
///
/// Prefers an explicit, parseable `Content-Length` header; otherwise falls
/// back to the observed byte count of the captured body.
pub fn resolve_content_length(headers: &HeaderMap, body: &[u8]) -> i64 {
    if let Some(value) = headers.get(CONTENT_LENGTH) {
        if let Ok(text) = value.to_str() {
            match text.parse::<i64>() {
                Ok(length) => return length,
                Err(err) => {
                    tracing::debug!(error = %err, "unparseable content-length header");
                }
            }
        }
    }
    body.len() as i64
}
