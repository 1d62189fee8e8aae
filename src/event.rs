//! Event records submitted to the delivery sink.
//!
//! The field layout mirrors the collector's API model: one event per
//! request/response exchange, with optional identity fields, free-form
//! metadata, a direction tag, and the sampling weight.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri};
use serde::Serialize;
use serde_json::{Map, Value};

/// Which side of the wire an event was captured on.
///
/// This crate captures the `Incoming` path; `Outgoing` is reserved for
/// instrumented client calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Server receiving a request.
    Incoming,
    /// Instrumented outbound client call.
    Outgoing,
}

/// The request half of an event.
#[derive(Debug, Clone, Serialize)]
pub struct EventRequest {
    /// Arrival timestamp (pre-handler).
    pub time: DateTime<Utc>,
    /// Full request URI, `scheme://host/path?query`.
    pub uri: String,
    /// HTTP method.
    pub verb: String,
    /// Optional application API version tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Client IP address, when resolvable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Captured request headers, masked per configuration.
    pub headers: Map<String, Value>,
    /// Parsed request body, when body logging is enabled and a body exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Body encoding tag: `"json"` or `"base64"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_encoding: Option<&'static str>,
    /// Declared or observed body length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
}

/// The response half of an event.
#[derive(Debug, Clone, Serialize)]
pub struct EventResponse {
    /// Completion timestamp (post-handler).
    pub time: DateTime<Utc>,
    /// Final response status code.
    pub status: u16,
    /// Captured response headers, masked per configuration.
    pub headers: Map<String, Value>,
    /// Parsed response body, when body logging is enabled and a body exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Body encoding tag: `"json"` or `"base64"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_encoding: Option<&'static str>,
    /// Declared or observed body length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
}

/// One structured record describing a single request/response exchange.
///
/// Constructed once after the handler completes, handed to the sink, then
/// discarded; never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// The request half.
    pub request: EventRequest,
    /// The response half.
    pub response: EventResponse,
    /// Session token resolved by the configured callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// User identity resolved by the configured callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Company identity resolved by the configured callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Free-form metadata resolved by the configured callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Capture direction.
    pub direction: Direction,
    /// Sampling weight; at least 1.
    pub weight: u32,
}

/// Out-of-band user identity update, forwarded to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct UserUpdate {
    /// The user being updated.
    pub user_id: String,
    /// Company the user belongs to, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Free-form profile metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Out-of-band company identity update, forwarded to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyUpdate {
    /// The company being updated.
    pub company_id: String,
    /// Free-form profile metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Read-only view of a captured request, handed to the configured
/// identity, metadata, and skip callbacks.
///
/// The body is the retained duplicate (empty when duplication failed), so
/// callbacks may inspect it freely without touching the handler's copy.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request method.
    pub method: Method,
    /// Request URI as received.
    pub uri: Uri,
    /// Request headers, including the correlation header when enabled.
    pub headers: HeaderMap,
    /// Retained copy of the request body bytes.
    pub body: Bytes,
}
