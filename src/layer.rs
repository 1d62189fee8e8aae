//! The capture middleware: a tower `Layer`/`Service` pair.
//!
//! Per request the service duplicates the inbound body, resolves the
//! transaction-correlation identifier, runs the inner service to
//! completion, mirrors the response through a [`CaptureWriter`], and then
//! assembles, samples, and queues the event. Nothing in this path may
//! alter the response delivered to the client beyond the correlation
//! header, and no capture failure may surface as a server error.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::HOST;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::body;
use crate::capture::{BufferedWriter, CaptureWriter, ResponseWriter};
use crate::config::MoesifConfig;
use crate::error::{BoxError, ConfigError};
use crate::event::{Direction, Event, EventRequest, EventResponse, RequestContext};
use crate::mask;
use crate::sink::EventSink;
use crate::Handle;

/// Correlation header propagated across the request and response.
pub const TRANSACTION_ID_HEADER: HeaderName =
    HeaderName::from_static("x-moesif-transaction-id");

/// Tower layer installing the capture middleware.
///
/// ```ignore
/// use std::sync::Arc;
/// use moesif_tower::{MoesifConfig, MoesifLayer, TracingSink};
///
/// let layer = MoesifLayer::new(
///     MoesifConfig::new("my-application-id"),
///     Arc::new(TracingSink),
/// )?;
/// let service = tower::ServiceBuilder::new().layer(layer).service(app);
/// ```
#[derive(Clone)]
pub struct MoesifLayer {
    handle: Arc<Handle>,
}

impl MoesifLayer {
    /// Create a layer with its own handle; fails fast on invalid
    /// configuration.
    pub fn new(config: MoesifConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        Ok(Self {
            handle: Arc::new(Handle::new(config, sink)?),
        })
    }

    /// Create a layer over an existing handle.
    pub fn from_handle(handle: Arc<Handle>) -> Self {
        Self { handle }
    }

    /// Create a layer over the process-wide handle, if one was installed
    /// with [`crate::install`].
    pub fn global() -> Option<Self> {
        crate::handle().map(Self::from_handle)
    }

    /// The handle this layer hands to its services.
    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }
}

impl<S> Layer<S> for MoesifLayer {
    type Service = MoesifService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MoesifService {
            inner,
            handle: self.handle.clone(),
        }
    }
}

/// Service wrapper produced by [`MoesifLayer`].
#[derive(Clone)]
pub struct MoesifService<S> {
    inner: S,
    handle: Arc<Handle>,
}

impl<S, B, RB> Service<Request<B>> for MoesifService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<RB>> + Clone + Send + 'static,
    S::Error: Send,
    S::Future: Send,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    RB: Body + Send + 'static,
    RB::Data: Send,
    RB::Error: Into<BoxError>,
{
    type Response = Response<Full<Bytes>>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let handle = self.handle.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let config = &handle.config;
            let (mut parts, req_body) = req.into_parts();

            let transaction_id = if config.disable_transaction_id {
                None
            } else {
                let id = parts
                    .headers
                    .get(&TRANSACTION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
                    .map(str::to_owned)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                match HeaderValue::from_str(&id) {
                    Ok(value) => {
                        // Echo on the inbound request so downstream
                        // handlers can correlate their own logs.
                        parts.headers.insert(TRANSACTION_ID_HEADER, value);
                        Some(id)
                    }
                    Err(_) => None,
                }
            };

            let request_time = Utc::now();

            // Duplicate the single-read body: one copy goes to the
            // handler, the other is retained for assembly. A failed read
            // degrades to capturing without the body.
            let (handler_bytes, retained) = match body::tee(req_body).await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to buffer request body");
                    (Bytes::new(), Bytes::new())
                }
            };

            let ctx = RequestContext {
                method: parts.method.clone(),
                uri: parts.uri.clone(),
                headers: parts.headers.clone(),
                body: retained,
            };

            let request = Request::from_parts(parts, Full::new(handler_bytes));
            let response = inner.call(request).await?;
            let response_time = Utc::now();

            let (mut resp_parts, resp_body) = response.into_parts();

            if let Some(id) = transaction_id.as_deref() {
                if let Ok(value) = HeaderValue::from_str(id) {
                    // insert, not append: the identifier must appear once.
                    resp_parts.headers.insert(TRANSACTION_ID_HEADER, value);
                }
            }

            let collected = match resp_body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(err) => {
                    let err: BoxError = err.into();
                    tracing::warn!(error = %err, "failed to buffer response body");
                    Bytes::new()
                }
            };

            // Mirror the response through the capture writer; the bytes
            // the client receives come from the forwarded side, so the
            // mirror property holds by construction.
            let mut writer = CaptureWriter::new(BufferedWriter::new());
            writer.write_status(resp_parts.status);
            if !collected.is_empty() {
                if let Err(err) = writer.write(&collected) {
                    tracing::warn!(error = %err, "response capture write failed");
                }
            }
            let (captured, forwarded) = writer.finish();

            let skip = config.should_skip.as_ref().map_or(false, |f| f(&ctx));
            if skip {
                if config.debug {
                    tracing::debug!("skip predicate matched, event not captured");
                }
            } else {
                dispatch(
                    &handle,
                    &ctx,
                    request_time,
                    response_time,
                    captured.status,
                    &resp_parts.headers,
                    &captured.body,
                );
            }

            Ok(Response::from_parts(
                resp_parts,
                Full::new(forwarded.into_bytes()),
            ))
        })
    }
}

/// Assemble the event, evaluate sampling, and queue it. Sink errors are
/// logged, never propagated.
fn dispatch(
    handle: &Handle,
    ctx: &RequestContext,
    request_time: DateTime<Utc>,
    response_time: DateTime<Utc>,
    status: StatusCode,
    response_headers: &HeaderMap,
    response_body: &[u8],
) {
    let config = &handle.config;

    let user_id = config.identify_user.as_ref().and_then(|f| f(ctx));
    let company_id = config.identify_company.as_ref().and_then(|f| f(ctx));
    let session_token = config.get_session_token.as_ref().and_then(|f| f(ctx));
    let metadata = config.get_metadata.as_ref().map(|f| f(ctx));

    let (request_body, request_encoding) = if config.log_body && !ctx.body.is_empty() {
        let (value, encoding) = body::parse_body(&ctx.body, &config.request_body_masks);
        (Some(value), Some(encoding))
    } else {
        (None, None)
    };
    let (response_body_value, response_encoding) = if config.log_body && !response_body.is_empty()
    {
        let (value, encoding) = body::parse_body(response_body, &config.response_body_masks);
        (Some(value), Some(encoding))
    } else {
        (None, None)
    };

    let decision = handle
        .sampler
        .decide(user_id.as_deref(), company_id.as_deref());
    if !decision.send {
        if config.debug {
            tracing::debug!(
                percentage = decision.percentage,
                draw = decision.draw,
                "event dropped by sampling"
            );
        }
        return;
    }

    let event = Event {
        request: EventRequest {
            time: request_time,
            uri: request_uri(&ctx.uri, &ctx.headers),
            verb: ctx.method.to_string(),
            api_version: config.api_version.clone(),
            ip_address: client_ip(&ctx.headers),
            headers: mask::mask_headers(&ctx.headers, &config.request_header_masks),
            body: request_body,
            transfer_encoding: request_encoding,
            content_length: Some(body::resolve_content_length(&ctx.headers, &ctx.body)),
        },
        response: EventResponse {
            time: response_time,
            status: status.as_u16(),
            headers: mask::mask_headers(response_headers, &config.response_header_masks),
            body: response_body_value,
            transfer_encoding: response_encoding,
            content_length: Some(body::resolve_content_length(
                response_headers,
                response_body,
            )),
        },
        session_token,
        user_id,
        company_id,
        metadata,
        direction: Direction::Incoming,
        weight: decision.weight,
    };

    match handle.sink.enqueue(event) {
        Ok(()) => {
            if config.debug {
                tracing::debug!("event queued for delivery");
            }
        }
        Err(err) => tracing::error!(error = %err, "failed to queue event"),
    }
}

/// Resolve the client IP from forwarding headers.
///
/// Takes the first valid entry of `X-Forwarded-For`, then `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let candidate = first.trim();
            if candidate.parse::<IpAddr>().is_ok() {
                return Some(candidate.to_owned());
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let candidate = real_ip.trim();
        if candidate.parse::<IpAddr>().is_ok() {
            return Some(candidate.to_owned());
        }
    }
    None
}

/// Rebuild the full request URI: `scheme://host/path?query`, defaulting
/// the scheme to `http` and taking the host from the `Host` header when
/// the URI is in origin form.
fn request_uri(uri: &Uri, headers: &HeaderMap) -> String {
    let scheme = uri.scheme_str().unwrap_or("http");
    let host = uri
        .host()
        .map(str::to_owned)
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        })
        .unwrap_or_default();
    let mut out = format!("{scheme}://{host}{}", uri.path());
    if let Some(query) = uri.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}
