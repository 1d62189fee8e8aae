//! Error types for the capture pipeline.
//!
//! Nothing in this crate is allowed to abort an in-flight request: capture
//! failures degrade to "less data captured" and are surfaced through these
//! types only as far as the nearest log statement.

/// Boxed error from a generic body implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised while validating configuration.
///
/// Configuration errors are the one category that must fail fast, at
/// construction time, before any request is served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The application identity credential is missing or empty.
    #[error("application id is required")]
    MissingApplicationId,
}

/// Error raised by a delivery sink when an event or identity update cannot
/// be queued.
///
/// Sink errors are logged by the middleware and never propagated to the
/// client; retry is the sink's own responsibility.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink is closed or its internal state is unavailable.
    #[error("delivery sink unavailable: {0}")]
    Unavailable(String),

    /// The sink rejected the payload during basic validation.
    #[error("payload rejected: {0}")]
    Rejected(String),
}

/// Error raised while duplicating or draining a body stream.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Reading the underlying stream failed before exhaustion.
    #[error("failed to read body: {0}")]
    Body(#[source] BoxError),
}
