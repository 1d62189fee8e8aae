//! Middleware configuration.
//!
//! The configuration surface is an explicit structure with named, typed
//! capability fields: each optional behavior is an `Option` holding a
//! function reference, and an absent field simply disables that behavior.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::event::RequestContext;
use crate::sampling::SamplingPolicy;

/// Callback resolving an identity string (user id, company id, session
/// token) from a captured request.
pub type IdentityFn = Arc<dyn Fn(&RequestContext) -> Option<String> + Send + Sync>;

/// Callback resolving free-form event metadata from a captured request.
pub type MetadataFn = Arc<dyn Fn(&RequestContext) -> Map<String, Value> + Send + Sync>;

/// Predicate deciding whether to skip event capture for a request.
pub type SkipFn = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Configuration for the capture middleware.
///
/// Built with the builder pattern:
///
/// ```ignore
/// use moesif_tower::MoesifConfig;
///
/// let config = MoesifConfig::new("my-application-id")
///     .request_body_masks(["password"])
///     .response_body_masks(["password"])
///     .identify_user(|req| {
///         req.headers
///             .get("x-user-id")
///             .and_then(|v| v.to_str().ok())
///             .map(str::to_owned)
///     })
///     .should_skip(|req| req.uri.path() == "/health");
/// ```
#[derive(Clone)]
pub struct MoesifConfig {
    /// Application identity credential. Required.
    pub(crate) application_id: String,

    /// Optional API version tag copied onto every event.
    pub(crate) api_version: Option<String>,

    /// Whether request/response bodies are captured. Default: true.
    pub(crate) log_body: bool,

    /// Disables transaction-id propagation entirely. Default: false.
    pub(crate) disable_transaction_id: bool,

    /// Verbose capture diagnostics. Default: false.
    pub(crate) debug: bool,

    /// Keys redacted in request bodies.
    pub(crate) request_body_masks: Vec<String>,

    /// Keys redacted in response bodies.
    pub(crate) response_body_masks: Vec<String>,

    /// Header names redacted on the request side.
    pub(crate) request_header_masks: Vec<String>,

    /// Header names redacted on the response side.
    pub(crate) response_header_masks: Vec<String>,

    /// Resolves the user identity for an event.
    pub(crate) identify_user: Option<IdentityFn>,

    /// Resolves the company identity for an event.
    pub(crate) identify_company: Option<IdentityFn>,

    /// Resolves the session token for an event.
    pub(crate) get_session_token: Option<IdentityFn>,

    /// Resolves free-form metadata for an event.
    pub(crate) get_metadata: Option<MetadataFn>,

    /// Skips capture entirely when it returns true.
    pub(crate) should_skip: Option<SkipFn>,

    /// Per-identity sampling policy; absent means sample everything.
    pub(crate) sampling_policy: Option<Arc<dyn SamplingPolicy>>,
}

impl MoesifConfig {
    /// Create a configuration with the required application id and
    /// defaults for everything else (body logging on, transaction-id
    /// propagation on, no masks, no callbacks, full sampling).
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            api_version: None,
            log_body: true,
            disable_transaction_id: false,
            debug: false,
            request_body_masks: Vec::new(),
            response_body_masks: Vec::new(),
            request_header_masks: Vec::new(),
            response_header_masks: Vec::new(),
            identify_user: None,
            identify_company: None,
            get_session_token: None,
            get_metadata: None,
            should_skip: None,
            sampling_policy: None,
        }
    }

    /// Set the API version tag.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Enable or disable body capture.
    pub fn log_body(mut self, enabled: bool) -> Self {
        self.log_body = enabled;
        self
    }

    /// Disable transaction-id propagation.
    pub fn disable_transaction_id(mut self, disabled: bool) -> Self {
        self.disable_transaction_id = disabled;
        self
    }

    /// Enable verbose capture diagnostics.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the request-body mask key list.
    pub fn request_body_masks(
        mut self,
        keys: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.request_body_masks = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the response-body mask key list.
    pub fn response_body_masks(
        mut self,
        keys: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.response_body_masks = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the request-header mask name list.
    pub fn request_header_masks(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.request_header_masks = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the response-header mask name list.
    pub fn response_header_masks(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.response_header_masks = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the user identity callback.
    pub fn identify_user<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.identify_user = Some(Arc::new(f));
        self
    }

    /// Set the company identity callback.
    pub fn identify_company<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.identify_company = Some(Arc::new(f));
        self
    }

    /// Set the session token callback.
    pub fn get_session_token<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.get_session_token = Some(Arc::new(f));
        self
    }

    /// Set the metadata callback.
    pub fn get_metadata<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.get_metadata = Some(Arc::new(f));
        self
    }

    /// Set the skip predicate.
    pub fn should_skip<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.should_skip = Some(Arc::new(f));
        self
    }

    /// Set the per-identity sampling policy.
    pub fn sampling_policy<P: SamplingPolicy>(mut self, policy: P) -> Self {
        self.sampling_policy = Some(Arc::new(policy));
        self
    }

    /// Validate the configuration. Called at construction time so a
    /// missing credential fails before any request is served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_id.trim().is_empty() {
            return Err(ConfigError::MissingApplicationId);
        }
        Ok(())
    }

    /// The configured application id.
    pub fn application_id(&self) -> &str {
        &self.application_id
    }
}

impl std::fmt::Debug for MoesifConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoesifConfig")
            .field("application_id", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("log_body", &self.log_body)
            .field("disable_transaction_id", &self.disable_transaction_id)
            .field("debug", &self.debug)
            .field("request_body_masks", &self.request_body_masks)
            .field("response_body_masks", &self.response_body_masks)
            .field("request_header_masks", &self.request_header_masks)
            .field("response_header_masks", &self.response_header_masks)
            .field("identify_user", &self.identify_user.is_some())
            .field("identify_company", &self.identify_company.is_some())
            .field("get_session_token", &self.get_session_token.is_some())
            .field("get_metadata", &self.get_metadata.is_some())
            .field("should_skip", &self.should_skip.is_some())
            .field("sampling_policy", &self.sampling_policy.is_some())
            .finish()
    }
}
