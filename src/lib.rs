//! # moesif-tower
//!
//! Tower middleware that captures HTTP request/response exchanges as
//! structured analytics events and queues them to a delivery sink.
//!
//! The middleware duplicates single-read request bodies so both the
//! handler and the event assembler get a full pass, mirrors response
//! writes through a capture wrapper without altering what the client
//! receives, redacts configured header and body keys, and applies
//! per-identity statistical sampling with weighted-event accounting so
//! downstream aggregate counts stay correct under partial capture.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use moesif_tower::{MoesifConfig, MoesifLayer, TracingSink};
//!
//! let config = MoesifConfig::new("my-application-id")
//!     .request_body_masks(["password"])
//!     .response_body_masks(["password"])
//!     .should_skip(|req| req.uri.path() == "/health");
//!
//! let layer = MoesifLayer::new(config, Arc::new(TracingSink))?;
//! let app = tower::ServiceBuilder::new().layer(layer).service(handler);
//! ```
//!
//! The delivery sink ([`EventSink`]) is the crate boundary: batching,
//! retry, and the collector transport live behind it.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::sync::{Arc, OnceLock};

pub mod body;
pub mod capture;
pub mod config;
pub mod error;
pub mod event;
pub mod layer;
pub mod mask;
pub mod sampling;
pub mod sink;

pub use config::MoesifConfig;
pub use error::{ConfigError, SinkError};
pub use event::{CompanyUpdate, Direction, Event, RequestContext, UserUpdate};
pub use layer::{MoesifLayer, MoesifService, TRANSACTION_ID_HEADER};
pub use sampling::{FixedRate, SampleAll, Sampler, SamplingDecision, SamplingPolicy};
pub use sink::{EventSink, MemorySink, TracingSink};

/// Shared, read-only middleware state: the effective configuration, the
/// delivery sink, and the sampler derived from the configured policy.
///
/// A handle can be injected directly into [`MoesifLayer`]s, or installed
/// process-wide once via [`install`].
pub struct Handle {
    pub(crate) config: MoesifConfig,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) sampler: Sampler,
}

impl Handle {
    /// Build a handle, validating the configuration first.
    pub fn new(config: MoesifConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, sink))
    }

    fn build(config: MoesifConfig, sink: Arc<dyn EventSink>) -> Self {
        let sampler = match &config.sampling_policy {
            Some(policy) => Sampler::new(policy.clone()),
            None => Sampler::default(),
        };
        Self {
            config,
            sink,
            sampler,
        }
    }

    /// The effective configuration.
    pub fn config(&self) -> &MoesifConfig {
        &self.config
    }

    /// Queue a user identity update out of band. Failures are logged,
    /// never fatal.
    pub fn update_user(&self, user: UserUpdate) {
        if let Err(err) = self.sink.enqueue_user(user) {
            tracing::error!(error = %err, "failed to queue user update");
        } else if self.config.debug {
            tracing::debug!("user update queued");
        }
    }

    /// Queue a batch of user identity updates.
    pub fn update_users(&self, users: Vec<UserUpdate>) {
        if let Err(err) = self.sink.enqueue_users(users) {
            tracing::error!(error = %err, "failed to queue user updates");
        } else if self.config.debug {
            tracing::debug!("user updates queued");
        }
    }

    /// Queue a company identity update out of band.
    pub fn update_company(&self, company: CompanyUpdate) {
        if let Err(err) = self.sink.enqueue_company(company) {
            tracing::error!(error = %err, "failed to queue company update");
        } else if self.config.debug {
            tracing::debug!("company update queued");
        }
    }

    /// Queue a batch of company identity updates.
    pub fn update_companies(&self, companies: Vec<CompanyUpdate>) {
        if let Err(err) = self.sink.enqueue_companies(companies) {
            tracing::error!(error = %err, "failed to queue company updates");
        } else if self.config.debug {
            tracing::debug!("company updates queued");
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Arc<Handle>> = OnceLock::new();

/// Install the process-wide handle.
///
/// The first successful call wins; concurrent callers observe either the
/// fully installed handle or none, never partial state. Later calls still
/// validate their configuration but otherwise leave the installed handle
/// untouched and return it.
pub fn install(config: MoesifConfig, sink: Arc<dyn EventSink>) -> Result<Arc<Handle>, ConfigError> {
    config.validate()?;
    Ok(GLOBAL
        .get_or_init(move || Arc::new(Handle::build(config, sink)))
        .clone())
}

/// The installed process-wide handle, if any.
pub fn handle() -> Option<Arc<Handle>> {
    GLOBAL.get().cloned()
}
