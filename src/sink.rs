//! Delivery sink boundary.
//!
//! The sink owns batching, retry, and the actual transport to the
//! collector; the middleware only requires that `enqueue` is non-blocking
//! beyond basic validation. Implementations for real transports live
//! outside this crate.

use std::sync::Mutex;

use crate::error::SinkError;
use crate::event::{CompanyUpdate, Event, UserUpdate};

/// Asynchronous delivery pipeline for events and identity updates.
///
/// Errors signal that the payload could not be queued; the caller logs
/// them and moves on, and retry is the sink's internal concern.
pub trait EventSink: Send + Sync + 'static {
    /// Queue one event for transmission.
    fn enqueue(&self, event: Event) -> Result<(), SinkError>;

    /// Queue a user identity update.
    fn enqueue_user(&self, user: UserUpdate) -> Result<(), SinkError>;

    /// Queue a batch of user identity updates.
    fn enqueue_users(&self, users: Vec<UserUpdate>) -> Result<(), SinkError> {
        for user in users {
            self.enqueue_user(user)?;
        }
        Ok(())
    }

    /// Queue a company identity update.
    fn enqueue_company(&self, company: CompanyUpdate) -> Result<(), SinkError>;

    /// Queue a batch of company identity updates.
    fn enqueue_companies(&self, companies: Vec<CompanyUpdate>) -> Result<(), SinkError> {
        for company in companies {
            self.enqueue_company(company)?;
        }
        Ok(())
    }
}

/// Sink that retains everything in memory.
///
/// Intended for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
    users: Mutex<Vec<UserUpdate>>,
    companies: Mutex<Vec<CompanyUpdate>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the queued events.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of queued events.
    pub fn event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Snapshot of the queued user updates.
    pub fn users(&self) -> Vec<UserUpdate> {
        self.users.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Snapshot of the queued company updates.
    pub fn companies(&self) -> Vec<CompanyUpdate> {
        self.companies.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn enqueue(&self, event: Event) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|err| SinkError::Unavailable(err.to_string()))?
            .push(event);
        Ok(())
    }

    fn enqueue_user(&self, user: UserUpdate) -> Result<(), SinkError> {
        if user.user_id.is_empty() {
            return Err(SinkError::Rejected("user id is empty".into()));
        }
        self.users
            .lock()
            .map_err(|err| SinkError::Unavailable(err.to_string()))?
            .push(user);
        Ok(())
    }

    fn enqueue_company(&self, company: CompanyUpdate) -> Result<(), SinkError> {
        if company.company_id.is_empty() {
            return Err(SinkError::Rejected("company id is empty".into()));
        }
        self.companies
            .lock()
            .map_err(|err| SinkError::Unavailable(err.to_string()))?
            .push(company);
        Ok(())
    }
}

/// Sink that emits events to the `tracing` subscriber instead of a
/// collector. Useful as a stand-in while wiring up a deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn enqueue(&self, event: Event) -> Result<(), SinkError> {
        tracing::debug!(
            verb = %event.request.verb,
            uri = %event.request.uri,
            status = event.response.status,
            weight = event.weight,
            "captured event"
        );
        Ok(())
    }

    fn enqueue_user(&self, user: UserUpdate) -> Result<(), SinkError> {
        tracing::debug!(user_id = %user.user_id, "user update");
        Ok(())
    }

    fn enqueue_company(&self, company: CompanyUpdate) -> Result<(), SinkError> {
        tracing::debug!(company_id = %company.company_id, "company update");
        Ok(())
    }
}
