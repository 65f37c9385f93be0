//! Request context and time source for gateway operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-request context propagated through every gateway operation down to the
/// directory client.
///
/// Carries a request identifier for logging and a shared cancellation flag.
/// Cloning the context shares the flag, so a transport can cancel an
/// in-flight request from another task.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request
    pub request_id: String,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    /// Create a context with a specific request ID.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a context with a generated request ID.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Request cancellation of all operations using this context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::with_generated_id()
    }
}

/// Time source consumed by the core.
///
/// Injected so tests can pin timestamps; production code uses
/// [`SystemClock`].
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let ctx = RequestContext::with_generated_id();
        let clone = ctx.clone();
        assert!(!clone.is_cancelled());
        ctx.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn generated_request_ids_are_unique() {
        assert_ne!(
            RequestContext::with_generated_id().request_id,
            RequestContext::with_generated_id().request_id
        );
    }
}
