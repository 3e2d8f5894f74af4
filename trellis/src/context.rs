use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use uuid::Uuid;

use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};

/// Response header carrying the request's trace id.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Per-request bookkeeping created when the router accepts a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub trace_id: String,
    pub start_time: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What a service asked the chain to do after it returns.
#[derive(Debug)]
pub(crate) enum NextSignal {
    Continue,
    Fail(Error),
}

/// Lets a service continue the middleware chain, or fail it, once it is done.
///
/// The dispatcher reads the recorded signal after the method returns; the
/// last call wins.
#[derive(Clone, Default)]
pub struct NextCallback {
    signal: Arc<Mutex<Option<NextSignal>>>,
}

impl NextCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue with the next matching middleware.
    pub fn call(&self) {
        self.set(NextSignal::Continue);
    }

    /// Forward `err` to the error channel instead of continuing.
    pub fn fail(&self, err: Error) {
        self.set(NextSignal::Fail(err));
    }

    pub fn was_called(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn take(&self) -> Option<NextSignal> {
        self.lock().take()
    }

    fn set(&self, signal: NextSignal) {
        *self.lock() = Some(signal);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<NextSignal>> {
        self.signal.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for NextCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextCallback")
            .field("called", &self.was_called())
            .finish()
    }
}

/// Everything a service can see about the request being served.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub next: NextCallback,
    /// Negotiated response language.
    pub language: Option<String>,
    /// Negotiated response media type.
    pub accept: Option<String>,
    pub trace_id: String,
}
