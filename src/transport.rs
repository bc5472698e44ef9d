//! Dispatcher, override state, and the transport seam.

use crate::builder::RuleBuilder;
use crate::error::TransportError;
use crate::matcher::{dispatch, CallDescription};
use crate::response::{Headers, MockResponse, Payload};
use crate::rule::{Registry, Rule};
use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Sentinel target answered with an immediately-ready truthy probe, letting
/// callers detect that interception is active. Probe calls never touch the
/// override flag or the registry.
pub const PROBE_URI: &str = "isMocked";

/// Options accompanying a [`MockTransport::fetch`] call.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Defaults to `"GET"`.
    pub method: String,
    pub headers: Option<Headers>,
    /// Carried for interface parity; never consulted during matching.
    pub body: Option<Payload>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: None,
            body: None,
        }
    }
}

impl FetchOptions {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).set(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Payload>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// The transport contract an HTTP client binds to.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        uri: &str,
        options: FetchOptions,
    ) -> Result<MockResponse, TransportError>;
}

pub(crate) struct EngineState {
    pub(crate) registry: Registry,
    pub(crate) fail_next: bool,
}

pub(crate) type SharedState = Arc<Mutex<EngineState>>;

// Poisoned locks are recovered; engine state stays usable after a test panics.
pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rule-driven replacement for a real network transport.
///
/// Owns the registry of expectations and the one-shot failure override.
/// Cloning yields another handle to the same engine state, so a transport
/// can be handed to the code under test while the test keeps configuring
/// it. State lives for the process/test run only; call
/// [`clear`](Self::clear) between independent test cases.
#[derive(Clone)]
pub struct MockTransport {
    state: SharedState,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        debug!("mock transport initialized");
        Self {
            state: Arc::new(Mutex::new(EngineState {
                registry: Registry::default(),
                fail_next: false,
            })),
        }
    }

    /// Begin a new rule bound to `method` + `uri` (exact-match tokens).
    pub fn when(&self, method: impl Into<String>, uri: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(self.state.clone(), method.into(), uri.into())
    }

    /// Discard every registered rule atomically.
    pub fn clear(&self) {
        lock(&self.state).registry.clear();
    }

    /// Read-only snapshot of the active rules, for diagnostic assertions.
    pub fn inspect(&self) -> Vec<Rule> {
        lock(&self.state).registry.snapshot()
    }

    /// Force the very next dispatched call to fail, whatever it targets.
    /// Consumed by exactly one call.
    pub fn fail_next_call(&self) {
        info!("next call will fail");
        lock(&self.state).fail_next = true;
    }

    pub(crate) fn install(&self, rule: Rule) {
        lock(&self.state).registry.register(rule);
    }

    /// Dispatch a call.
    ///
    /// The override check and all matching run synchronously here, against
    /// the registry as it stands right now; registry mutation performed by
    /// this call (e.g. remove-after-match) affects later dispatches, never
    /// calls already in flight. The returned future yields exactly once
    /// before exposing the outcome, so a caller can never observe
    /// resolution within the same synchronous block.
    pub fn fetch(
        &self,
        uri: impl Into<String>,
        options: FetchOptions,
    ) -> impl Future<Output = Result<MockResponse, TransportError>> + Send + 'static {
        let uri = uri.into();

        let (resolution, deferred) = if uri == PROBE_URI {
            debug!("interception probe answered");
            (Ok(MockResponse::probe()), false)
        } else {
            (self.dispatch_now(uri, options), true)
        };

        async move {
            if deferred {
                tokio::task::yield_now().await;
            }
            resolution
        }
    }

    fn dispatch_now(
        &self,
        uri: String,
        options: FetchOptions,
    ) -> Result<MockResponse, TransportError> {
        let call = CallDescription {
            method: options.method,
            uri,
            headers: options.headers,
        };

        let outcome = {
            let mut state = lock(&self.state);
            if state.fail_next {
                state.fail_next = false;
                warn!(method = %call.method, uri = %call.uri, "failing, as requested");
                return Err(TransportError::FailureRequested);
            }
            dispatch(&mut state.registry, &call)
        };

        // Hooks run unlocked: a reentrant hook may call back into the engine.
        if let Some((hook, rule)) = outcome.violation {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| hook(&rule))) {
                let message = panic_message(panic);
                warn!(uri = %rule.uri(), message = %message, "violation hook panicked");
                return Err(TransportError::Internal(message));
            }
        }

        outcome.resolution
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(
        &self,
        uri: &str,
        options: FetchOptions,
    ) -> Result<MockResponse, TransportError> {
        MockTransport::fetch(self, uri, options).await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "violation hook panicked".to_string()
    }
}
