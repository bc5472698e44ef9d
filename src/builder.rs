//! Fluent construction of rules.

use crate::error::ConfigError;
use crate::response::{Headers, Payload, ResponseSpec};
use crate::rule::{Consumption, HeaderRequirement, Rule, ViolationHook};
use crate::transport::{lock, SharedState};
use std::sync::Arc;

/// Fluent builder for one rule, created by
/// [`MockTransport::when`](crate::MockTransport::when).
///
/// Header requirements accumulate on an unregistered shell; `respond_with`
/// finalizes the rule and appends it to the registry tail. Until then the
/// rule is inert and invisible to the matcher. Methods invoked after
/// registration address the registered rule through its id, so the chain
/// stays valid while other rules are appended.
pub struct RuleBuilder {
    state: SharedState,
    method: String,
    uri: String,
    pending_headers: Vec<HeaderRequirement>,
    registered: Option<u64>,
}

impl RuleBuilder {
    pub(crate) fn new(state: SharedState, method: String, uri: String) -> Self {
        Self {
            state,
            method,
            uri,
            pending_headers: Vec::new(),
            registered: None,
        }
    }

    /// Append an expected header. Requirements are evaluated in the order
    /// they were added; the first unmet one decides the outcome.
    pub fn with_expected_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let requirement = HeaderRequirement {
            name: name.into(),
            expected: value.into(),
            fallback: None,
        };
        match self.registered {
            Some(id) => {
                let mut state = lock(&self.state);
                if let Some(rule) = state.registry.get_mut(id) {
                    rule.expected_headers.push(requirement);
                }
            }
            None => self.pending_headers.push(requirement),
        }
        self
    }

    /// Attach a fallback response to the most recently added expected
    /// header, returned when that expectation is not met.
    pub fn otherwise_respond_with(
        mut self,
        status: u16,
        status_text: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let fallback = ResponseSpec::bare(status, status_text);
        let attached = match self.registered {
            Some(id) => {
                let mut state = lock(&self.state);
                state
                    .registry
                    .get_mut(id)
                    .and_then(|rule| rule.expected_headers.last_mut())
                    .map(|requirement| requirement.fallback = Some(fallback))
                    .is_some()
            }
            None => match self.pending_headers.last_mut() {
                Some(requirement) => {
                    requirement.fallback = Some(fallback);
                    true
                }
                None => false,
            },
        };
        if attached {
            Ok(self)
        } else {
            Err(ConfigError::NoExpectedHeader)
        }
    }

    /// Finalize the response and register the rule. The rule only becomes
    /// discoverable by the matcher from this point on.
    pub fn respond_with(self, status: u16, body: impl Into<Payload>) -> Self {
        self.respond_with_headers(status, body, Headers::new())
    }

    /// [`respond_with`](Self::respond_with) with response headers attached.
    pub fn respond_with_headers(
        mut self,
        status: u16,
        body: impl Into<Payload>,
        headers: Headers,
    ) -> Self {
        let rule = Rule {
            id: 0,
            method: self.method.clone(),
            uri: self.uri.clone(),
            expected_headers: self.pending_headers.clone(),
            response: ResponseSpec::new(status, body).with_headers(headers),
            consumption: Consumption::default(),
            match_count: 0,
        };
        let id = lock(&self.state).registry.register(rule);
        self.registered = Some(id);
        self
    }

    /// Restrict the registered rule to a single successful match; later
    /// full matches fail the call.
    pub fn respond_only_once(self) -> Result<Self, ConfigError> {
        self.set_consumption(|consumption| consumption.only_once = true)
    }

    /// [`respond_only_once`](Self::respond_only_once) with a hook invoked
    /// on each violating call. The call fails either way.
    pub fn respond_only_once_with(
        self,
        hook: impl Fn(&Rule) + Send + Sync + 'static,
    ) -> Result<Self, ConfigError> {
        let hook: ViolationHook = Arc::new(hook);
        self.set_consumption(move |consumption| {
            consumption.only_once = true;
            consumption.on_violation = Some(hook);
        })
    }

    /// Remove the registered rule from the registry after its first
    /// successful match.
    pub fn and_then_remove(self) -> Result<Self, ConfigError> {
        self.set_consumption(|consumption| consumption.remove_after_match = true)
    }

    fn set_consumption(self, apply: impl FnOnce(&mut Consumption)) -> Result<Self, ConfigError> {
        let id = self.registered.ok_or(ConfigError::NotRegistered)?;
        let mut state = lock(&self.state);
        if let Some(rule) = state.registry.get_mut(id) {
            apply(&mut rule.consumption);
        }
        drop(state);
        Ok(self)
    }
}
