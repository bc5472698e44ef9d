//! Error taxonomy.
//!
//! Configuration mistakes fail fast at registration time. Everything that
//! happens while a call is in flight is reported through the call's own
//! resolution, never through a side channel.

use thiserror::Error;

/// A builder method was invoked in an invalid sequence.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `otherwise_respond_with` requires a preceding `with_expected_header`.
    #[error("no expected header precedes the fallback response")]
    NoExpectedHeader,

    /// `respond_only_once` / `and_then_remove` require a registered response.
    #[error("a response must be registered before attaching a consumption policy")]
    NotRegistered,
}

/// Failure path of a dispatched call.
///
/// These are the only ways a [`fetch`](crate::MockTransport::fetch) future
/// resolves to an error. Unmatched calls and unmet header expectations
/// resolve *successfully* with a 404 or fallback response instead, so code
/// under test experiences the mock the way it would a real transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The one-shot failure override consumed this call.
    #[error("failing, as requested")]
    FailureRequested,

    /// A respond-only-once rule matched a second time.
    #[error("uri called more than once")]
    CalledMoreThanOnce,

    /// An internal fault (e.g. a panicking violation hook) was converted
    /// into a call failure.
    #[error("{0}")]
    Internal(String),
}
