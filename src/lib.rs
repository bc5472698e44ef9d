//! Rule-driven mock transport for HTTP clients.
//!
//! Substitutes the network transport behind an HTTP-client contract with a
//! deterministic responder: tests register expectations (method + URI,
//! expected headers, a canned response), hand the transport to the code
//! under test, and every dispatched call resolves against those rules
//! instead of a real network.
//!
//! # Features
//!
//! - **Exact matching**: the first registered rule with the call's
//!   method + URI wins; no patterns, no normalization
//! - **Conditional responses**: ordered header expectations with
//!   per-expectation fallback responses
//! - **Consumption policies**: respond-only-once (with violation hook) and
//!   remove-after-first-match
//! - **Failure simulation**: one-shot fail-next-call override
//! - **Async semantics**: outcomes are observable only after yielding once,
//!   like a real transport
//! - **Declarative rule sets**: YAML fixture files installed in one step
//!
//! # Example
//!
//! ```
//! use mock_transport::{FetchOptions, MockTransport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MockTransport::new();
//!
//! transport
//!     .when("GET", "http://service/greeting")
//!     .with_expected_header("X-AuthToken", "1234")
//!     .otherwise_respond_with(401, "Not Authorized")?
//!     .respond_with(200, serde_json::json!("Hello World"));
//!
//! let response = transport
//!     .fetch(
//!         "http://service/greeting",
//!         FetchOptions::default().header("X-AuthToken", "1234"),
//!     )
//!     .await?;
//!
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.json::<String>()?, "Hello World");
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod error;
mod matcher;
pub mod response;
pub mod rule;
pub mod transport;

pub use builder::RuleBuilder;
pub use config::RuleSet;
pub use error::{ConfigError, TransportError};
pub use response::{Headers, MockResponse, Payload, ResponseSpec};
pub use rule::{Consumption, HeaderRequirement, Rule, ViolationHook};
pub use transport::{FetchOptions, MockTransport, Transport, PROBE_URI};
