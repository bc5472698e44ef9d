//! Declarative rule sets.
//!
//! Expectations can be described in YAML fixture files and installed into a
//! [`MockTransport`] in one step, alongside rules registered through the
//! fluent builder.
//!
//! ```yaml
//! rules:
//!   - method: GET
//!     uri: http://service/greeting
//!     expect_headers:
//!       - name: X-AuthToken
//!         value: "1234"
//!         otherwise:
//!           status: 401
//!           status_text: Not Authorized
//!     response:
//!       status: 200
//!       body:
//!         type: json
//!         content: "Hello World"
//! ```

use crate::response::{Headers, Payload, ResponseSpec};
use crate::rule::{Consumption, HeaderRequirement, Rule};
use crate::transport::MockTransport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A declarative set of rules.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleSet {
    /// Load a rule set from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a rule set from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let set: Self = serde_yaml::from_str(yaml)?;
        set.validate()?;
        Ok(set)
    }

    /// Validate every definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, rule) in self.rules.iter().enumerate() {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("rule {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Append every definition to the transport's registry, in order.
    /// Body decoding happens here, not at dispatch time.
    pub fn install(&self, transport: &MockTransport) -> anyhow::Result<()> {
        for (i, definition) in self.rules.iter().enumerate() {
            let rule = definition
                .to_rule()
                .map_err(|e| anyhow::anyhow!("rule {}: {}", i, e))?;
            transport.install(rule);
        }
        Ok(())
    }
}

/// One declarative rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    /// Exact-match method token.
    pub method: String,

    /// Exact-match URI token.
    pub uri: String,

    /// Expected request headers, evaluated in order.
    #[serde(default)]
    pub expect_headers: Vec<HeaderExpectation>,

    /// Response returned on a full match.
    pub response: ResponseDefinition,

    /// Fail the call when this rule matches more than once.
    #[serde(default)]
    pub only_once: bool,

    /// Remove this rule after its first successful match.
    #[serde(default)]
    pub remove_after_match: bool,
}

impl RuleDefinition {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.method.is_empty() {
            anyhow::bail!("method cannot be empty");
        }
        if self.uri.is_empty() {
            anyhow::bail!("uri cannot be empty");
        }
        self.response.validate()?;
        for expectation in &self.expect_headers {
            if expectation.name.is_empty() {
                anyhow::bail!("expected header name cannot be empty");
            }
            if let Some(fallback) = &expectation.otherwise {
                validate_status(fallback.status)?;
            }
        }
        Ok(())
    }

    fn to_rule(&self) -> anyhow::Result<Rule> {
        let expected_headers = self
            .expect_headers
            .iter()
            .map(|expectation| HeaderRequirement {
                name: expectation.name.clone(),
                expected: expectation.value.clone(),
                fallback: expectation
                    .otherwise
                    .as_ref()
                    .map(|f| ResponseSpec::bare(f.status, f.status_text.clone())),
            })
            .collect();

        let mut headers = Headers::new();
        for (name, value) in &self.response.headers {
            headers.set(name, value);
        }

        let body = match &self.response.body {
            Some(definition) => Some(definition.to_payload()?),
            None => None,
        };

        Ok(Rule {
            id: 0,
            method: self.method.clone(),
            uri: self.uri.clone(),
            expected_headers,
            response: ResponseSpec {
                status: self.response.status,
                status_text: self.response.status_text.clone(),
                body,
                headers,
            },
            consumption: Consumption {
                only_once: self.only_once,
                remove_after_match: self.remove_after_match,
                on_violation: None,
            },
            match_count: 0,
        })
    }
}

/// One expected request header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderExpectation {
    pub name: String,
    pub value: String,

    /// Fallback returned when the expectation is not met.
    #[serde(default)]
    pub otherwise: Option<FallbackDefinition>,
}

/// Status line of a fallback response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackDefinition {
    pub status: u16,

    #[serde(default)]
    pub status_text: String,
}

/// Response part of a declarative rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub status_text: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: Option<BodyDefinition>,
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_status(self.status)
    }
}

fn validate_status(status: u16) -> anyhow::Result<()> {
    if !(100..=599).contains(&status) {
        anyhow::bail!("invalid status code: {}", status);
    }
    Ok(())
}

/// Body of a declarative response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyDefinition {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
}

impl BodyDefinition {
    /// Resolve to a payload; base64 content is decoded here.
    pub fn to_payload(&self) -> anyhow::Result<Payload> {
        match self {
            BodyDefinition::Text { content } => Ok(Payload::Text(content.clone())),
            BodyDefinition::Json { content } => Ok(Payload::Json(content.clone())),
            BodyDefinition::Base64 { content } => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("invalid base64: {}", e))?;
                Ok(Payload::Bytes(bytes))
            }
        }
    }
}
