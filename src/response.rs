//! The HTTP-message contract: headers, payloads, and response shapes.
//!
//! The engine treats request and response values as plain data. [`Headers`]
//! mirrors a fetch-style header container (insertion-ordered,
//! case-insensitive lookup), [`Payload`] carries a body as text, a
//! structured JSON value, or raw bytes, and [`MockResponse`] is what a
//! resolved call hands back to the consumer.

use serde::de::DeserializeOwned;

/// Ordered header container with case-insensitive name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing an existing entry with the same name
    /// (compared case-insensitively) or appending a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Fluent variant of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

/// A request or response body: raw text, a structured JSON value, or bytes.
///
/// Serialization is resolved when the byte form is asked for, not deferred
/// into the matching path.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Serialized byte form of the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Text(content) => content.as_bytes().to_vec(),
            // Serializing a tree-shaped Value cannot fail.
            Payload::Json(content) => serde_json::to_vec(content).unwrap_or_default(),
            Payload::Bytes(content) => content.clone(),
        }
    }
}

impl From<&str> for Payload {
    fn from(content: &str) -> Self {
        Payload::Text(content.to_string())
    }
}

impl From<String> for Payload {
    fn from(content: String) -> Self {
        Payload::Text(content)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(content: serde_json::Value) -> Self {
        Payload::Json(content)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(content: Vec<u8>) -> Self {
        Payload::Bytes(content)
    }
}

/// A configured response: terminal (status, body, headers) or a bare
/// fallback (status and status text only).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSpec {
    pub status: u16,
    pub status_text: String,
    pub body: Option<Payload>,
    pub headers: Headers,
}

impl ResponseSpec {
    /// Terminal response with a body and an empty status text.
    pub fn new(status: u16, body: impl Into<Payload>) -> Self {
        Self {
            status,
            status_text: String::new(),
            body: Some(body.into()),
            headers: Headers::new(),
        }
    }

    /// Bodyless response, used for fallbacks and the generic not-found.
    pub fn bare(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: None,
            headers: Headers::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// What a resolved call observes.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    status: u16,
    status_text: String,
    headers: Headers,
    body: Option<Payload>,
}

impl MockResponse {
    pub(crate) fn from_spec(spec: &ResponseSpec) -> Self {
        Self {
            status: spec.status,
            status_text: spec.status_text.clone(),
            headers: spec.headers.clone(),
            body: spec.body.clone(),
        }
    }

    /// The generic not-found response: no rule matched, or an expected
    /// header was unmet with no fallback configured.
    pub(crate) fn not_found() -> Self {
        Self::from_spec(&ResponseSpec::bare(404, "Not Found"))
    }

    /// Truthy probe answered for the interception sentinel.
    pub(crate) fn probe() -> Self {
        Self {
            status: 200,
            status_text: String::new(),
            headers: Headers::new(),
            body: Some(Payload::Json(serde_json::Value::Bool(true))),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&Payload> {
        self.body.as_ref()
    }

    /// Deserialize the body payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        match &self.body {
            Some(Payload::Json(value)) => serde_json::from_value(value.clone()),
            Some(Payload::Text(content)) => serde_json::from_str(content),
            Some(Payload::Bytes(content)) => serde_json::from_slice(content),
            None => serde_json::from_slice(&[]),
        }
    }

    /// Body as text; lossy for byte payloads, empty when absent.
    pub fn text(&self) -> String {
        match &self.body {
            Some(Payload::Text(content)) => content.clone(),
            Some(Payload::Json(value)) => value.to_string(),
            Some(Payload::Bytes(content)) => String::from_utf8_lossy(content).into_owned(),
            None => String::new(),
        }
    }
}
