//! Rule data model and the ordered registry.

use crate::response::ResponseSpec;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Hook invoked when a respond-only-once rule matches a second time.
/// Receives a snapshot of the violating rule.
pub type ViolationHook = Arc<dyn Fn(&Rule) + Send + Sync>;

/// One expected request header, with an optional fallback response used
/// when the expectation is not met.
#[derive(Debug, Clone)]
pub struct HeaderRequirement {
    pub name: String,
    pub expected: String,
    pub fallback: Option<ResponseSpec>,
}

/// Post-match consumption policy.
///
/// `only_once` and `remove_after_match` are independent axes and may both
/// be set. The only-once check runs before removal.
#[derive(Clone, Default)]
pub struct Consumption {
    pub only_once: bool,
    pub remove_after_match: bool,
    pub on_violation: Option<ViolationHook>,
}

impl fmt::Debug for Consumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumption")
            .field("only_once", &self.only_once)
            .field("remove_after_match", &self.remove_after_match)
            .field("on_violation", &self.on_violation.is_some())
            .finish()
    }
}

/// A registered expectation: method + URI, ordered header requirements,
/// terminal response, and consumption policy.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) id: u64,
    pub(crate) method: String,
    pub(crate) uri: String,
    pub(crate) expected_headers: Vec<HeaderRequirement>,
    pub(crate) response: ResponseSpec,
    pub(crate) consumption: Consumption,
    pub(crate) match_count: u64,
}

impl Rule {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn expected_headers(&self) -> &[HeaderRequirement] {
        &self.expected_headers
    }

    pub fn response(&self) -> &ResponseSpec {
        &self.response
    }

    pub fn consumption(&self) -> &Consumption {
        &self.consumption
    }

    /// Times this rule fully matched (header requirements included).
    pub fn match_count(&self) -> u64 {
        self.match_count
    }
}

/// Insertion-ordered collection of active rules.
///
/// Rules carry a monotonically assigned id that stays stable across
/// removals, unlike their position in the scan order. Ids are never reused,
/// not even after [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) rules: Vec<Rule>,
    next_id: u64,
}

impl Registry {
    /// Append a rule to the tail of the scan order and assign its id.
    pub(crate) fn register(&mut self, mut rule: Rule) -> u64 {
        self.next_id += 1;
        rule.id = self.next_id;
        debug!(method = %rule.method, uri = %rule.uri, id = rule.id, "rule registered");
        self.rules.push(rule);
        self.next_id
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|rule| rule.id == id)
    }

    /// Index of the first rule whose method and URI equal the call's,
    /// scanning head to tail. Exact string comparison, no normalization.
    pub(crate) fn first_match(&self, method: &str, uri: &str) -> Option<usize> {
        self.rules
            .iter()
            .position(|rule| rule.method == method && rule.uri == uri)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Discard every rule atomically.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Read-only snapshot of the active rules.
    pub fn snapshot(&self) -> Vec<Rule> {
        self.rules.to_vec()
    }
}
