//! Matching and dispatch decisions.
//!
//! Walks the registry head to tail for the first rule whose method and URI
//! equal the call's, evaluates that candidate's header requirements in
//! insertion order, and applies the consumption policy on a full match.
//! First-match-wins: once a candidate is selected, no later rule is tried.

use crate::error::TransportError;
use crate::response::{Headers, MockResponse};
use crate::rule::{Registry, Rule, ViolationHook};
use tracing::{debug, warn};

/// An inbound call as seen by the matcher. Bodies are never consulted.
#[derive(Debug, Clone)]
pub(crate) struct CallDescription {
    pub(crate) method: String,
    pub(crate) uri: String,
    pub(crate) headers: Option<Headers>,
}

/// Outcome of evaluating a candidate's header requirements.
enum RequirementOutcome {
    Passed,
    FailedWith(MockResponse),
}

/// What the dispatcher should do with a call, plus a violation hook to run
/// once the engine state is unlocked.
pub(crate) struct Dispatch {
    pub(crate) resolution: Result<MockResponse, TransportError>,
    pub(crate) violation: Option<(ViolationHook, Rule)>,
}

impl Dispatch {
    fn respond(response: MockResponse) -> Self {
        Self {
            resolution: Ok(response),
            violation: None,
        }
    }
}

/// Resolve a call against the registry.
pub(crate) fn dispatch(registry: &mut Registry, call: &CallDescription) -> Dispatch {
    let Some(index) = registry.first_match(&call.method, &call.uri) else {
        warn!(method = %call.method, uri = %call.uri, "no matching rule");
        return Dispatch::respond(MockResponse::not_found());
    };

    if let RequirementOutcome::FailedWith(response) =
        evaluate_requirements(&registry.rules[index], call.headers.as_ref())
    {
        debug!(
            method = %call.method,
            uri = %call.uri,
            status = response.status(),
            "header requirement unmet"
        );
        return Dispatch::respond(response);
    }

    let rule = &mut registry.rules[index];
    rule.match_count += 1;

    if rule.consumption.only_once && rule.match_count > 1 {
        warn!(
            method = %call.method,
            uri = %call.uri,
            count = rule.match_count,
            "respond-only-once rule matched again"
        );
        let violation = rule
            .consumption
            .on_violation
            .clone()
            .map(|hook| (hook, rule.clone()));
        return Dispatch {
            resolution: Err(TransportError::CalledMoreThanOnce),
            violation,
        };
    }

    let response = MockResponse::from_spec(&rule.response);
    debug!(
        method = %call.method,
        uri = %call.uri,
        status = response.status(),
        "call matched rule"
    );
    if rule.consumption.remove_after_match {
        let removed = registry.rules.remove(index);
        debug!(uri = %removed.uri, id = removed.id, "rule removed after match");
    }
    Dispatch::respond(response)
}

/// Sequential fold over the candidate's requirements: the first unmet
/// requirement decides the outcome and later ones are never consulted.
fn evaluate_requirements(rule: &Rule, headers: Option<&Headers>) -> RequirementOutcome {
    rule.expected_headers
        .iter()
        .fold(RequirementOutcome::Passed, |outcome, requirement| {
            match outcome {
                RequirementOutcome::FailedWith(_) => outcome,
                RequirementOutcome::Passed => {
                    let satisfied = headers
                        .and_then(|h| h.get(&requirement.name))
                        .is_some_and(|value| value == requirement.expected);
                    if satisfied {
                        RequirementOutcome::Passed
                    } else {
                        let response = match &requirement.fallback {
                            Some(spec) => MockResponse::from_spec(spec),
                            None => MockResponse::not_found(),
                        };
                        RequirementOutcome::FailedWith(response)
                    }
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Payload, ResponseSpec};
    use crate::rule::{Consumption, HeaderRequirement};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rule(method: &str, uri: &str) -> Rule {
        Rule {
            id: 0,
            method: method.to_string(),
            uri: uri.to_string(),
            expected_headers: Vec::new(),
            response: ResponseSpec::new(200, Payload::Text("ok".to_string())),
            consumption: Consumption::default(),
            match_count: 0,
        }
    }

    fn requirement(name: &str, expected: &str, fallback: Option<ResponseSpec>) -> HeaderRequirement {
        HeaderRequirement {
            name: name.to_string(),
            expected: expected.to_string(),
            fallback,
        }
    }

    fn call(method: &str, uri: &str) -> CallDescription {
        CallDescription {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: None,
        }
    }

    fn call_with(method: &str, uri: &str, headers: &[(&str, &str)]) -> CallDescription {
        CallDescription {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: Some(headers.iter().copied().collect()),
        }
    }

    #[test]
    fn empty_registry_resolves_not_found() {
        let mut registry = Registry::default();
        let outcome = dispatch(&mut registry, &call("GET", "http://x"));

        let response = outcome.resolution.unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.status_text(), "Not Found");
    }

    #[test]
    fn method_and_uri_compare_exactly() {
        let mut registry = Registry::default();
        registry.register(rule("GET", "http://x"));

        let put = dispatch(&mut registry, &call("PUT", "http://x"));
        assert_eq!(put.resolution.unwrap().status(), 404);

        // no case folding on either token
        let lower = dispatch(&mut registry, &call("get", "http://x"));
        assert_eq!(lower.resolution.unwrap().status(), 404);

        let slash = dispatch(&mut registry, &call("GET", "http://x/"));
        assert_eq!(slash.resolution.unwrap().status(), 404);
    }

    #[test]
    fn first_registered_rule_is_the_candidate() {
        let mut registry = Registry::default();
        let mut gated = rule("GET", "http://dup");
        gated.expected_headers.push(requirement(
            "X-Flag",
            "on",
            Some(ResponseSpec::bare(401, "Not Authorized")),
        ));
        registry.register(gated);
        registry.register(rule("GET", "http://dup"));

        // the second rule would pass outright, but the first one owns the match
        let outcome = dispatch(&mut registry, &call("GET", "http://dup"));
        let response = outcome.resolution.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(response.status_text(), "Not Authorized");
    }

    #[test]
    fn zero_requirements_pass_without_headers() {
        let mut registry = Registry::default();
        registry.register(rule("GET", "http://x"));

        let outcome = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(outcome.resolution.unwrap().status(), 200);
    }

    #[test]
    fn unmet_requirement_without_fallback_resolves_not_found() {
        let mut registry = Registry::default();
        let mut gated = rule("GET", "http://x");
        gated
            .expected_headers
            .push(requirement("X-AuthToken", "1234", None));
        registry.register(gated);

        let outcome = dispatch(&mut registry, &call("GET", "http://x"));
        let response = outcome.resolution.unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.status_text(), "Not Found");
    }

    #[test]
    fn first_failing_requirement_wins() {
        let mut registry = Registry::default();
        let mut gated = rule("GET", "http://x");
        gated.expected_headers.push(requirement(
            "X-First",
            "1",
            Some(ResponseSpec::bare(401, "first")),
        ));
        gated.expected_headers.push(requirement(
            "X-Second",
            "2",
            Some(ResponseSpec::bare(403, "second")),
        ));
        registry.register(gated);

        // both unmet: the first requirement's fallback answers
        let outcome = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(outcome.resolution.unwrap().status(), 401);

        // first met, second unmet: the second requirement's fallback answers
        let outcome = dispatch(
            &mut registry,
            &call_with("GET", "http://x", &[("X-First", "1")]),
        );
        assert_eq!(outcome.resolution.unwrap().status(), 403);

        // first carries the wrong value: still the first fallback, the
        // second requirement is never consulted
        let outcome = dispatch(
            &mut registry,
            &call_with("GET", "http://x", &[("X-First", "9"), ("X-Second", "2")]),
        );
        assert_eq!(outcome.resolution.unwrap().status(), 401);
    }

    #[test]
    fn all_requirements_met_resolves_the_terminal_response() {
        let mut registry = Registry::default();
        let mut gated = rule("GET", "http://x");
        gated.expected_headers.push(requirement(
            "X-AuthToken",
            "1234",
            Some(ResponseSpec::bare(401, "Not Authorized")),
        ));
        gated
            .expected_headers
            .push(requirement("BANANA", "8757", None));
        registry.register(gated);

        let outcome = dispatch(
            &mut registry,
            &call_with(
                "GET",
                "http://x",
                &[("X-AuthToken", "1234"), ("BANANA", "8757")],
            ),
        );
        assert_eq!(outcome.resolution.unwrap().status(), 200);
    }

    #[test]
    fn match_count_only_moves_on_full_matches() {
        let mut registry = Registry::default();
        let mut gated = rule("GET", "http://x");
        gated
            .expected_headers
            .push(requirement("X-AuthToken", "1234", None));
        registry.register(gated);

        dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(registry.rules[0].match_count(), 0);

        dispatch(
            &mut registry,
            &call_with("GET", "http://x", &[("X-AuthToken", "1234")]),
        );
        assert_eq!(registry.rules[0].match_count(), 1);
    }

    #[test]
    fn only_once_fails_the_second_full_match() {
        let mut registry = Registry::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let hook_seen = seen.clone();
        let mut once = rule("GET", "http://x");
        once.consumption.only_once = true;
        once.consumption.on_violation = Some(Arc::new(move |violating: &Rule| {
            assert_eq!(violating.uri(), "http://x");
            hook_seen.fetch_add(1, Ordering::SeqCst);
        }));
        registry.register(once);

        let first = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(first.resolution.unwrap().status(), 200);
        assert!(first.violation.is_none());

        let second = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(
            second.resolution.unwrap_err(),
            TransportError::CalledMoreThanOnce
        );
        let (hook, violating) = second.violation.expect("hook should be surfaced");
        hook(&violating);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_after_match_takes_the_rule_out_of_the_scan() {
        let mut registry = Registry::default();
        let mut ephemeral = rule("GET", "http://x");
        ephemeral.consumption.remove_after_match = true;
        registry.register(ephemeral);

        let first = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(first.resolution.unwrap().status(), 200);
        assert!(registry.is_empty());

        let second = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(second.resolution.unwrap().status(), 404);
    }

    #[test]
    fn failed_header_match_does_not_consume_the_rule() {
        let mut registry = Registry::default();
        let mut ephemeral = rule("GET", "http://x");
        ephemeral.consumption.remove_after_match = true;
        ephemeral
            .expected_headers
            .push(requirement("X-AuthToken", "1234", None));
        registry.register(ephemeral);

        dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn both_flags_remove_on_first_match_so_violation_never_fires() {
        // Legacy interaction: the only-once check runs first, removal
        // second, so a rule with both flags is gone before a second match
        // could violate it.
        let mut registry = Registry::default();
        let mut combined = rule("GET", "http://x");
        combined.consumption.only_once = true;
        combined.consumption.remove_after_match = true;
        registry.register(combined);

        let first = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(first.resolution.unwrap().status(), 200);
        assert!(registry.is_empty());

        let second = dispatch(&mut registry, &call("GET", "http://x"));
        assert_eq!(second.resolution.unwrap().status(), 404);
    }
}
