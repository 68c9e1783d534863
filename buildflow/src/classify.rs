//! Heuristic classification of build failures.
//!
//! Decides whether a terminal failure is attributable to infrastructure
//! flakiness (and therefore eligible for one automatic retry) rather than to
//! the source content or build logic. Advisory only: the classifier never
//! blocks anything on its own.

use std::collections::BTreeSet;

use crate::api::StatusReason;

/// Status reasons known to indicate infrastructure failures.
const INFRA_REASONS: [&str; 13] = [
    StatusReason::CANNOT_CREATE_BUILD_POD,
    StatusReason::BUILD_POD_DELETED,
    StatusReason::BUILD_POD_EVICTED,
    StatusReason::EXCEEDED_RETRY_TIMEOUT,
    StatusReason::PUSH_IMAGE_TO_REGISTRY_FAILED,
    StatusReason::PULL_BUILDER_IMAGE_FAILED,
    StatusReason::FETCH_SOURCE_FAILED,
    StatusReason::BUILD_POD_EXISTS,
    StatusReason::NO_BUILD_CONTAINER_STATUS,
    StatusReason::FAILED_CONTAINER,
    StatusReason::OUT_OF_MEMORY_KILLED,
    StatusReason::CANNOT_RETRIEVE_SERVICE_ACCOUNT,
    StatusReason::FETCH_IMAGE_CONTENT_FAILED,
];

/// Log substrings known to indicate transient network, registry or mirror
/// failures.
const INFRA_LOG_HINTS: [&str; 7] = [
    "error: build error: no such image",
    "[Errno 256] No more mirrors to try.",
    "Error: Failed to synchronize cache for repo",
    "Could not resolve host: ",
    "net/http: TLS handshake timeout",
    "All mirrors were tried",
    "connection reset by peer",
];

/// A configured infra-failure classifier.
///
/// The reason set and log heuristics are data, not control flow, so
/// deployments can extend them without touching the decision logic.
#[derive(Debug, Clone)]
pub struct InfraClassifier {
    reasons: BTreeSet<StatusReason>,
    log_hints: Vec<String>,
}

impl Default for InfraClassifier {
    fn default() -> Self {
        Self {
            reasons: INFRA_REASONS.iter().map(|r| StatusReason::new(*r)).collect(),
            log_hints: INFRA_LOG_HINTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl InfraClassifier {
    /// Creates a classifier with the built-in reason set and log heuristics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a status reason to the infra set.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<StatusReason>) -> Self {
        self.reasons.insert(reason.into());
        self
    }

    /// Adds a log substring heuristic.
    #[must_use]
    pub fn with_log_hint(mut self, hint: impl Into<String>) -> Self {
        self.log_hints.push(hint.into());
        self
    }

    /// Returns true if the terminal status reason or the trailing log
    /// snippet points at an infrastructure failure.
    #[must_use]
    pub fn is_infra(&self, reason: Option<&StatusReason>, log_snippet: &str) -> bool {
        self.is_infra_reason(reason) || self.hints_at_infra(log_snippet)
    }

    /// Returns true if the reason is a member of the infra set.
    #[must_use]
    pub fn is_infra_reason(&self, reason: Option<&StatusReason>) -> bool {
        reason.is_some_and(|reason| self.reasons.contains(reason))
    }

    /// Returns true if the log snippet contains any known infra hint.
    #[must_use]
    pub fn hints_at_infra(&self, log_snippet: &str) -> bool {
        self.log_hints.iter().any(|hint| log_snippet.contains(hint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infra_reasons_match() {
        let classifier = InfraClassifier::new();
        for reason in INFRA_REASONS {
            assert!(
                classifier.is_infra(Some(&StatusReason::new(reason)), ""),
                "{reason} should classify as infra"
            );
        }
    }

    #[test]
    fn test_non_infra_reason_does_not_match() {
        let classifier = InfraClassifier::new();
        assert!(!classifier.is_infra(Some(&StatusReason::new("GenericBuildFailed")), ""));
        assert!(!classifier.is_infra(None, ""));
    }

    #[test]
    fn test_log_hints_match_as_substrings() {
        let classifier = InfraClassifier::new();
        assert!(classifier.is_infra(
            None,
            "fatal: unable to access repo: Could not resolve host: github.com"
        ));
        assert!(classifier.is_infra(None, "read tcp 10.0.0.3:443: connection reset by peer"));
        assert!(!classifier.is_infra(None, "compilation failed: missing semicolon"));
    }

    #[test]
    fn test_extension_points() {
        let classifier = InfraClassifier::new()
            .with_reason("NodeDrained")
            .with_log_hint("i/o timeout");
        assert!(classifier.is_infra(Some(&StatusReason::new("NodeDrained")), ""));
        assert!(classifier.is_infra(None, "dial tcp: i/o timeout"));
    }
}
