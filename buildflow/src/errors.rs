//! Error types for the buildflow library.
//!
//! The taxonomy separates configuration errors (fatal, never retried) from
//! orchestration-API errors (some of which drive state transitions), genuine
//! build failures (fatal, with full diagnostics) and cancellation.

use std::fmt;

use chrono::Duration;
use thiserror::Error;

use crate::api::{ApiError, BuildPhase, StatusReason};

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for buildflow operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A resource request or limit could not be parsed.
    #[error("invalid resource {kind} for {resource}: could not parse quantity {value:?}")]
    MalformedQuantity {
        /// Whether the value came from the request or the limit map.
        kind: QuantityKind,
        /// The resource the value was declared for.
        resource: String,
        /// The raw, unparsable quantity string.
        value: String,
    },

    /// An image stream exposes no registry-accessible repository address.
    #[error("remote image stream {name} has no accessible image registry value")]
    StreamUnresolvable {
        /// The image stream name.
        name: String,
    },

    /// An orchestration-API call failed.
    #[error("{context}: {source}")]
    Api {
        /// What the caller was doing when the call failed.
        context: String,
        /// The underlying API error.
        source: ApiError,
    },

    /// A build reached a terminal failure phase.
    #[error(transparent)]
    BuildFailed(#[from] BuildFailure),

    /// Waiting for a build object to disappear after deletion failed.
    #[error("could not wait for build {name} to be deleted: {message}")]
    DeletionWait {
        /// The build name.
        name: String,
        /// Why the wait gave up.
        message: String,
    },

    /// A value could not be serialized for embedding into a build.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The caller's cancellation token fired.
    #[error("step execution cancelled")]
    Cancelled,

    /// An error carrying an upstream reporting classification.
    #[error("{source}")]
    Classified {
        /// The classification tag for upstream reason aggregation.
        reason: &'static str,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps an API error with call-site context.
    #[must_use]
    pub fn api(context: impl Into<String>, source: ApiError) -> Self {
        Self::Api {
            context: context.into(),
            source,
        }
    }

    /// Attaches a classification tag for upstream reason aggregation.
    ///
    /// Classifying an already-classified error keeps the innermost tag.
    #[must_use]
    pub fn classified(self, reason: &'static str) -> Self {
        match self {
            Self::Classified { .. } => self,
            other => Self::Classified {
                reason,
                source: Box::new(other),
            },
        }
    }

    /// Returns the classification tag, if one was attached.
    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Classified { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Returns true if this error resulted from cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Classified { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Whether a malformed quantity came from the request or the limit map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityKind {
    /// The value was declared as a request.
    Request,
    /// The value was declared as a limit.
    Limit,
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// A terminal build failure with its collected diagnostics.
///
/// The display form names the build, its phase, duration, reason and message,
/// and appends the trailing log snippet after a blank line when non-empty.
#[derive(Debug, Clone)]
pub struct BuildFailure {
    /// The build name.
    pub name: String,
    /// The terminal phase the build reached.
    pub phase: BuildPhase,
    /// How long the build ran before terminating.
    pub duration: Duration,
    /// The machine-readable status reason, if reported.
    pub reason: Option<StatusReason>,
    /// The human-readable status message.
    pub message: String,
    /// The trailing snippet of the build log.
    pub log_snippet: String,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = self
            .reason
            .as_ref()
            .map_or("<unknown>", StatusReason::as_str);
        write!(
            f,
            "the build {} reached phase {} after {}s with reason {}: {}",
            self.name,
            self.phase,
            self.duration.num_seconds(),
            reason,
            self.message
        )?;
        let snippet = self.log_snippet.trim();
        if !snippet.is_empty() {
            write!(f, "\n\n{snippet}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(snippet: &str) -> BuildFailure {
        BuildFailure {
            name: "src".to_string(),
            phase: BuildPhase::Failed,
            duration: Duration::seconds(42),
            reason: Some(StatusReason::new("FetchSourceFailed")),
            message: "fetch failed".to_string(),
            log_snippet: snippet.to_string(),
        }
    }

    #[test]
    fn test_build_failure_display_appends_log_after_blank_line() {
        let text = failure("Could not resolve host: github.com").to_string();
        assert!(text.starts_with(
            "the build src reached phase Failed after 42s with reason FetchSourceFailed: fetch failed"
        ));
        assert!(text.ends_with("\n\nCould not resolve host: github.com"));
    }

    #[test]
    fn test_build_failure_display_omits_empty_log() {
        let text = failure("   ").to_string();
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_classified_keeps_innermost_tag() {
        let err = Error::Cancelled
            .classified("cloning_source")
            .classified("outer");
        assert_eq!(err.reason(), Some("cloning_source"));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_classified_display_is_transparent() {
        let err = Error::StreamUnresolvable {
            name: "tools".to_string(),
        }
        .classified("cloning_source");
        assert_eq!(
            err.to_string(),
            "remote image stream tools has no accessible image registry value"
        );
    }
}
