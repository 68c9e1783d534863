//! The capability interface onto the external orchestration API.
//!
//! The controller and resolver are written against [`ClusterClient`] so they
//! can be exercised against an in-memory implementation; only the surrounding
//! system supplies a live client.

use async_trait::async_trait;
use thiserror::Error;

use super::build::Build;
use super::image::{ImageStream, ImageStreamTag};
use super::pod::{Event, Pod};

/// Result alias for orchestration-API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors returned by the orchestration API.
///
/// The structured variants carry the optimistic-concurrency semantics the
/// controller's state machine branches on.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The addressed object does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
    },

    /// An object with the same identity already exists.
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
    },

    /// A write precondition (e.g. an expected UID) did not hold.
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
        /// What precondition failed.
        message: String,
    },

    /// Any other transport or server failure.
    #[error("api transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Returns true for the not-found variant.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for the already-exists variant.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true for the conflict variant.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// How a delete propagates to dependent objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePropagation {
    /// The delete returns once dependents are gone.
    #[default]
    Foreground,
    /// Dependents are collected asynchronously.
    Background,
}

/// Options attached to a delete request.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Seconds the object is given to terminate gracefully.
    pub grace_period_seconds: Option<i64>,
    /// Expected UID; the delete conflicts if the live object differs.
    pub expected_uid: Option<String>,
    /// Propagation policy for dependents.
    pub propagation: DeletePropagation,
}

impl DeleteOptions {
    /// Immediate foreground deletion of exactly the observed object.
    #[must_use]
    pub fn foreground_now(expected_uid: Option<String>) -> Self {
        Self {
            grace_period_seconds: Some(0),
            expected_uid,
            propagation: DeletePropagation::Foreground,
        }
    }
}

/// Create/get/delete/list/logs access to the cluster objects this library
/// drives or observes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Submits a build for creation.
    async fn create_build(&self, build: &Build) -> ApiResult<()>;

    /// Reads a build by name.
    async fn get_build(&self, namespace: &str, name: &str) -> ApiResult<Build>;

    /// Deletes a build by name.
    async fn delete_build(
        &self,
        namespace: &str,
        name: &str,
        options: DeleteOptions,
    ) -> ApiResult<()>;

    /// Reads an image stream by name.
    async fn get_image_stream(&self, namespace: &str, name: &str) -> ApiResult<ImageStream>;

    /// Reads one tag of an image stream by its `name:tag` form.
    async fn get_image_stream_tag(&self, namespace: &str, name: &str) -> ApiResult<ImageStreamTag>;

    /// Reads a pod by name.
    async fn get_pod(&self, namespace: &str, name: &str) -> ApiResult<Pod>;

    /// Lists events whose involved object has the given UID.
    async fn list_events_for(&self, namespace: &str, involved_uid: &str) -> ApiResult<Vec<Event>>;

    /// Fetches the accumulated logs of a build.
    async fn build_logs(&self, namespace: &str, name: &str) -> ApiResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        let not_found = ApiError::NotFound {
            kind: "Build".to_string(),
            name: "src".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_already_exists());

        let conflict = ApiError::Conflict {
            kind: "Build".to_string(),
            name: "src".to_string(),
            message: "uid mismatch".to_string(),
        };
        assert!(conflict.is_conflict());
    }

    #[test]
    fn test_foreground_now_options() {
        let options = DeleteOptions::foreground_now(Some("abc".to_string()));
        assert_eq!(options.grace_period_seconds, Some(0));
        assert_eq!(options.propagation, DeletePropagation::Foreground);
        assert_eq!(options.expected_uid.as_deref(), Some("abc"));
    }
}
