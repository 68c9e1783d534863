//! The build object model for the external orchestration API.
//!
//! A [`Build`] is submitted for creation by this library; its
//! [`BuildStatus`] is owned entirely by the external system and only
//! observed here.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::resources::ResourceSpec;

/// A reference to another cluster object, or to a concrete image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    /// The kind of the referenced object (e.g. `ImageStreamTag`, `DockerImage`).
    pub kind: String,
    /// The namespace of the referenced object, if namespaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// The name of the referenced object.
    pub name: String,
}

impl ObjectReference {
    /// Creates a reference to a namespaced object.
    #[must_use]
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Creates a reference to a concrete, registry-addressed image.
    #[must_use]
    pub fn docker_image(pull_spec: impl Into<String>) -> Self {
        Self {
            kind: "DockerImage".to_string(),
            namespace: None,
            name: pull_spec.into(),
        }
    }
}

/// An owning-object reference used for garbage collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    /// API version of the owner.
    pub api_version: String,
    /// Kind of the owner.
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// UID of the owner.
    pub uid: String,
    /// Whether the owner is the managing controller.
    #[serde(default)]
    pub controller: bool,
}

/// Common object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name, unique within the namespace.
    pub name: String,
    /// Namespace the object lives in.
    pub namespace: String,
    /// Server-assigned unique identity; absent until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// String-keyed labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// String-keyed annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Server-assigned creation time; absent until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// References to owning objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

/// A name/value environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// A path copied out of a source image into the build context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSourcePath {
    /// Absolute path within the source image.
    pub source_path: String,
    /// Destination directory relative to the build context.
    pub destination_dir: String,
}

/// An image whose contents are made available to the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    /// The image to copy from.
    pub from: ObjectReference,
    /// The paths to copy.
    #[serde(default)]
    pub paths: Vec<ImageSourcePath>,
}

/// A secret mounted into the build context by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBuildSource {
    /// The name of the secret.
    pub secret: String,
}

/// The inputs a build consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSource {
    /// The generated container build script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Images whose contents are embedded into the build context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSource>,
    /// Secrets mounted into the build context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretBuildSource>,
    /// Subdirectory of the checkout the build runs in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context_dir: String,
}

/// How the build executes its script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBuildStrategy {
    /// The base image the script's first instruction resolves against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjectReference>,
    /// Always re-pull the base image.
    #[serde(default)]
    pub force_pull: bool,
    /// Disable layer caching.
    #[serde(default)]
    pub no_cache: bool,
    /// Environment passed to the build execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Pull credential secret name, if registry auth is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret: Option<String>,
}

/// A name/value label applied to the produced image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLabel {
    /// Label name.
    pub name: String,
    /// Label value; empty resets any lower-level value.
    pub value: String,
}

/// Where the produced image is pushed, and with which labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// The image tag the result is published under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ObjectReference>,
    /// Labels stamped onto the produced image, sorted by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_labels: Vec<ImageLabel>,
}

/// The declarative portion of a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Validated compute resources for the build execution.
    pub resources: ResourceSpec,
    /// Build inputs.
    pub source: BuildSource,
    /// Execution strategy.
    pub strategy: ContainerBuildStrategy,
    /// Output target and image labels.
    pub output: BuildOutput,
}

/// The lifecycle phase of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildPhase {
    /// Accepted but not yet scheduled.
    #[default]
    New,
    /// Scheduled, waiting to start.
    Pending,
    /// Executing.
    Running,
    /// Finished successfully.
    Complete,
    /// Finished with a build failure.
    Failed,
    /// Stopped by an external request.
    Cancelled,
    /// Finished with an internal error.
    Error,
}

impl BuildPhase {
    /// Returns true if the phase is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::New | Self::Pending | Self::Running)
    }

    /// Returns true if the phase is the successful terminal state.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Returns true if the phase is a failed terminal state.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Error)
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::New => "New",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Error => "Error",
        };
        write!(f, "{phase}")
    }
}

/// A machine-readable reason attached to a terminal status.
///
/// The set of reasons is owned by the external system, so this is an open
/// string type with constants for the values the classifier recognizes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusReason(String);

impl StatusReason {
    /// Pod creation was rejected or failed.
    pub const CANNOT_CREATE_BUILD_POD: &'static str = "CannotCreateBuildPod";
    /// The build pod disappeared mid-run.
    pub const BUILD_POD_DELETED: &'static str = "BuildPodDeleted";
    /// The build pod was evicted from its node.
    pub const BUILD_POD_EVICTED: &'static str = "BuildPodEvicted";
    /// The orchestrator gave up retrying the build pod.
    pub const EXCEEDED_RETRY_TIMEOUT: &'static str = "ExceededRetryTimeout";
    /// Pushing the produced image failed.
    pub const PUSH_IMAGE_TO_REGISTRY_FAILED: &'static str = "PushImageToRegistryFailed";
    /// Pulling the builder image failed.
    pub const PULL_BUILDER_IMAGE_FAILED: &'static str = "PullBuilderImageFailed";
    /// Fetching the declared source failed.
    pub const FETCH_SOURCE_FAILED: &'static str = "FetchSourceFailed";
    /// A conflicting build pod already existed.
    pub const BUILD_POD_EXISTS: &'static str = "BuildPodExists";
    /// The build pod reported no container status.
    pub const NO_BUILD_CONTAINER_STATUS: &'static str = "NoBuildContainerStatus";
    /// A build container failed.
    pub const FAILED_CONTAINER: &'static str = "FailedContainer";
    /// The build was killed for exceeding its memory limit.
    pub const OUT_OF_MEMORY_KILLED: &'static str = "OutOfMemoryKilled";
    /// The build service account could not be read.
    pub const CANNOT_RETRIEVE_SERVICE_ACCOUNT: &'static str = "CannotRetrieveServiceAccount";
    /// Fetching image content for an image source failed.
    pub const FETCH_IMAGE_CONTENT_FAILED: &'static str = "FetchImageContentFailed";

    /// Creates a reason from its wire value.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StatusReason {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// The observed state of a build. Never constructed locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStatus {
    /// Current lifecycle phase.
    pub phase: BuildPhase,
    /// Machine-readable reason for the phase, if terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<StatusReason>,
    /// Human-readable explanation.
    #[serde(default)]
    pub message: String,
    /// Trailing snippet of the build log.
    #[serde(default)]
    pub log_snippet: String,
    /// When execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,
    /// When execution reached a terminal phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<DateTime<Utc>>,
}

/// One cluster-managed containerized build execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Build {
    /// Object identity, labels and annotations.
    pub metadata: ObjectMeta,
    /// The declarative build request.
    pub spec: BuildSpec,
    /// The asynchronously updated observed state.
    #[serde(default)]
    pub status: BuildStatus,
}

impl Build {
    /// Returns how long the build ran, measured from its start timestamp
    /// (falling back to creation) to its completion timestamp (falling back
    /// to now).
    #[must_use]
    pub fn duration(&self) -> Duration {
        let start = self
            .status
            .start_timestamp
            .or(self.metadata.creation_timestamp)
            .unwrap_or_else(Utc::now);
        let end = self.status.completion_timestamp.unwrap_or_else(Utc::now);
        end - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_terminality() {
        assert!(!BuildPhase::New.is_terminal());
        assert!(!BuildPhase::Pending.is_terminal());
        assert!(!BuildPhase::Running.is_terminal());
        assert!(BuildPhase::Complete.is_terminal());
        assert!(BuildPhase::Failed.is_terminal());
        assert!(BuildPhase::Cancelled.is_terminal());
        assert!(BuildPhase::Error.is_terminal());
    }

    #[test]
    fn test_phase_success_and_failure_partition_terminal_states() {
        assert!(BuildPhase::Complete.is_success());
        assert!(!BuildPhase::Complete.is_failure());
        for phase in [BuildPhase::Failed, BuildPhase::Cancelled, BuildPhase::Error] {
            assert!(phase.is_failure());
            assert!(!phase.is_success());
        }
    }

    #[test]
    fn test_status_reason_serializes_transparently() {
        let reason = StatusReason::new(StatusReason::FETCH_SOURCE_FAILED);
        let json = serde_json::to_string(&reason).unwrap();
        assert_eq!(json, r#""FetchSourceFailed""#);
    }

    #[test]
    fn test_duration_uses_creation_when_start_missing() {
        let created = Utc::now() - Duration::seconds(30);
        let build = Build {
            metadata: ObjectMeta {
                name: "src".to_string(),
                namespace: "ci-op-1234".to_string(),
                creation_timestamp: Some(created),
                ..ObjectMeta::default()
            },
            status: BuildStatus {
                completion_timestamp: Some(created + Duration::seconds(12)),
                ..BuildStatus::default()
            },
            ..Build::default()
        };
        assert_eq!(build.duration().num_seconds(), 12);
    }
}
