//! Pod and event objects, consumed only for diagnostic text assembly.

use serde::{Deserialize, Serialize};

/// A container state with its reason and message, if reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStateDetail {
    /// Machine-readable reason.
    #[serde(default)]
    pub reason: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// The state of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Set while the container waits to start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<ContainerStateDetail>,
    /// Set while the container runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<ContainerStateDetail>,
    /// Set once the container terminated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated: Option<ContainerStateDetail>,
}

/// Observed status of one container in a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Container name.
    pub name: String,
    /// Whether the container is ready.
    #[serde(default)]
    pub ready: bool,
    /// Current state.
    #[serde(default)]
    pub state: ContainerState,
}

/// Observed state of a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    /// Per-container statuses.
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

/// A pod executing build containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
    /// Server-assigned identity.
    #[serde(default)]
    pub uid: String,
    /// Observed state.
    #[serde(default)]
    pub status: PodStatus,
}

/// A cluster event attached to some involved object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// How many times the event fired.
    #[serde(default)]
    pub count: u32,
    /// The component that emitted the event.
    #[serde(default)]
    pub source_component: String,
    /// The event message.
    #[serde(default)]
    pub message: String,
}
