//! Object model and capability interface for the external orchestration API.

mod build;
mod client;
mod image;
mod pod;

pub use build::{
    Build, BuildOutput, BuildPhase, BuildSource, BuildSpec, BuildStatus, ContainerBuildStrategy,
    EnvVar, ImageLabel, ImageSource, ImageSourcePath, ObjectMeta, ObjectReference, OwnerReference,
    SecretBuildSource, StatusReason,
};
pub use client::{ApiError, ApiResult, ClusterClient, DeleteOptions, DeletePropagation};
pub use image::{Image, ImageStream, ImageStreamStatus, ImageStreamTag, ImageStreamTagReference};
pub use pod::{ContainerState, ContainerStateDetail, ContainerStatus, Event, Pod, PodStatus};

#[cfg(test)]
pub use client::MockClusterClient;
