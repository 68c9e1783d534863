//! # Buildflow
//!
//! One node-executor in a CI pipeline graph: given a declared source-clone
//! step, buildflow materializes a container image containing checked-out
//! source code by driving an asynchronous, cluster-managed build resource to
//! completion, recovering automatically from transient infrastructure
//! failures, and exposing the resulting image as a parameter other pipeline
//! nodes can consume.
//!
//! The crate is organized around two cores:
//!
//! - **Build specification assembly**: translating a step's declarative
//!   configuration (source refs, clone credentials, resource limits,
//!   base/target image tags) into a fully-formed build request.
//! - **Lifecycle control**: a resilient create/observe/retry/collect state
//!   machine that submits that request to an external orchestration API,
//!   classifies failures as infrastructure-transient vs. genuine, retries
//!   exactly once on the former, polls to a terminal state, and harvests
//!   diagnostics.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildflow::prelude::*;
//!
//! let step = SourceStep::new(config, resources, client, job)
//!     .with_clone_auth(CloneAuth::oauth("oauth-creds"))
//!     .with_pull_secret("registry-pull-credentials");
//!
//! step.run(&cancel).await?;
//! let digest = step.provides()["LOCAL_IMAGE_SRC"].resolve().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod api;
pub mod artifacts;
pub mod assemble;
pub mod classify;
pub mod controller;
pub mod diagnostics;
pub mod errors;
pub mod job;
pub mod labels;
pub mod refs;
pub mod resolve;
pub mod resources;
pub mod step;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{
        ApiError, Build, BuildPhase, BuildStatus, ClusterClient, DeleteOptions,
        ImageStreamTagReference, ObjectReference, StatusReason,
    };
    pub use crate::artifacts::{ArtifactSink, DirectoryArtifactSink};
    pub use crate::assemble::{assemble_build, CloneOptions, PIPELINE_IMAGE_STREAM};
    pub use crate::classify::InfraClassifier;
    pub use crate::controller::BuildLifecycleController;
    pub use crate::errors::{BuildFailure, Error, Result};
    pub use crate::job::JobContext;
    pub use crate::refs::{CloneAuth, CloneAuthMode, Ref};
    pub use crate::resolve::{image_digest_for, resolve_pull_spec};
    pub use crate::resources::{ResourceConfiguration, ResourceRequirements, ResourceSpec};
    pub use crate::step::{
        parameter_name_for, DeferredValue, ParameterMap, SourceStep, SourceStepConfig, Step,
        StepLink,
    };
    pub use crate::testing::FakeCluster;
}
