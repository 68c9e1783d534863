//! The pipeline-graph-facing step abstraction.
//!
//! A step declares its dependency links eagerly (so the graph can be wired
//! before anything runs) but computes its provided parameter values lazily,
//! on demand, since those values may not exist until the step has executed.

mod source;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

pub use source::{SourceStep, SourceStepConfig};

/// A dependency edge between steps, named by the artifact it denotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepLink {
    /// A namespaced pipeline image tag.
    InternalImage(String),
}

impl StepLink {
    /// Creates a link on a pipeline image tag.
    #[must_use]
    pub fn internal_image(tag: impl Into<String>) -> Self {
        Self::InternalImage(tag.into())
    }
}

impl fmt::Display for StepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InternalImage(tag) => write!(f, "internal-image:{tag}"),
        }
    }
}

/// A parameter value that is declared eagerly but computed on first read.
///
/// Downstream consumers hold the deferred value as a key in a
/// [`ParameterMap`] and resolve it only once the producing step has run.
#[derive(Clone)]
pub struct DeferredValue {
    resolve: Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>,
}

impl DeferredValue {
    /// Creates a deferred value from a resolver closure.
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<String>> + Send + Sync + 'static,
    {
        Self {
            resolve: Arc::new(resolve),
        }
    }

    /// Creates an already-resolved value, mainly for tests and constants.
    #[must_use]
    pub fn ready(value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(move || {
            let value = value.clone();
            Box::pin(async move { Ok(value) })
        })
    }

    /// Computes the value.
    ///
    /// # Errors
    ///
    /// Propagates whatever the underlying resolver returns; resolution is
    /// expected to fail until the producing step has completed.
    pub async fn resolve(&self) -> Result<String> {
        (self.resolve)().await
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValue").finish_non_exhaustive()
    }
}

/// The parameters a step exposes to downstream consumers.
pub type ParameterMap = BTreeMap<String, DeferredValue>;

/// Returns the deterministic parameter name for a pipeline image tag.
#[must_use]
pub fn parameter_name_for(tag: &str) -> String {
    let sanitized: String = tag
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("LOCAL_IMAGE_{sanitized}")
}

/// One node-executor in the pipeline graph.
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns the step name.
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the step does.
    fn description(&self) -> String;

    /// Checks step-local invariants before execution.
    fn validate(&self) -> Result<()>;

    /// Executes the step to completion or failure.
    async fn run(&self, cancel: &CancellationToken) -> Result<()>;

    /// Returns the links this step consumes.
    fn requires(&self) -> Vec<StepLink>;

    /// Returns the links this step produces.
    fn creates(&self) -> Vec<StepLink>;

    /// Returns the lazily-resolved parameters this step exposes.
    fn provides(&self) -> ParameterMap;
}
