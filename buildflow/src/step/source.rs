//! The source clone step.
//!
//! Materializes an image containing checked-out source by resolving the
//! cloner helper image, assembling a build request and driving it through
//! the lifecycle controller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{parameter_name_for, ParameterMap, Step, StepLink};
use crate::api::{ClusterClient, ImageStreamTagReference};
use crate::assemble::{assemble_build, PIPELINE_IMAGE_STREAM};
use crate::controller::BuildLifecycleController;
use crate::errors::{Error, Result};
use crate::job::JobContext;
use crate::refs::CloneAuth;
use crate::resolve::{image_digest_for, resolve_pull_spec};
use crate::resources::ResourceConfiguration;

/// Classification tag attached to any source-step failure.
const STEP_FAILURE_REASON: &str = "cloning_source";

/// Declarative configuration of a source clone step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStepConfig {
    /// Pipeline tag of the base image the clone starts from.
    pub from: String,
    /// Pipeline tag the produced image is published under.
    pub to: String,
    /// The image carrying the cloner helper binary.
    pub cloner_image: ImageStreamTagReference,
    /// Path of the helper binary within that image.
    pub cloner_path: String,
}

/// A pipeline step that clones source into a new pipeline image.
pub struct SourceStep {
    config: SourceStepConfig,
    resources: ResourceConfiguration,
    client: Arc<dyn ClusterClient>,
    job: Arc<JobContext>,
    clone_auth: Option<CloneAuth>,
    pull_secret: Option<String>,
    controller: BuildLifecycleController,
}

impl SourceStep {
    /// Creates a source step with a default lifecycle controller.
    #[must_use]
    pub fn new(
        config: SourceStepConfig,
        resources: ResourceConfiguration,
        client: Arc<dyn ClusterClient>,
        job: Arc<JobContext>,
    ) -> Self {
        let controller = BuildLifecycleController::new(Arc::clone(&client));
        Self {
            config,
            resources,
            client,
            job,
            clone_auth: None,
            pull_secret: None,
            controller,
        }
    }

    /// Sets the clone authentication configuration.
    #[must_use]
    pub fn with_clone_auth(mut self, clone_auth: CloneAuth) -> Self {
        self.clone_auth = Some(clone_auth);
        self
    }

    /// Sets the registry pull credential secret name.
    #[must_use]
    pub fn with_pull_secret(mut self, secret_name: impl Into<String>) -> Self {
        self.pull_secret = Some(secret_name.into());
        self
    }

    /// Replaces the lifecycle controller.
    #[must_use]
    pub fn with_controller(mut self, controller: BuildLifecycleController) -> Self {
        self.controller = controller;
        self
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let cloner_ref = resolve_pull_spec(self.client.as_ref(), &self.config.cloner_image).await?;
        let build = assemble_build(
            &self.config,
            &self.job,
            cloner_ref,
            &self.resources,
            self.clone_auth.as_ref(),
            self.pull_secret.as_deref(),
        )?;
        self.controller.run(&build, cancel).await
    }
}

#[async_trait]
impl Step for SourceStep {
    fn name(&self) -> &str {
        &self.config.to
    }

    fn description(&self) -> String {
        format!(
            "Clone the correct source code into an image and tag it as {}",
            self.config.to
        )
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.execute(cancel)
            .await
            .map_err(|e| e.classified(STEP_FAILURE_REASON))
    }

    fn requires(&self) -> Vec<StepLink> {
        vec![StepLink::internal_image(&self.config.from)]
    }

    fn creates(&self) -> Vec<StepLink> {
        vec![StepLink::internal_image(&self.config.to)]
    }

    fn provides(&self) -> ParameterMap {
        ParameterMap::from([(
            parameter_name_for(&self.config.to),
            image_digest_for(
                Arc::clone(&self.client),
                self.job.namespace.clone(),
                PIPELINE_IMAGE_STREAM.to_string(),
                self.config.to.clone(),
            ),
        )])
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio_test::assert_ok;

    use super::*;
    use crate::testing::FakeCluster;

    fn test_step() -> SourceStep {
        let config = SourceStepConfig {
            from: "root".to_string(),
            to: "src".to_string(),
            cloner_image: ImageStreamTagReference::new("ci", "tools", "cloner"),
            cloner_path: "/usr/bin/cloner".to_string(),
        };
        let job = JobContext {
            namespace: "ci-op-1234".to_string(),
            ..JobContext::default()
        };
        SourceStep::new(
            config,
            ResourceConfiguration::new(),
            Arc::new(FakeCluster::new()),
            Arc::new(job),
        )
    }

    #[test]
    fn test_links() {
        let step = test_step();
        assert_eq!(step.requires(), vec![StepLink::internal_image("root")]);
        assert_eq!(step.creates(), vec![StepLink::internal_image("src")]);
    }

    #[test]
    fn test_identity_and_validation() {
        let step = test_step();
        assert_eq!(step.name(), "src");
        assert!(step.description().contains("src"));
        assert_ok!(step.validate());
    }

    #[test]
    fn test_provides_declares_parameter_eagerly() {
        let step = test_step();
        let parameters = step.provides();
        assert_eq!(parameters.len(), 1);
        assert!(parameters.contains_key("LOCAL_IMAGE_SRC"));
    }

    #[tokio::test]
    async fn test_provided_parameter_fails_until_image_exists() {
        let step = test_step();
        let parameters = step.provides();
        let value = parameters.get("LOCAL_IMAGE_SRC").unwrap();
        // The build has not run, so the digest cannot resolve yet.
        assert!(value.resolve().await.is_err());
    }
}
