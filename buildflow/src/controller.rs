//! The build lifecycle controller.
//!
//! Owns the create, classify-and-retry, poll-to-terminal and
//! diagnose/collect state machine for one build request. The classifier
//! gates a single bounded delete+recreate retry, which covers the dominant
//! class of flaky infrastructure failures without masking genuine build
//! breakage.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{Build, ClusterClient, DeleteOptions};
use crate::artifacts::ArtifactSink;
use crate::classify::InfraClassifier;
use crate::diagnostics;
use crate::errors::{BuildFailure, Error, Result};

const DELETION_BACKOFF_INITIAL: Duration = Duration::from_millis(10);
const DELETION_BACKOFF_STEPS: u32 = 10;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Drives one build request to a terminal outcome.
pub struct BuildLifecycleController {
    client: Arc<dyn ClusterClient>,
    classifier: InfraClassifier,
    poll_interval: Duration,
    artifacts: Option<Arc<dyn ArtifactSink>>,
}

impl BuildLifecycleController {
    /// Creates a controller with the default classifier and poll interval.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            classifier: InfraClassifier::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            artifacts: None,
        }
    }

    /// Replaces the failure classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: InfraClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Overrides the status poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Attaches a sink successful build logs are harvested into.
    #[must_use]
    pub fn with_artifact_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.artifacts = Some(sink);
        self
    }

    /// Submits the build and observes it to a terminal outcome.
    ///
    /// Creation conflicts route through the existing object: a terminal,
    /// infra-classified failure is deleted and recreated exactly once;
    /// anything else proceeds straight to polling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] as soon as the token fires,
    /// [`Error::BuildFailed`] for a genuine terminal failure, and
    /// [`Error::Api`] for unrecoverable API errors.
    pub async fn run(&self, build: &Build, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let namespace = &build.metadata.namespace;
        let name = &build.metadata.name;

        if let Err(e) = self.client.create_build(build).await {
            if !e.is_already_exists() {
                return Err(Error::api(format!("could not create build {name}"), e));
            }
            self.retry_if_infra_failed(build, cancel).await?;
        }

        let result = self.wait_for_build(namespace, name, cancel).await;
        if result.is_ok() {
            self.harvest_build_log(namespace, name).await;
        }
        result
    }

    /// Inspects an already-existing build and, when it terminally failed for
    /// an infrastructure reason, deletes and recreates it.
    async fn retry_if_infra_failed(&self, build: &Build, cancel: &CancellationToken) -> Result<()> {
        let namespace = &build.metadata.namespace;
        let name = &build.metadata.name;

        let existing = self
            .client
            .get_build(namespace, name)
            .await
            .map_err(|e| Error::api(format!("could not get build {name}"), e))?;

        let status = &existing.status;
        if !(status.phase.is_terminal()
            && self
                .classifier
                .is_infra(status.reason.as_ref(), &status.log_snippet))
        {
            return Ok(());
        }

        tracing::info!(
            build = %name,
            reason = ?status.reason,
            "build previously failed from an infrastructure error, retrying"
        );

        let options = DeleteOptions::foreground_now(existing.metadata.uid.clone());
        if let Err(e) = self.client.delete_build(namespace, name, options).await {
            // Losing the race to an independent deletion or recreation is
            // tolerated: not-found and conflict are success here.
            if !e.is_not_found() && !e.is_conflict() {
                return Err(Error::api(format!("could not delete build {name}"), e));
            }
        }
        self.wait_for_deletion(namespace, name, cancel).await?;

        if let Err(e) = self.client.create_build(build).await {
            if !e.is_already_exists() {
                return Err(Error::api(format!("could not recreate build {name}"), e));
            }
        }
        Ok(())
    }

    /// Blocks until the named build is confirmed absent, polling existence
    /// with exponential backoff in a child task raced against cancellation.
    async fn wait_for_deletion(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let client = Arc::clone(&self.client);
        let ns = namespace.to_string();
        let build_name = name.to_string();
        let mut waiter = tokio::spawn(async move {
            let mut delay = DELETION_BACKOFF_INITIAL;
            for attempt in 0..DELETION_BACKOFF_STEPS {
                if attempt != 0 {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                match client.get_build(&ns, &build_name).await {
                    Err(e) if e.is_not_found() => return Ok(()),
                    Err(e) => return Err(e.to_string()),
                    Ok(_) => {}
                }
            }
            Err("backoff exhausted before the build disappeared".to_string())
        });

        tokio::select! {
            () = cancel.cancelled() => {
                waiter.abort();
                Err(Error::Cancelled)
            }
            joined = &mut waiter => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(message)) => Err(Error::DeletionWait {
                    name: name.to_string(),
                    message,
                }),
                Err(e) => Err(Error::DeletionWait {
                    name: name.to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }

    /// Polls the build to a terminal phase.
    async fn wait_for_build(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let build = self.client.get_build(namespace, name).await.map_err(|e| {
            if e.is_not_found() {
                Error::api(format!("could not find build {name}"), e)
            } else {
                Error::api(format!("could not get build {name}"), e)
            }
        })?;
        if build.status.phase.is_success() {
            tracing::info!(
                build = %name,
                duration_secs = build.duration().num_seconds(),
                "build already succeeded"
            );
            return Ok(());
        }
        if build.status.phase.is_failure() {
            return Err(self.report_failure(build).await);
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {
                    let build = match self.client.get_build(namespace, name).await {
                        Ok(build) => build,
                        Err(e) => {
                            // Transient read errors do not fail the wait.
                            tracing::warn!(build = %name, error = %e, "failed to get build");
                            continue;
                        }
                    };
                    if build.status.phase.is_success() {
                        tracing::info!(
                            build = %name,
                            duration_secs = build.duration().num_seconds(),
                            "build succeeded"
                        );
                        return Ok(());
                    }
                    if build.status.phase.is_failure() {
                        return Err(self.report_failure(build).await);
                    }
                }
            }
        }
    }

    /// Dumps diagnostics for a terminally failed build and produces the
    /// error describing it.
    async fn report_failure(&self, build: Build) -> Error {
        let namespace = &build.metadata.namespace;
        let name = &build.metadata.name;
        tracing::info!(build = %name, "build failed, printing logs");

        match self.client.build_logs(namespace, name).await {
            Ok(logs) => print!("{logs}"),
            Err(e) => {
                tracing::warn!(build = %name, error = %e, "unable to retrieve logs from failed build");
            }
        }

        if let Ok(pod) = self.client.get_pod(namespace, &format!("{name}-build")).await {
            let reasons = diagnostics::unready_container_reasons(&pod);
            if !reasons.is_empty() {
                tracing::info!(build = %name, "unready containers:{reasons}");
            }
            let events = diagnostics::pod_events_text(self.client.as_ref(), &pod).await;
            if !events.is_empty() {
                tracing::info!(build = %name, "{events}");
            }
        }

        Error::BuildFailed(BuildFailure {
            name: name.clone(),
            phase: build.status.phase,
            duration: build.duration(),
            reason: build.status.reason.clone(),
            message: build.status.message.clone(),
            log_snippet: build.status.log_snippet.clone(),
        })
    }

    /// Harvests the logs of a successful build into the artifact sink.
    /// Failure to harvest never converts success into failure.
    async fn harvest_build_log(&self, namespace: &str, name: &str) {
        let Some(sink) = &self.artifacts else {
            return;
        };
        let stored = match self.client.build_logs(namespace, name).await {
            Ok(logs) => {
                sink.store(&format!("{name}/build.log"), logs.as_bytes())
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = stored {
            tracing::warn!(
                build = %name,
                error = %error,
                "problem gathering successful build logs into artifacts"
            );
        }
    }
}
