//! An in-memory cluster implementing the [`ClusterClient`] contract.
//!
//! Builds, image streams, pods and events live in concurrent maps; build
//! statuses can be scripted as a sequence that successive reads observe,
//! which lets state-machine tests simulate an asynchronously progressing
//! build without a live cluster.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api::{
    ApiError, ApiResult, Build, BuildStatus, ClusterClient, DeleteOptions, Event, Image,
    ImageStream, ImageStreamStatus, ImageStreamTag, Pod,
};

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// An in-memory fake of the external orchestration API.
#[derive(Default)]
pub struct FakeCluster {
    builds: DashMap<String, Build>,
    streams: DashMap<String, ImageStream>,
    stream_tags: DashMap<String, ImageStreamTag>,
    pods: DashMap<String, Pod>,
    events: DashMap<String, Vec<Event>>,
    logs: DashMap<String, String>,
    scripted_statuses: DashMap<String, VecDeque<BuildStatus>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    /// Creates an empty fake cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an image stream with registry repository addresses.
    pub fn seed_image_stream(&self, namespace: &str, name: &str, public: &str, internal: &str) {
        self.streams.insert(
            key(namespace, name),
            ImageStream {
                name: name.to_string(),
                namespace: namespace.to_string(),
                status: ImageStreamStatus {
                    public_image_repository: public.to_string(),
                    image_repository: internal.to_string(),
                },
            },
        );
    }

    /// Seeds one tag of an image stream with an explicit digest.
    pub fn seed_image_stream_tag(&self, namespace: &str, name: &str, digest: &str) {
        self.stream_tags.insert(
            key(namespace, name),
            ImageStreamTag {
                name: name.to_string(),
                namespace: namespace.to_string(),
                image: Image {
                    name: digest.to_string(),
                },
            },
        );
    }

    /// Publishes a pipeline tag with a digest derived deterministically from
    /// its coordinates, returning that digest.
    pub fn publish_tag(&self, namespace: &str, stream: &str, tag: &str) -> String {
        let digest = format!(
            "sha256:{}",
            hex::encode(Sha256::digest(format!("{namespace}/{stream}:{tag}")))
        );
        self.seed_image_stream_tag(namespace, &format!("{stream}:{tag}"), &digest);
        digest
    }

    /// Inserts a build directly, bypassing create semantics.
    pub fn seed_build(&self, mut build: Build, status: BuildStatus) {
        if build.metadata.uid.is_none() {
            build.metadata.uid = Some(Uuid::new_v4().to_string());
        }
        build.metadata.creation_timestamp.get_or_insert_with(Utc::now);
        build.status = status;
        self.builds
            .insert(key(&build.metadata.namespace, &build.metadata.name), build);
    }

    /// Scripts the sequence of statuses successive reads of a build will
    /// observe; the final status repeats once the sequence is exhausted.
    pub fn script_statuses<I>(&self, namespace: &str, name: &str, statuses: I)
    where
        I: IntoIterator<Item = BuildStatus>,
    {
        self.scripted_statuses
            .insert(key(namespace, name), statuses.into_iter().collect());
    }

    /// Seeds the log text of a build.
    pub fn seed_logs(&self, namespace: &str, name: &str, logs: &str) {
        self.logs.insert(key(namespace, name), logs.to_string());
    }

    /// Seeds a pod and its events.
    pub fn seed_pod(&self, pod: Pod, events: Vec<Event>) {
        self.events
            .insert(key(&pod.namespace, &pod.uid), events);
        self.pods.insert(key(&pod.namespace, &pod.name), pod);
    }

    /// Returns the UID of a stored build.
    #[must_use]
    pub fn build_uid(&self, namespace: &str, name: &str) -> Option<String> {
        self.builds
            .get(&key(namespace, name))
            .and_then(|b| b.metadata.uid.clone())
    }

    /// Returns a stored build without recording an API call.
    #[must_use]
    pub fn stored_build(&self, namespace: &str, name: &str) -> Option<Build> {
        self.builds.get(&key(namespace, name)).map(|b| b.value().clone())
    }

    /// Returns every recorded API call, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how many recorded calls start with the given prefix.
    #[must_use]
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// Clears the recorded call log.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn next_status(&self, build_key: &str) -> Option<BuildStatus> {
        let mut entry = self.scripted_statuses.get_mut(build_key)?;
        if entry.len() > 1 {
            entry.pop_front()
        } else {
            entry.front().cloned()
        }
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_build(&self, build: &Build) -> ApiResult<()> {
        let build_key = key(&build.metadata.namespace, &build.metadata.name);
        self.record(format!("create build {build_key}"));
        if self.builds.contains_key(&build_key) {
            return Err(ApiError::AlreadyExists {
                kind: "Build".to_string(),
                name: build.metadata.name.clone(),
            });
        }
        let mut created = build.clone();
        created.metadata.uid = Some(Uuid::new_v4().to_string());
        created.metadata.creation_timestamp = Some(Utc::now());
        self.builds.insert(build_key, created);
        Ok(())
    }

    async fn get_build(&self, namespace: &str, name: &str) -> ApiResult<Build> {
        let build_key = key(namespace, name);
        self.record(format!("get build {build_key}"));
        let Some(mut build) = self.builds.get(&build_key).map(|b| b.value().clone()) else {
            return Err(ApiError::NotFound {
                kind: "Build".to_string(),
                name: name.to_string(),
            });
        };
        if let Some(status) = self.next_status(&build_key) {
            build.status = status.clone();
            if let Some(mut stored) = self.builds.get_mut(&build_key) {
                stored.status = status;
            }
        }
        Ok(build)
    }

    async fn delete_build(
        &self,
        namespace: &str,
        name: &str,
        options: DeleteOptions,
    ) -> ApiResult<()> {
        let build_key = key(namespace, name);
        self.record(format!("delete build {build_key}"));
        let Some(build) = self.builds.get(&build_key).map(|b| b.value().clone()) else {
            return Err(ApiError::NotFound {
                kind: "Build".to_string(),
                name: name.to_string(),
            });
        };
        if let Some(expected) = &options.expected_uid {
            if build.metadata.uid.as_ref() != Some(expected) {
                return Err(ApiError::Conflict {
                    kind: "Build".to_string(),
                    name: name.to_string(),
                    message: "uid precondition failed".to_string(),
                });
            }
        }
        self.builds.remove(&build_key);
        Ok(())
    }

    async fn get_image_stream(&self, namespace: &str, name: &str) -> ApiResult<ImageStream> {
        self.record(format!("get imagestream {}", key(namespace, name)));
        self.streams
            .get(&key(namespace, name))
            .map(|s| s.value().clone())
            .ok_or_else(|| ApiError::NotFound {
                kind: "ImageStream".to_string(),
                name: name.to_string(),
            })
    }

    async fn get_image_stream_tag(&self, namespace: &str, name: &str) -> ApiResult<ImageStreamTag> {
        self.record(format!("get imagestreamtag {}", key(namespace, name)));
        self.stream_tags
            .get(&key(namespace, name))
            .map(|t| t.value().clone())
            .ok_or_else(|| ApiError::NotFound {
                kind: "ImageStreamTag".to_string(),
                name: name.to_string(),
            })
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ApiResult<Pod> {
        self.record(format!("get pod {}", key(namespace, name)));
        self.pods
            .get(&key(namespace, name))
            .map(|p| p.value().clone())
            .ok_or_else(|| ApiError::NotFound {
                kind: "Pod".to_string(),
                name: name.to_string(),
            })
    }

    async fn list_events_for(&self, namespace: &str, involved_uid: &str) -> ApiResult<Vec<Event>> {
        self.record(format!("list events {}", key(namespace, involved_uid)));
        Ok(self
            .events
            .get(&key(namespace, involved_uid))
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn build_logs(&self, namespace: &str, name: &str) -> ApiResult<String> {
        self.record(format!("logs build {}", key(namespace, name)));
        self.logs
            .get(&key(namespace, name))
            .map(|l| l.value().clone())
            .ok_or_else(|| ApiError::NotFound {
                kind: "BuildLog".to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BuildPhase, ObjectMeta};

    fn named_build(namespace: &str, name: &str) -> Build {
        Build {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                ..ObjectMeta::default()
            },
            ..Build::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let cluster = FakeCluster::new();
        let build = named_build("ns", "src");
        cluster.create_build(&build).await.unwrap();
        let err = cluster.create_build(&build).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(cluster.count_calls("create build ns/src"), 2);
    }

    #[tokio::test]
    async fn test_scripted_statuses_advance_and_repeat() {
        let cluster = FakeCluster::new();
        cluster.create_build(&named_build("ns", "src")).await.unwrap();
        cluster.script_statuses(
            "ns",
            "src",
            [
                BuildStatus {
                    phase: BuildPhase::Running,
                    ..BuildStatus::default()
                },
                BuildStatus {
                    phase: BuildPhase::Complete,
                    ..BuildStatus::default()
                },
            ],
        );

        let first = cluster.get_build("ns", "src").await.unwrap();
        assert_eq!(first.status.phase, BuildPhase::Running);
        let second = cluster.get_build("ns", "src").await.unwrap();
        assert_eq!(second.status.phase, BuildPhase::Complete);
        let third = cluster.get_build("ns", "src").await.unwrap();
        assert_eq!(third.status.phase, BuildPhase::Complete);
    }

    #[tokio::test]
    async fn test_delete_honors_uid_precondition() {
        let cluster = FakeCluster::new();
        cluster.create_build(&named_build("ns", "src")).await.unwrap();

        let err = cluster
            .delete_build("ns", "src", DeleteOptions::foreground_now(Some("wrong".into())))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let uid = cluster.build_uid("ns", "src");
        cluster
            .delete_build("ns", "src", DeleteOptions::foreground_now(uid))
            .await
            .unwrap();
        assert!(cluster.get_build("ns", "src").await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_publish_tag_is_deterministic() {
        let cluster = FakeCluster::new();
        let first = cluster.publish_tag("ns", "pipeline", "src");
        let second = cluster.publish_tag("ns", "pipeline", "src");
        assert_eq!(first, second);
        assert!(first.starts_with("sha256:"));
    }
}
