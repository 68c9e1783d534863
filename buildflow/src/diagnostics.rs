//! Diagnostic text assembly for failed builds.
//!
//! Everything here is best-effort and off the critical path of
//! success/failure determination; a collection failure degrades to an empty
//! string, never to an error.

use std::fmt::Write as _;

use crate::api::{ClusterClient, Pod};

/// Summarizes the unready containers of a pod, one line per container with
/// its reason and message.
#[must_use]
pub fn unready_container_reasons(pod: &Pod) -> String {
    let mut text = String::new();
    for container in &pod.status.container_statuses {
        if container.ready {
            continue;
        }
        let detail = container
            .state
            .waiting
            .as_ref()
            .or(container.state.running.as_ref())
            .or(container.state.terminated.as_ref());
        let (reason, message) = detail.map_or(("unknown", "unknown"), |d| {
            (d.reason.as_str(), d.message.as_str())
        });
        let message = if message.is_empty() {
            String::new()
        } else {
            format!(" and message {message}")
        };
        let _ = write!(
            text,
            "\n* Container {} is not ready with reason {reason}{message}",
            container.name
        );
    }
    text
}

/// Fetches and formats the events attached to a pod.
///
/// Returns an empty string when the event listing fails.
pub async fn pod_events_text(client: &dyn ClusterClient, pod: &Pod) -> String {
    let events = match client.list_events_for(&pod.namespace, &pod.uid).await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(pod = %pod.name, error = %e, "could not fetch events");
            return String::new();
        }
    };

    let mut text = format!("Found {} events for Pod {}:", events.len(), pod.name);
    for event in events {
        let _ = write!(
            text,
            "\n* {}x {}: {}",
            event.count, event.source_component, event.message
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::api::{
        ApiError, ContainerState, ContainerStateDetail, ContainerStatus, Event,
        MockClusterClient, PodStatus,
    };

    fn pod_with_statuses(statuses: Vec<ContainerStatus>) -> Pod {
        Pod {
            name: "src-build".to_string(),
            namespace: "ci-op-1234".to_string(),
            uid: "uid-1".to_string(),
            status: PodStatus {
                container_statuses: statuses,
            },
        }
    }

    #[test]
    fn test_unready_reasons_skip_ready_containers() {
        let pod = pod_with_statuses(vec![
            ContainerStatus {
                name: "ready".to_string(),
                ready: true,
                state: ContainerState::default(),
            },
            ContainerStatus {
                name: "stuck".to_string(),
                ready: false,
                state: ContainerState {
                    waiting: Some(ContainerStateDetail {
                        reason: "ImagePullBackOff".to_string(),
                        message: "pull failed".to_string(),
                    }),
                    ..ContainerState::default()
                },
            },
        ]);

        assert_eq!(
            unready_container_reasons(&pod),
            "\n* Container stuck is not ready with reason ImagePullBackOff and message pull failed"
        );
    }

    #[test]
    fn test_unready_reasons_unknown_state() {
        let pod = pod_with_statuses(vec![ContainerStatus {
            name: "mystery".to_string(),
            ready: false,
            state: ContainerState::default(),
        }]);
        assert_eq!(
            unready_container_reasons(&pod),
            "\n* Container mystery is not ready with reason unknown and message unknown"
        );
    }

    #[tokio::test]
    async fn test_pod_events_text_formats_events() {
        let mut client = MockClusterClient::new();
        client.expect_list_events_for().returning(|_, _| {
            Ok(vec![Event {
                count: 3,
                source_component: "kubelet".to_string(),
                message: "Back-off pulling image".to_string(),
            }])
        });

        let pod = pod_with_statuses(Vec::new());
        let text = pod_events_text(&client, &pod).await;
        assert_eq!(
            text,
            "Found 1 events for Pod src-build:\n* 3x kubelet: Back-off pulling image"
        );
    }

    #[tokio::test]
    async fn test_pod_events_text_swallows_errors() {
        let mut client = MockClusterClient::new();
        client
            .expect_list_events_for()
            .returning(|_, _| Err(ApiError::Transport("boom".to_string())));

        let pod = pod_with_statuses(Vec::new());
        assert_eq!(pod_events_text(&client, &pod).await, "");
    }
}
