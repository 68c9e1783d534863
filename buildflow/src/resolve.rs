//! Resolution of named image references to concrete pull specifications.

use std::sync::Arc;

use crate::api::{ClusterClient, ImageStreamTagReference, ObjectReference};
use crate::errors::{Error, Result};
use crate::step::DeferredValue;

/// Resolves a named image stream tag to a digest-pinned pull specification.
///
/// Two chained point-reads: the stream yields its registry-accessible
/// repository address (public preferred, internal as fallback), then the tag
/// yields the content digest. Errors are surfaced with context and never
/// retried here; retry, if any, is the caller's responsibility.
///
/// # Errors
///
/// Returns [`Error::Api`] when either lookup fails and
/// [`Error::StreamUnresolvable`] when the stream exposes no repository
/// address at all.
pub async fn resolve_pull_spec(
    client: &dyn ClusterClient,
    reference: &ImageStreamTagReference,
) -> Result<ObjectReference> {
    let stream = client
        .get_image_stream(&reference.namespace, &reference.name)
        .await
        .map_err(|e| Error::api("could not resolve remote image stream", e))?;

    let repository = if stream.status.public_image_repository.is_empty() {
        &stream.status.image_repository
    } else {
        &stream.status.public_image_repository
    };
    if repository.is_empty() {
        return Err(Error::StreamUnresolvable {
            name: reference.name.clone(),
        });
    }

    let tag = client
        .get_image_stream_tag(&reference.namespace, &reference.tagged_name())
        .await
        .map_err(|e| Error::api("could not resolve remote image stream tag", e))?;

    Ok(ObjectReference::docker_image(format!(
        "{repository}@{}",
        tag.image.name
    )))
}

/// Returns a deferred lookup of the content digest a pipeline tag points at.
///
/// The digest does not exist until the producing build completes, so the
/// value is computed on read, not at graph-construction time.
#[must_use]
pub fn image_digest_for(
    client: Arc<dyn ClusterClient>,
    namespace: String,
    stream: String,
    tag: String,
) -> DeferredValue {
    DeferredValue::new(move || {
        let client = Arc::clone(&client);
        let namespace = namespace.clone();
        let name = format!("{stream}:{tag}");
        Box::pin(async move {
            let tag = client
                .get_image_stream_tag(&namespace, &name)
                .await
                .map_err(|e| Error::api(format!("could not resolve image {name}"), e))?;
            Ok(tag.image.name)
        })
    })
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::api::{ApiError, Image, ImageStream, ImageStreamStatus, ImageStreamTag,
        MockClusterClient};

    fn stream_with(public: &str, internal: &str) -> ImageStream {
        ImageStream {
            name: "tools".to_string(),
            namespace: "ci".to_string(),
            status: ImageStreamStatus {
                public_image_repository: public.to_string(),
                image_repository: internal.to_string(),
            },
        }
    }

    fn tag_with_digest(digest: &str) -> ImageStreamTag {
        ImageStreamTag {
            name: "tools:cloner".to_string(),
            namespace: "ci".to_string(),
            image: Image {
                name: digest.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_resolve_prefers_public_repository() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_image_stream()
            .with(eq("ci"), eq("tools"))
            .returning(|_, _| Ok(stream_with("registry.example.com/ci/tools", "internal/ci/tools")));
        client
            .expect_get_image_stream_tag()
            .with(eq("ci"), eq("tools:cloner"))
            .returning(|_, _| Ok(tag_with_digest("sha256:feed")));

        let reference = ImageStreamTagReference::new("ci", "tools", "cloner");
        let pull_spec = resolve_pull_spec(&client, &reference).await.unwrap();
        assert_eq!(pull_spec.kind, "DockerImage");
        assert_eq!(pull_spec.name, "registry.example.com/ci/tools@sha256:feed");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_internal_repository() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_image_stream()
            .returning(|_, _| Ok(stream_with("", "internal/ci/tools")));
        client
            .expect_get_image_stream_tag()
            .returning(|_, _| Ok(tag_with_digest("sha256:feed")));

        let reference = ImageStreamTagReference::new("ci", "tools", "cloner");
        let pull_spec = resolve_pull_spec(&client, &reference).await.unwrap();
        assert_eq!(pull_spec.name, "internal/ci/tools@sha256:feed");
    }

    #[tokio::test]
    async fn test_resolve_fails_without_any_repository() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_image_stream()
            .returning(|_, _| Ok(stream_with("", "")));

        let reference = ImageStreamTagReference::new("ci", "tools", "cloner");
        let err = resolve_pull_spec(&client, &reference).await.unwrap_err();
        assert!(matches!(err, Error::StreamUnresolvable { name } if name == "tools"));
    }

    #[tokio::test]
    async fn test_resolve_surfaces_lookup_errors_with_context() {
        let mut client = MockClusterClient::new();
        client.expect_get_image_stream().returning(|_, name| {
            Err(ApiError::NotFound {
                kind: "ImageStream".to_string(),
                name: name.to_string(),
            })
        });

        let reference = ImageStreamTagReference::new("ci", "tools", "cloner");
        let err = resolve_pull_spec(&client, &reference).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("could not resolve remote image stream"));
    }
}
