//! Image stream and image stream tag objects.
//!
//! These are read-only to this library; the source resolver chains a stream
//! read and a tag read to produce a digest-pinned pull spec.

use serde::{Deserialize, Serialize};

/// A by-name reference to one tag of a namespaced image stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStreamTagReference {
    /// Namespace of the stream.
    pub namespace: String,
    /// Stream name.
    pub name: String,
    /// Tag within the stream.
    pub tag: String,
}

impl ImageStreamTagReference {
    /// Creates a new reference.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Returns the `name:tag` form used to address the tag object.
    #[must_use]
    pub fn tagged_name(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// Observed state of an image stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStreamStatus {
    /// Registry address reachable from outside the cluster.
    #[serde(default)]
    pub public_image_repository: String,
    /// Registry address reachable from inside the cluster.
    #[serde(default)]
    pub image_repository: String,
}

/// A named, namespace-scoped collection of image tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStream {
    /// Stream name.
    pub name: String,
    /// Stream namespace.
    pub namespace: String,
    /// Observed state.
    #[serde(default)]
    pub status: ImageStreamStatus,
}

/// A content-addressed image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// The image's content digest (e.g. `sha256:…`).
    pub name: String,
}

/// One resolved tag of an image stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStreamTag {
    /// The `stream:tag` name of this object.
    pub name: String,
    /// Namespace of the stream.
    pub namespace: String,
    /// The image the tag currently points at.
    pub image: Image,
}
