//! Artifact collection for harvested build logs.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

/// A sink harvested artifacts are written into.
///
/// All writes through this interface are best-effort from the caller's
/// perspective: a failed store is logged, never escalated.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Stores one named artifact.
    async fn store(&self, name: &str, contents: &[u8]) -> io::Result<()>;
}

/// Stores artifacts as files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSink {
    root: PathBuf,
}

impl DirectoryArtifactSink {
    /// Creates a sink rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactSink for DirectoryArtifactSink {
    async fn store(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryArtifactSink::new(dir.path());
        sink.store("src/build.log", b"log text").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("src/build.log")).unwrap();
        assert_eq!(written, "log text");
    }
}
