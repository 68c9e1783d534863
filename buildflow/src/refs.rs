//! Version-control references and clone authentication.
//!
//! A ref set describes exactly what source content must be checked out; a
//! clone-auth configuration rewrites each ref's clone URI to the scheme its
//! credential supports.

use serde::{Deserialize, Serialize};

/// A pull request layered on top of a base ref.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pull {
    /// Pull request number.
    pub number: u64,
    /// Author login.
    #[serde(default)]
    pub author: String,
    /// Head commit SHA.
    #[serde(default)]
    pub sha: String,
}

/// One version-control reference to check out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Organization or user owning the repository.
    pub org: String,
    /// Repository name.
    pub repo: String,
    /// Base branch or tag.
    pub base_ref: String,
    /// Commit the base ref resolves to.
    #[serde(default)]
    pub base_sha: String,
    /// Pull requests merged onto the base, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pulls: Vec<Pull>,
    /// Explicit clone URI; absent means the default HTTPS form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_uri: Option<String>,
    /// Checkout path override relative to the source root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_alias: Option<String>,
    /// Marks the ref whose checkout becomes the working directory.
    #[serde(default)]
    pub workdir: bool,
}

impl Ref {
    /// Creates a ref for a branch of a hosted repository.
    #[must_use]
    pub fn new(
        org: impl Into<String>,
        repo: impl Into<String>,
        base_ref: impl Into<String>,
    ) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
            base_ref: base_ref.into(),
            ..Self::default()
        }
    }

    /// Sets the base commit SHA.
    #[must_use]
    pub fn with_base_sha(mut self, sha: impl Into<String>) -> Self {
        self.base_sha = sha.into();
        self
    }

    /// Adds a pull request overlay.
    #[must_use]
    pub fn with_pull(mut self, pull: Pull) -> Self {
        self.pulls.push(pull);
        self
    }

    /// Returns the import-path-style checkout location relative to the
    /// source root, honoring a path alias when present.
    #[must_use]
    pub fn import_path(&self) -> String {
        self.path_alias
            .clone()
            .unwrap_or_else(|| format!("github.com/{}/{}", self.org, self.repo))
    }

    /// Returns the anonymous HTTPS clone location of the repository.
    #[must_use]
    pub fn https_url(&self) -> String {
        format!("https://github.com/{}/{}", self.org, self.repo)
    }
}

/// Which credential a clone-auth configuration references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloneAuthMode {
    /// SSH private key authentication.
    #[serde(rename = "SSH")]
    Ssh,
    /// OAuth token authentication over HTTPS.
    #[serde(rename = "OAuth")]
    OAuth,
}

/// A reference to an existing clone credential.
///
/// Determines the clone URI scheme and which credential file is injected
/// into (and removed from) the generated build script. Absence of a
/// configuration means anonymous HTTPS cloning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneAuth {
    /// Name of the secret holding the credential. The secret is assumed to
    /// already exist; it is only referenced by name.
    pub secret_name: String,
    /// The authentication mode.
    pub mode: CloneAuthMode,
}

impl CloneAuth {
    /// Creates an SSH clone-auth configuration.
    #[must_use]
    pub fn ssh(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            mode: CloneAuthMode::Ssh,
        }
    }

    /// Creates an OAuth clone-auth configuration.
    #[must_use]
    pub fn oauth(secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            mode: CloneAuthMode::OAuth,
        }
    }

    /// Returns the clone URI for a repository under this auth scheme.
    #[must_use]
    pub fn clone_uri(&self, org: &str, repo: &str) -> String {
        match self.mode {
            CloneAuthMode::Ssh => format!("ssh://git@github.com/{org}/{repo}.git"),
            CloneAuthMode::OAuth => format!("https://github.com/{org}/{repo}.git"),
        }
    }
}

/// Collects the refs to clone with their effective clone URIs.
///
/// A configured clone auth rewrites every ref's URI to its scheme; without
/// one, refs that carry no explicit URI default to anonymous HTTPS. The
/// primary ref is cloned first, then the extras. Callers keep ownership of
/// their ref objects; rewriting happens on copies.
#[must_use]
pub fn gather_refs(
    primary: Option<&Ref>,
    extras: &[Ref],
    clone_auth: Option<&CloneAuth>,
) -> Vec<Ref> {
    let rewrite = |r: &Ref| {
        let mut r = r.clone();
        if let Some(auth) = clone_auth {
            r.clone_uri = Some(auth.clone_uri(&r.org, &r.repo));
        } else if r.clone_uri.is_none() {
            r.clone_uri = Some(format!("{}.git", r.https_url()));
        }
        r
    };

    primary
        .into_iter()
        .chain(extras.iter())
        .map(rewrite)
        .collect()
}

/// Derives the build working directory from the ref set.
///
/// Prefers the ref marked as the workdir, falling back to the first ref;
/// mirrors the standard Go-style import-path layout under `root/src`.
#[must_use]
pub fn determine_workdir(root: &str, refs: &[Ref]) -> String {
    let chosen = refs.iter().find(|r| r.workdir).or_else(|| refs.first());
    match chosen {
        Some(r) => format!("{root}/src/{}", r.import_path()),
        None => format!("{root}/src"),
    }
}
