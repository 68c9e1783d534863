//! Build request assembly.
//!
//! Translates a source step's declarative configuration into a fully-formed
//! build request: a generated build script that clones the declared refs
//! (injecting and afterwards removing any clone credential), the cloner's
//! runtime options embedded as an environment variable, and cluster/image
//! provenance labels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::{
    Build, BuildOutput, BuildSource, BuildSpec, ContainerBuildStrategy, EnvVar, ImageLabel,
    ImageSource, ImageSourcePath, ObjectMeta, ObjectReference, SecretBuildSource,
};
use crate::errors::{Error, Result};
use crate::job::JobContext;
use crate::labels::{default_job_labels, trim_labels, CREATES_LABEL, JOB_SPEC_ANNOTATION};
use crate::refs::{determine_workdir, gather_refs, CloneAuth, CloneAuthMode, Ref};
use crate::resources::{translate, ResourceConfiguration, ResourceSpec};
use crate::step::SourceStepConfig;

/// The image stream all pipeline-internal images are published under.
pub const PIPELINE_IMAGE_STREAM: &str = "pipeline";

/// Root of the checkout tree inside the produced image.
pub const SOURCE_ROOT: &str = "/go";

/// Environment variable carrying the cloner's serialized runtime options.
pub const CLONE_OPTIONS_ENV: &str = "CLONE_OPTIONS";

/// Key under which an SSH credential secret stores its private key.
pub const SSH_PRIVATE_KEY_SECRET_KEY: &str = "ssh-privatekey";

/// Key under which an OAuth credential secret stores its token.
pub const OAUTH_SECRET_KEY: &str = "oauth-token";

const CLONER_BINARY_PATH: &str = "/cloner";
const SSH_CONFIG_PATH: &str = "/ssh_config";
const SSH_PRIVATE_KEY_PATH: &str = "/ssh-privatekey";
const OAUTH_TOKEN_PATH: &str = "/oauth-token";

const GIT_USER_NAME: &str = "ci-robot";
const GIT_USER_EMAIL: &str = "ci-robot@buildflow.io";

/// Runtime options for the cloner binary, serialized into
/// [`CLONE_OPTIONS_ENV`] on the build strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOptions {
    /// Root directory the refs are checked out under.
    pub src_root: String,
    /// Where the cloner writes its own log.
    pub log: String,
    /// Git user name for merge commits.
    pub git_user_name: String,
    /// Git user email for merge commits.
    pub git_user_email: String,
    /// The refs to clone, in order.
    pub refs: Vec<Ref>,
    /// Abort on the first clone error.
    pub fail: bool,
    /// SSH private key files to load.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_files: Vec<String>,
    /// OAuth token file to load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token_file: Option<String>,
}

/// Generates the container build script for a source clone.
///
/// The script starts from the base pipeline tag, copies in the cloner
/// binary and any credential, clones with strict permission normalization
/// over the checkout tree, and removes the injected credential file in the
/// same script so it never persists in the image's layer history.
#[must_use]
pub fn clone_script(from_tag: &str, workdir: &str, clone_auth: Option<&CloneAuth>) -> String {
    let mut lines = vec![String::new()];
    let mut secret_path = None;

    lines.push(format!("FROM {PIPELINE_IMAGE_STREAM}:{from_tag}"));
    lines.push(format!("ADD ./cloner {CLONER_BINARY_PATH}"));

    if let Some(auth) = clone_auth {
        match auth.mode {
            CloneAuthMode::Ssh => {
                lines.push(format!("ADD {SSH_CONFIG_PATH} /etc/ssh/ssh_config"));
                lines.push(format!(
                    "COPY ./{SSH_PRIVATE_KEY_SECRET_KEY} {SSH_PRIVATE_KEY_PATH}"
                ));
                secret_path = Some(SSH_PRIVATE_KEY_PATH);
            }
            CloneAuthMode::OAuth => {
                lines.push(format!("COPY ./{OAUTH_SECRET_KEY} {OAUTH_TOKEN_PATH}"));
                secret_path = Some(OAUTH_TOKEN_PATH);
            }
        }
    }

    lines.push(format!(
        "RUN umask 0002 && {CLONER_BINARY_PATH} && find {SOURCE_ROOT}/src -type d -not -perm -0775 | xargs --max-procs 10 --max-args 100 --no-run-if-empty chmod g+xw"
    ));
    lines.push(format!("WORKDIR {workdir}/"));
    lines.push(format!("ENV GOPATH={SOURCE_ROOT}"));

    // The credential is only needed by the clone step above; it must not
    // survive into the image's layer history.
    if let Some(path) = secret_path {
        lines.push(format!("RUN rm -f {path}"));
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Computes the provenance labels stamped onto the produced image.
///
/// The full label set is always emitted, name-sorted, with empty strings
/// resetting any value a lower layer may have set. Values are filled from
/// the primary ref only when it carries no pull-request overlay.
#[must_use]
pub fn provenance_image_labels(primary: Option<&Ref>, context_dir: &str) -> Vec<ImageLabel> {
    let mut labels: BTreeMap<&str, String> = [
        "vcs-type",
        "vcs-ref",
        "vcs-url",
        "io.buildflow.build.name",
        "io.buildflow.build.namespace",
        "io.buildflow.build.commit.id",
        "io.buildflow.build.commit.ref",
        "io.buildflow.build.commit.message",
        "io.buildflow.build.commit.author",
        "io.buildflow.build.commit.date",
        "io.buildflow.build.source-location",
        "io.buildflow.build.source-context-dir",
    ]
    .into_iter()
    .map(|name| (name, String::new()))
    .collect();

    if let Some(r) = primary {
        if r.pulls.is_empty() {
            let url = r.https_url();
            labels.insert("vcs-type", "git".to_string());
            labels.insert("vcs-ref", r.base_sha.clone());
            labels.insert("vcs-url", url.clone());
            labels.insert("io.buildflow.build.commit.id", r.base_sha.clone());
            labels.insert("io.buildflow.build.commit.ref", r.base_ref.clone());
            labels.insert("io.buildflow.build.source-location", url);
            labels.insert(
                "io.buildflow.build.source-context-dir",
                context_dir.to_string(),
            );
        }
    }

    labels
        .into_iter()
        .map(|(name, value)| ImageLabel {
            name: name.to_string(),
            value,
        })
        .collect()
}

/// Builds the common build shell around a source: identity, labels, the
/// base image reference, strategy defaults and the output target.
fn build_from_source(
    job: &JobContext,
    from_tag: Option<&str>,
    to_tag: &str,
    source: BuildSource,
    resources: ResourceSpec,
    pull_secret: Option<&str>,
) -> Build {
    tracing::info!(build = to_tag, "assembling build");

    let from = from_tag.filter(|tag| !tag.is_empty()).map(|tag| {
        ObjectReference::namespaced(
            "ImageStreamTag",
            &job.namespace,
            format!("{PIPELINE_IMAGE_STREAM}:{tag}"),
        )
    });

    let mut labels = default_job_labels(job);
    labels.insert(CREATES_LABEL.to_string(), to_tag.to_string());
    let labels = trim_labels(labels);

    let mut metadata = ObjectMeta {
        name: to_tag.to_string(),
        namespace: job.namespace.clone(),
        labels,
        annotations: BTreeMap::from([(JOB_SPEC_ANNOTATION.to_string(), job.raw_spec.clone())]),
        ..ObjectMeta::default()
    };
    if let Some(owner) = &job.owner {
        metadata.owner_references.push(owner.clone());
    }

    let context_dir = source.context_dir.clone();
    Build {
        metadata,
        spec: BuildSpec {
            resources,
            source,
            strategy: ContainerBuildStrategy {
                from,
                force_pull: true,
                no_cache: true,
                env: vec![EnvVar {
                    name: "BUILD_LOGLEVEL".to_string(),
                    value: "0".to_string(),
                }],
                pull_secret: pull_secret.map(ToString::to_string),
            },
            output: BuildOutput {
                to: Some(ObjectReference::namespaced(
                    "ImageStreamTag",
                    &job.namespace,
                    format!("{PIPELINE_IMAGE_STREAM}:{to_tag}"),
                )),
                image_labels: provenance_image_labels(job.refs.as_ref(), &context_dir),
            },
        },
        status: crate::api::BuildStatus::default(),
    }
}

/// Assembles the full build request for a source clone step.
///
/// # Errors
///
/// Returns [`Error::MalformedQuantity`] when the step's resource
/// requirements do not parse and [`Error::Serialization`] when the cloner
/// options cannot be encoded.
pub fn assemble_build(
    config: &SourceStepConfig,
    job: &JobContext,
    cloner_ref: ObjectReference,
    resources: &ResourceConfiguration,
    clone_auth: Option<&CloneAuth>,
    pull_secret: Option<&str>,
) -> Result<Build> {
    let refs = gather_refs(job.refs.as_ref(), &job.extra_refs, clone_auth);
    let workdir = determine_workdir(SOURCE_ROOT, &refs);
    let script = clone_script(&config.from, &workdir, clone_auth);

    let mut source = BuildSource {
        script: Some(script),
        images: vec![ImageSource {
            from: cloner_ref.clone(),
            paths: vec![ImageSourcePath {
                source_path: config.cloner_path.clone(),
                destination_dir: ".".to_string(),
            }],
        }],
        secrets: Vec::new(),
        context_dir: String::new(),
    };

    let mut options = CloneOptions {
        src_root: SOURCE_ROOT.to_string(),
        log: "/dev/null".to_string(),
        git_user_name: GIT_USER_NAME.to_string(),
        git_user_email: GIT_USER_EMAIL.to_string(),
        refs,
        fail: true,
        key_files: Vec::new(),
        oauth_token_file: None,
    };

    if let Some(auth) = clone_auth {
        source.secrets.push(SecretBuildSource {
            secret: auth.secret_name.clone(),
        });
        match auth.mode {
            CloneAuthMode::Ssh => {
                // The SSH client config ships alongside the cloner binary.
                for image in &mut source.images {
                    if image.from == cloner_ref {
                        image.paths.push(ImageSourcePath {
                            source_path: SSH_CONFIG_PATH.to_string(),
                            destination_dir: ".".to_string(),
                        });
                    }
                }
                options.key_files.push(SSH_PRIVATE_KEY_PATH.to_string());
            }
            CloneAuthMode::OAuth => {
                options.oauth_token_file = Some(OAUTH_TOKEN_PATH.to_string());
            }
        }
    }

    let options_json =
        serde_json::to_string(&options).map_err(|e| Error::Serialization(e.to_string()))?;

    let resource_spec = translate(&resources.for_step(&config.to))?;
    let mut build = build_from_source(
        job,
        Some(&config.from),
        &config.to,
        source,
        resource_spec,
        pull_secret,
    );
    build.spec.strategy.env.push(EnvVar {
        name: CLONE_OPTIONS_ENV.to_string(),
        value: options_json,
    });

    Ok(build)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::api::ImageStreamTagReference;
    use crate::refs::Pull;

    fn test_config() -> SourceStepConfig {
        SourceStepConfig {
            from: "root".to_string(),
            to: "src".to_string(),
            cloner_image: ImageStreamTagReference::new("ci", "tools", "cloner"),
            cloner_path: "/usr/bin/cloner".to_string(),
        }
    }

    fn test_job() -> JobContext {
        JobContext {
            namespace: "ci-op-1234".to_string(),
            job: "pull-unit".to_string(),
            build_id: "7".to_string(),
            job_run_id: "run-99".to_string(),
            refs: Some(Ref::new("o", "r", "main").with_base_sha("deadbeef")),
            raw_spec: r#"{"job":"pull-unit"}"#.to_string(),
            ..JobContext::default()
        }
    }

    fn cloner_ref() -> ObjectReference {
        ObjectReference::docker_image("registry.example.com/ci/tools@sha256:feed")
    }

    #[test]
    fn test_clone_script_anonymous_has_no_credential_handling() {
        let script = clone_script("root", "/go/src/github.com/o/r", None);
        assert!(script.starts_with("\nFROM pipeline:root\n"));
        assert!(script.contains("ADD ./cloner /cloner"));
        assert!(script.contains("RUN umask 0002 && /cloner && find /go/src"));
        assert!(script.contains("WORKDIR /go/src/github.com/o/r/"));
        assert!(script.contains("ENV GOPATH=/go"));
        assert!(!script.contains("rm -f"));
        assert!(!script.contains("COPY"));
        assert!(script.ends_with('\n'));
    }

    #[test]
    fn test_clone_script_ssh_injects_and_removes_key() {
        let auth = CloneAuth::ssh("ssh-creds");
        let script = clone_script("root", "/go/src/github.com/o/r", Some(&auth));
        assert!(script.contains("ADD /ssh_config /etc/ssh/ssh_config"));
        assert!(script.contains("COPY ./ssh-privatekey /ssh-privatekey"));
        assert!(script.contains("RUN rm -f /ssh-privatekey"));
        // Removal comes after the clone step.
        let clone_at = script.find("RUN umask").unwrap();
        let rm_at = script.find("RUN rm -f").unwrap();
        assert!(rm_at > clone_at);
    }

    #[test]
    fn test_clone_script_oauth_injects_and_removes_token() {
        let auth = CloneAuth::oauth("oauth-creds");
        let script = clone_script("root", "/go/src/github.com/o/r", Some(&auth));
        assert!(script.contains("COPY ./oauth-token /oauth-token"));
        assert!(script.contains("RUN rm -f /oauth-token"));
        assert!(!script.contains("ssh_config"));
    }

    #[test]
    fn test_assemble_build_basic_shape() {
        let build = assemble_build(
            &test_config(),
            &test_job(),
            cloner_ref(),
            &ResourceConfiguration::new(),
            None,
            None,
        )
        .unwrap();

        assert_eq!(build.metadata.name, "src");
        assert_eq!(build.metadata.namespace, "ci-op-1234");
        assert_eq!(build.metadata.labels[CREATES_LABEL], "src");
        assert_eq!(
            build.metadata.annotations[JOB_SPEC_ANNOTATION],
            r#"{"job":"pull-unit"}"#
        );
        assert_eq!(
            build.spec.output.to.as_ref().unwrap().name,
            "pipeline:src"
        );
        assert_eq!(
            build.spec.strategy.from.as_ref().unwrap().name,
            "pipeline:root"
        );
        assert!(build.spec.strategy.force_pull);
        assert!(build.spec.strategy.no_cache);
        assert_eq!(build.spec.strategy.pull_secret, None);
        assert!(build.spec.source.secrets.is_empty());
    }

    #[test]
    fn test_assemble_build_embeds_clone_options() {
        let build = assemble_build(
            &test_config(),
            &test_job(),
            cloner_ref(),
            &ResourceConfiguration::new(),
            None,
            None,
        )
        .unwrap();

        let env = build
            .spec
            .strategy
            .env
            .iter()
            .find(|e| e.name == CLONE_OPTIONS_ENV)
            .unwrap();
        let options: CloneOptions = serde_json::from_str(&env.value).unwrap();
        assert!(options.fail);
        assert_eq!(options.src_root, "/go");
        assert_eq!(options.refs.len(), 1);
        assert_eq!(options.refs[0].org, "o");
        assert_eq!(
            options.refs[0].clone_uri.as_deref(),
            Some("https://github.com/o/r.git")
        );
        assert_eq!(options.key_files, Vec::<String>::new());
        assert_eq!(options.oauth_token_file, None);
    }

    #[test]
    fn test_assemble_build_ssh_wiring() {
        let auth = CloneAuth::ssh("ssh-creds");
        let build = assemble_build(
            &test_config(),
            &test_job(),
            cloner_ref(),
            &ResourceConfiguration::new(),
            Some(&auth),
            Some("registry-pull-credentials"),
        )
        .unwrap();

        assert_eq!(build.spec.source.secrets.len(), 1);
        assert_eq!(build.spec.source.secrets[0].secret, "ssh-creds");
        assert_eq!(
            build.spec.strategy.pull_secret.as_deref(),
            Some("registry-pull-credentials")
        );
        // The cloner image contributes both the binary and the SSH config.
        assert_eq!(build.spec.source.images[0].paths.len(), 2);
        assert_eq!(build.spec.source.images[0].paths[1].source_path, "/ssh_config");

        let env = build
            .spec
            .strategy
            .env
            .iter()
            .find(|e| e.name == CLONE_OPTIONS_ENV)
            .unwrap();
        let options: CloneOptions = serde_json::from_str(&env.value).unwrap();
        assert_eq!(options.key_files, vec!["/ssh-privatekey".to_string()]);
        assert_eq!(
            options.refs[0].clone_uri.as_deref(),
            Some("ssh://git@github.com/o/r.git")
        );
    }

    #[test]
    fn test_assemble_build_is_deterministic() {
        let assemble = || {
            assemble_build(
                &test_config(),
                &test_job(),
                cloner_ref(),
                &ResourceConfiguration::new(),
                None,
                None,
            )
            .unwrap()
        };
        let first = assemble();
        let second = assemble();
        assert_eq!(first.metadata.name, second.metadata.name);
        assert_eq!(first.metadata.labels, second.metadata.labels);
        assert_eq!(first.spec.source.script, second.spec.source.script);
        assert_eq!(first, second);
    }

    #[test]
    fn test_provenance_labels_sorted_and_filled() {
        let primary = Ref::new("o", "r", "main").with_base_sha("deadbeef");
        let labels = provenance_image_labels(Some(&primary), "");

        let names: Vec<_> = labels.iter().map(|l| l.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);

        let get = |name: &str| {
            labels
                .iter()
                .find(|l| l.name == name)
                .map(|l| l.value.as_str())
                .unwrap()
        };
        assert_eq!(get("vcs-type"), "git");
        assert_eq!(get("vcs-ref"), "deadbeef");
        assert_eq!(get("vcs-url"), "https://github.com/o/r");
        assert_eq!(get("io.buildflow.build.commit.ref"), "main");
        assert_eq!(get("io.buildflow.build.commit.message"), "");
    }

    #[test]
    fn test_provenance_labels_reset_for_pull_request_builds() {
        let primary = Ref::new("o", "r", "main")
            .with_base_sha("deadbeef")
            .with_pull(Pull {
                number: 17,
                author: "dev".to_string(),
                sha: "cafe".to_string(),
            });
        let labels = provenance_image_labels(Some(&primary), "");
        assert_eq!(labels.len(), 12);
        for label in labels {
            assert_eq!(label.value, "", "{} should be reset", label.name);
        }
    }

    #[test]
    fn test_assemble_build_rejects_malformed_resources() {
        let resources = ResourceConfiguration::new().with_step(
            "src",
            crate::resources::ResourceRequirements::new([("cpu", "banana")], []),
        );
        let err = assemble_build(
            &test_config(),
            &test_job(),
            cloner_ref(),
            &resources,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedQuantity { .. }));
    }
}
