//! Cluster label and annotation names, and label-value trimming.

use std::collections::BTreeMap;

use crate::job::JobContext;

/// Prefix for annotations and namespaced labels owned by this system.
pub const CI_ANNOTATION_PREFIX: &str = "ci.buildflow.io";

/// Label carrying the job name.
pub const JOB_LABEL: &str = "job";
/// Label carrying the build identifier within the job.
pub const BUILD_ID_LABEL: &str = "build-id";
/// Label carrying the unique job-run identifier.
pub const JOB_RUN_ID_LABEL: &str = "ci.buildflow.io/job-run-id";
/// Label marking objects created by the CI system.
pub const CREATED_BY_CI_LABEL: &str = "created-by-ci";
/// Label naming the pipeline tag an object creates.
pub const CREATES_LABEL: &str = "creates";

/// Label carrying the triggering ref's organization.
pub const REFS_ORG_LABEL: &str = "ci.buildflow.io/refs.org";
/// Label carrying the triggering ref's repository.
pub const REFS_REPO_LABEL: &str = "ci.buildflow.io/refs.repo";
/// Label carrying the triggering ref's branch.
pub const REFS_BRANCH_LABEL: &str = "ci.buildflow.io/refs.branch";

/// Annotation storing the raw serialized job specification.
pub const JOB_SPEC_ANNOTATION: &str = "ci.buildflow.io/job-spec";

/// Maximum length of a valid label value.
pub const MAX_LABEL_LEN: usize = 63;

const TRIM_MARKER: &str = "XXX";
const TRIM_KEEP: usize = MAX_LABEL_LEN - TRIM_MARKER.len();

/// Trims every label value to at most [`MAX_LABEL_LEN`] characters.
///
/// Overlong values are cut to 60 characters plus a fixed `XXX` marker so
/// truncation stays deterministic and visible.
#[must_use]
pub fn trim_labels(mut labels: BTreeMap<String, String>) -> BTreeMap<String, String> {
    for value in labels.values_mut() {
        if value.len() > MAX_LABEL_LEN {
            // Back off to a char boundary so the cut never splits a code point.
            let mut cut = TRIM_KEEP;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            value.truncate(cut);
            value.push_str(TRIM_MARKER);
        }
    }
    labels
}

/// Returns the default labels for objects created on behalf of a job,
/// including ref labels when the job carries any ref.
#[must_use]
pub fn default_job_labels(job: &JobContext) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        (JOB_LABEL.to_string(), job.job.clone()),
        (BUILD_ID_LABEL.to_string(), job.build_id.clone()),
        (JOB_RUN_ID_LABEL.to_string(), job.job_run_id.clone()),
        (CREATED_BY_CI_LABEL.to_string(), "true".to_string()),
    ]);
    if let Some(r) = job.provenance_ref() {
        labels.insert(REFS_ORG_LABEL.to_string(), r.org.clone());
        labels.insert(REFS_REPO_LABEL.to_string(), r.repo.clone());
        labels.insert(REFS_BRANCH_LABEL.to_string(), r.base_ref.clone());
    }
    trim_labels(labels)
}
