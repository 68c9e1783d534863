//! Job metadata supplied by the surrounding pipeline executor.

use serde::{Deserialize, Serialize};

use crate::api::OwnerReference;
use crate::refs::Ref;

/// Identity and provenance of the pipeline job a step runs within.
///
/// Owned by the caller; read-only to this library. The raw job specification
/// is opaque here and stored verbatim in a build annotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    /// Namespace all of the job's builds run in.
    pub namespace: String,
    /// Job name.
    pub job: String,
    /// Sequential build identifier within the job.
    pub build_id: String,
    /// Unique identifier of this job run.
    pub job_run_id: String,
    /// The primary ref the job was triggered for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Ref>,
    /// Additional refs to check out alongside the primary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_refs: Vec<Ref>,
    /// Owner reference attached to created objects for garbage collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerReference>,
    /// The raw serialized job specification.
    #[serde(default)]
    pub raw_spec: String,
}

impl JobContext {
    /// Returns the ref provenance labels derive from: the primary ref, or
    /// the first extra ref when the job carries no primary.
    #[must_use]
    pub fn provenance_ref(&self) -> Option<&Ref> {
        self.refs.as_ref().or_else(|| self.extra_refs.first())
    }
}
