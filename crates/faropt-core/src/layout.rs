//! Key layout of the object store.
//!
//! ```text
//! {jobid}/source.zip            macro job archive
//! staged/{jobid}/source.zip     micro job archive
//! {prefix}/output/{file}        files written by the job
//! {modelname}/model.pkl         optimizer state
//! ```

use derive_new::new;
use faropt_package::SOURCE_ARCHIVE_NAME;

use crate::dispatch::BackendKind;
use crate::ids::{JobId, ModelName};

pub const STAGING_PREFIX: &str = "staged";
pub const OUTPUT_DIR: &str = "output";
pub const MODEL_FILE: &str = "model.pkl";

/// A single object: bucket plus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, new)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Where a job lives in the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLocation {
    bucket: String,
    prefix: String,
}

impl JobLocation {
    pub fn new(bucket: impl Into<String>, job_id: &JobId, backend: BackendKind) -> Self {
        let prefix = match backend {
            BackendKind::Macro => job_id.to_string(),
            BackendKind::Micro => format!("{STAGING_PREFIX}/{job_id}"),
        };
        Self {
            bucket: bucket.into(),
            prefix,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix shared by everything belonging to the job.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn source(&self) -> ObjectLocation {
        ObjectLocation::new(
            self.bucket.clone(),
            format!("{}/{SOURCE_ARCHIVE_NAME}", self.prefix),
        )
    }

    pub fn output_prefix(&self) -> String {
        format!("{}/{OUTPUT_DIR}/", self.prefix)
    }

    pub fn output(&self, file_name: &str) -> ObjectLocation {
        ObjectLocation::new(
            self.bucket.clone(),
            format!("{}{file_name}", self.output_prefix()),
        )
    }
}

pub fn model_key(name: &ModelName) -> String {
    format!("{name}/{MODEL_FILE}")
}
