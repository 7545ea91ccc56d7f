use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::TableStore;
use crate::dispatch::BackendKind;
use crate::error::{FarOptError, LogErr};
use crate::ids::{JobId, RecipeId};
use crate::layout::{ObjectLocation, STAGING_PREFIX};

/// A row of a registry table.
pub trait RegistryRow: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn key(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize, derive_new::new)]
pub struct JobRecord {
    pub jobid: JobId,
    pub bucket: String,
    /// Key of the job archive.
    pub path: String,
}

impl JobRecord {
    pub fn archive(&self) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), self.path.clone())
    }

    pub fn backend(&self) -> BackendKind {
        if self.path.starts_with(&format!("{STAGING_PREFIX}/")) {
            BackendKind::Micro
        } else {
            BackendKind::Macro
        }
    }
}

impl RegistryRow for JobRecord {
    const KIND: &'static str = "job";

    fn key(&self) -> String {
        self.jobid.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize, derive_new::new)]
pub struct RecipeRecord {
    pub recipeid: RecipeId,
    pub description: String,
    pub bucket: String,
    /// Key of the archive the recipe re-runs.
    pub path: String,
    pub maintainer: String,
}

impl RecipeRecord {
    pub fn archive(&self) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), self.path.clone())
    }
}

impl RegistryRow for RecipeRecord {
    const KIND: &'static str = "recipe";

    fn key(&self) -> String {
        self.recipeid.to_string()
    }
}

/// Append-and-scan table of typed rows.
pub struct Registry<R> {
    tables: Arc<dyn TableStore>,
    table: String,
    _row: PhantomData<R>,
}

pub type JobRegistry = Registry<JobRecord>;
pub type RecipeRegistry = Registry<RecipeRecord>;

impl<R: RegistryRow> Registry<R> {
    pub fn new(tables: Arc<dyn TableStore>, table: impl Into<String>) -> Self {
        Self {
            tables,
            table: table.into(),
            _row: PhantomData,
        }
    }

    pub fn put(&self, row: &R) -> Result<(), FarOptError> {
        let item = serde_json::to_value(row)
            .map_err(|e| FarOptError::Backend(faropt_api::ClientError::Serialization(e)))?;
        self.tables
            .put_item(&self.table, &row.key(), item)
            .log_err(&format!("Failed to register {} {}", R::KIND, row.key()))?;
        log::debug!("Registered {} {} in {}", R::KIND, row.key(), self.table);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<R, FarOptError> {
        let item = self
            .tables
            .get_item(&self.table, key)
            .log_err(&format!("Failed to read {} {key}", R::KIND))?
            .ok_or_else(|| FarOptError::NotFound(format!("{} {key}", R::KIND)))?;
        decode(item)
    }

    /// Up to `limit` rows, in whatever order the table returns them.
    pub fn scan(&self, limit: usize) -> Result<Vec<R>, FarOptError> {
        self.tables
            .scan(&self.table, limit)
            .log_err(&format!("Failed to scan {}", self.table))?
            .into_iter()
            .map(decode)
            .collect()
    }
}

fn decode<R: RegistryRow>(item: serde_json::Value) -> Result<R, FarOptError> {
    serde_json::from_value(item)
        .map_err(|e| FarOptError::Backend(faropt_api::ClientError::Serialization(e)))
}
