use std::str::FromStr;

use chrono::Utc;
use derive_more::Display;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static JOB_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("job id pattern should compile")
});

/// Identifier of a submitted job: a UTC timestamp followed by a random UUID, so ids sort by
/// submission second.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y-%m-%d-%H-%M-%S");
        JobId(format!("{stamp}-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Invalid identifier: {0}")]
pub struct InvalidId(pub String);

impl FromStr for JobId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if JOB_ID_RE.is_match(s) {
            Ok(JobId(s.to_string()))
        } else {
            Err(InvalidId(s.to_string()))
        }
    }
}

impl TryFrom<String> for JobId {
    type Error = InvalidId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Identifier of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeId(Uuid);

impl RecipeId {
    pub fn generate() -> Self {
        RecipeId(Uuid::new_v4())
    }
}

impl FromStr for RecipeId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(RecipeId)
            .map_err(|_| InvalidId(s.to_string()))
    }
}

/// Name of a stored model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(Uuid);

impl ModelName {
    pub fn generate() -> Self {
        ModelName(Uuid::new_v4())
    }
}

impl FromStr for ModelName {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(ModelName)
            .map_err(|_| InvalidId(s.to_string()))
    }
}
