mod request;
mod response;

pub use request::*;
pub use response::*;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status reported by the macro backend for a task execution.
///
/// The vocabulary is case-sensitive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Provisioning,
    Pending,
    Running,
    Deprovisioning,
    Stopped,
}

impl TaskStatus {
    /// Whether the execution has produced (or is producing) log output.
    pub fn has_logs(&self) -> bool {
        matches!(
            self,
            TaskStatus::Running | TaskStatus::Deprovisioning | TaskStatus::Stopped
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePairSchema {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSchema {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggingSchema {
    pub tag_set: Vec<TagSchema>,
}

impl TaggingSchema {
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag_set: vec![TagSchema {
                key: key.into(),
                value: value.into(),
            }],
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tag_set
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }
}
