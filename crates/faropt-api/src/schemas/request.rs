use derive_new::new;
use serde::Serialize;

use super::{KeyValuePairSchema, TaskStatus};

#[derive(Debug, Clone, Serialize, new)]
pub struct CopyObjectSchema {
    pub source_bucket: String,
    pub source_key: String,
}

#[derive(Debug, Clone, Serialize, new)]
pub struct PutItemSchema {
    pub item: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerOverrideSchema {
    pub name: String,
    pub environment: Vec<KeyValuePairSchema>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOverridesSchema {
    pub container_overrides: Vec<ContainerOverrideSchema>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunTaskRequestSchema {
    pub task_definition: String,
    pub count: u32,
    pub started_by: String,
    pub overrides: TaskOverridesSchema,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListTasksQuery {
    pub started_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Serialize, new)]
pub struct DescribeTasksRequestSchema {
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, new)]
pub struct StopTaskRequestSchema {
    pub reason: String,
}

/// Payload handed to the micro backend: where to find the job archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct MicroJobPayload {
    #[serde(rename = "s3bucket")]
    pub bucket: String,
    #[serde(rename = "s3key")]
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogEventsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    pub start_from_head: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricStatisticsQuery {
    pub metric_name: String,
    pub dimension_name: String,
    pub dimension_value: String,
    /// Milliseconds since the unix epoch.
    pub start_time: i64,
    /// Milliseconds since the unix epoch.
    pub end_time: i64,
    /// Seconds.
    pub period: u32,
    pub statistics: String,
}
