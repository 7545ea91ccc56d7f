use serde::Deserialize;

use super::TaskStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct StackOutputSchema {
    pub output_key: String,
    pub output_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StackSchema {
    pub stack_name: String,
    pub stack_status: String,
    #[serde(default)]
    pub outputs: Vec<StackOutputSchema>,
}

impl StackSchema {
    pub fn is_ready(&self) -> bool {
        matches!(
            self.stack_status.as_str(),
            "CREATE_COMPLETE" | "UPDATE_COMPLETE"
        )
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|output| output.output_key == key)
            .map(|output| output.output_value.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ObjectSummarySchema {
    pub key: String,
    pub size: u64,
    #[serde(default)]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListObjectsSchema {
    #[serde(default)]
    pub contents: Vec<ObjectSummarySchema>,
    #[serde(default)]
    pub common_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanSchema {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetItemSchema {
    #[serde(default)]
    pub item: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContainerSchema {
    pub name: String,
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Full descriptor of one macro task execution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskSchema {
    pub task_arn: String,
    pub last_status: TaskStatus,
    #[serde(default)]
    pub desired_status: Option<TaskStatus>,
    #[serde(default)]
    pub started_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub stopped_at: Option<i64>,
    #[serde(default)]
    pub stopped_reason: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerSchema>,
}

impl TaskSchema {
    /// The task identifier, i.e. the last path segment of the task ARN.
    pub fn task_id(&self) -> &str {
        self.task_arn
            .rsplit('/')
            .next()
            .unwrap_or(self.task_arn.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailureSchema {
    #[serde(default)]
    pub arn: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunTaskResponseSchema {
    #[serde(default)]
    pub tasks: Vec<TaskSchema>,
    #[serde(default)]
    pub failures: Vec<FailureSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTasksSchema {
    #[serde(default)]
    pub task_arns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescribeTasksSchema {
    #[serde(default)]
    pub tasks: Vec<TaskSchema>,
    #[serde(default)]
    pub failures: Vec<FailureSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvokeResponseSchema {
    pub status_code: u16,
    #[serde(default)]
    pub function_error: Option<String>,
    /// Tail of the invocation's output.
    #[serde(default)]
    pub log_result: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct LogEventSchema {
    /// Emission time in milliseconds since the unix epoch.
    pub timestamp: i64,
    pub message: String,
    #[serde(default)]
    pub ingestion_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogEventsSchema {
    #[serde(default)]
    pub events: Vec<LogEventSchema>,
    #[serde(default)]
    pub next_forward_token: Option<String>,
    #[serde(default)]
    pub next_backward_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatapointSchema {
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub sum: Option<f64>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub sample_count: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricStatisticsSchema {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub datapoints: Vec<DatapointSchema>,
}
