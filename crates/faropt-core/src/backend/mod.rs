//! Remote services the orchestration layer talks to.
//!
//! Each service is a trait so the lifecycle code runs unchanged against the HTTP gateway
//! ([`faropt_api::Client`]) or the in-memory doubles in [`memory`].

mod http;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use faropt_api::ClientError;
use faropt_api::client::ObjectVersion;
use faropt_api::schemas::{
    InvokeResponseSchema, ListObjectsSchema, ListTasksQuery, LogEventsQuery, LogEventsSchema,
    MetricStatisticsQuery, MetricStatisticsSchema, MicroJobPayload, RunTaskRequestSchema,
    RunTaskResponseSchema, TaggingSchema, TaskSchema,
};

use crate::layout::ObjectLocation;

pub trait ObjectStore: Send + Sync {
    fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<ObjectVersion, ClientError>;

    /// Write only if the stored version is still `expected`, failing with
    /// [`ClientError::PreconditionFailed`] otherwise.
    fn put_if_match(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        expected: &ObjectVersion,
    ) -> Result<ObjectVersion, ClientError>;

    fn get(&self, location: &ObjectLocation) -> Result<(Vec<u8>, ObjectVersion), ClientError>;

    /// Server-side copy. No bytes go through the client.
    fn copy(
        &self,
        from: &ObjectLocation,
        to: &ObjectLocation,
    ) -> Result<ObjectVersion, ClientError>;

    fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsSchema, ClientError>;

    fn put_tagging(
        &self,
        location: &ObjectLocation,
        tagging: &TaggingSchema,
    ) -> Result<(), ClientError>;

    fn get_tagging(&self, location: &ObjectLocation) -> Result<TaggingSchema, ClientError>;
}

pub trait TableStore: Send + Sync {
    /// Upsert the row stored under `key`.
    fn put_item(&self, table: &str, key: &str, item: serde_json::Value)
    -> Result<(), ClientError>;

    fn get_item(&self, table: &str, key: &str) -> Result<Option<serde_json::Value>, ClientError>;

    fn scan(&self, table: &str, limit: usize) -> Result<Vec<serde_json::Value>, ClientError>;
}

/// The container task cluster used by macro jobs.
pub trait MacroBackend: Send + Sync {
    fn run_task(
        &self,
        cluster: &str,
        request: &RunTaskRequestSchema,
    ) -> Result<RunTaskResponseSchema, ClientError>;

    /// ARNs of the tasks matching the query. Without a desired status only live tasks are
    /// listed.
    fn list_tasks(&self, cluster: &str, query: &ListTasksQuery)
    -> Result<Vec<String>, ClientError>;

    fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: Vec<String>,
    ) -> Result<Vec<TaskSchema>, ClientError>;

    fn stop_task(&self, cluster: &str, task_id: &str, reason: &str) -> Result<(), ClientError>;
}

/// The synchronous function used by micro jobs.
pub trait MicroBackend: Send + Sync {
    fn invoke(
        &self,
        function: &str,
        payload: &MicroJobPayload,
        timeout: Duration,
    ) -> Result<InvokeResponseSchema, ClientError>;
}

pub trait LogService: Send + Sync {
    fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        query: &LogEventsQuery,
    ) -> Result<LogEventsSchema, ClientError>;
}

pub trait MetricsService: Send + Sync {
    fn get_metric_statistics(
        &self,
        namespace: &str,
        query: &MetricStatisticsQuery,
    ) -> Result<MetricStatisticsSchema, ClientError>;
}

/// Every service a [`crate::FarOpt`] context needs.
#[derive(Clone)]
pub struct Services {
    pub objects: Arc<dyn ObjectStore>,
    pub tables: Arc<dyn TableStore>,
    pub macro_backend: Arc<dyn MacroBackend>,
    pub micro_backend: Arc<dyn MicroBackend>,
    pub logs: Arc<dyn LogService>,
    pub metrics: Arc<dyn MetricsService>,
}

impl Services {
    /// All services served by one gateway client.
    pub fn http(client: faropt_api::Client) -> Self {
        let client = Arc::new(client);
        Self {
            objects: client.clone(),
            tables: client.clone(),
            macro_backend: client.clone(),
            micro_backend: client.clone(),
            logs: client.clone(),
            metrics: client,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
