use std::time::Duration;

use faropt_api::client::ObjectVersion;
use faropt_api::schemas::{
    InvokeResponseSchema, ListObjectsSchema, ListTasksQuery, LogEventsQuery, LogEventsSchema,
    MetricStatisticsQuery, MetricStatisticsSchema, MicroJobPayload, RunTaskRequestSchema,
    RunTaskResponseSchema, TaggingSchema, TaskSchema,
};
use faropt_api::{Client, ClientError};

use super::{LogService, MacroBackend, MetricsService, MicroBackend, ObjectStore, TableStore};
use crate::layout::ObjectLocation;

impl ObjectStore for Client {
    fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<ObjectVersion, ClientError> {
        self.put_object(&location.bucket, &location.key, bytes)
    }

    fn put_if_match(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        expected: &ObjectVersion,
    ) -> Result<ObjectVersion, ClientError> {
        self.put_object_if_match(&location.bucket, &location.key, bytes, expected)
    }

    fn get(&self, location: &ObjectLocation) -> Result<(Vec<u8>, ObjectVersion), ClientError> {
        self.get_object(&location.bucket, &location.key)
    }

    fn copy(
        &self,
        from: &ObjectLocation,
        to: &ObjectLocation,
    ) -> Result<ObjectVersion, ClientError> {
        self.copy_object(&from.bucket, &from.key, &to.bucket, &to.key)
    }

    fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsSchema, ClientError> {
        self.list_objects(bucket, prefix, delimiter)
    }

    fn put_tagging(
        &self,
        location: &ObjectLocation,
        tagging: &TaggingSchema,
    ) -> Result<(), ClientError> {
        self.put_object_tagging(&location.bucket, &location.key, tagging)
    }

    fn get_tagging(&self, location: &ObjectLocation) -> Result<TaggingSchema, ClientError> {
        self.get_object_tagging(&location.bucket, &location.key)
    }
}

impl TableStore for Client {
    // The gateway reads the key attribute from the item itself.
    fn put_item(
        &self,
        table: &str,
        _key: &str,
        item: serde_json::Value,
    ) -> Result<(), ClientError> {
        Client::put_item(self, table, item)
    }

    fn get_item(&self, table: &str, key: &str) -> Result<Option<serde_json::Value>, ClientError> {
        Client::get_item(self, table, key)
    }

    fn scan(&self, table: &str, limit: usize) -> Result<Vec<serde_json::Value>, ClientError> {
        Client::scan(self, table, limit)
    }
}

impl MacroBackend for Client {
    fn run_task(
        &self,
        cluster: &str,
        request: &RunTaskRequestSchema,
    ) -> Result<RunTaskResponseSchema, ClientError> {
        Client::run_task(self, cluster, request)
    }

    fn list_tasks(
        &self,
        cluster: &str,
        query: &ListTasksQuery,
    ) -> Result<Vec<String>, ClientError> {
        Client::list_tasks(self, cluster, query)
    }

    fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: Vec<String>,
    ) -> Result<Vec<TaskSchema>, ClientError> {
        Client::describe_tasks(self, cluster, task_arns).map(|res| res.tasks)
    }

    fn stop_task(&self, cluster: &str, task_id: &str, reason: &str) -> Result<(), ClientError> {
        Client::stop_task(self, cluster, task_id, reason)
    }
}

impl MicroBackend for Client {
    fn invoke(
        &self,
        function: &str,
        payload: &MicroJobPayload,
        timeout: Duration,
    ) -> Result<InvokeResponseSchema, ClientError> {
        Client::invoke(self, function, payload, timeout)
    }
}

impl LogService for Client {
    fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        query: &LogEventsQuery,
    ) -> Result<LogEventsSchema, ClientError> {
        Client::get_log_events(self, group, stream, query)
    }
}

impl MetricsService for Client {
    fn get_metric_statistics(
        &self,
        namespace: &str,
        query: &MetricStatisticsQuery,
    ) -> Result<MetricStatisticsSchema, ClientError> {
        Client::get_metric_statistics(self, namespace, query)
    }
}
