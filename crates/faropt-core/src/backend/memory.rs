//! In-process doubles of every remote service.
//!
//! They keep state behind mutexes, count writes so callers can assert that nothing was
//! mutated, and expose a few knobs to inject failures or advance task status.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use faropt_api::ClientError;
use faropt_api::client::ObjectVersion;
use faropt_api::schemas::{
    ContainerSchema, DatapointSchema, FailureSchema, InvokeResponseSchema,
    ListObjectsSchema, ListTasksQuery, LogEventSchema, LogEventsQuery, LogEventsSchema,
    MetricStatisticsQuery, MetricStatisticsSchema, MicroJobPayload, ObjectSummarySchema,
    RunTaskRequestSchema, RunTaskResponseSchema, TaggingSchema, TaskSchema, TaskStatus,
};

use super::{
    LogService, MacroBackend, MetricsService, MicroBackend, ObjectStore, Services, TableStore,
};
use crate::layout::ObjectLocation;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One of each in-memory service, wired into [`Services`] by [`MemoryBackend::services`].
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub objects: Arc<MemoryObjectStore>,
    pub tables: Arc<MemoryTables>,
    pub cluster: Arc<MemoryCluster>,
    pub function: Arc<MemoryFunction>,
    pub logs: Arc<MemoryLogs>,
    pub metrics: Arc<MemoryMetrics>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> Services {
        Services {
            objects: self.objects.clone(),
            tables: self.tables.clone(),
            macro_backend: self.cluster.clone(),
            micro_backend: self.function.clone(),
            logs: self.logs.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

// Object store

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    version: ObjectVersion,
    tagging: TaggingSchema,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    next_version: AtomicU64,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryObjectStore {
    /// Number of successful mutations (puts, copies, tagging).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail with an internal server error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.bytes.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Store an object as if a job had written it.
    pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        let version = self.next_version();
        lock(&self.objects).insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                version,
                tagging: TaggingSchema::default(),
            },
        );
    }

    fn next_version(&self) -> ObjectVersion {
        let n = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        ObjectVersion(format!("\"v{n}\""))
    }

    fn check_writable(&self) -> Result<(), ClientError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(ClientError::InternalServerError)
        } else {
            Ok(())
        }
    }

    fn write(&self, location: &ObjectLocation, bytes: Vec<u8>) -> ObjectVersion {
        let mut objects = lock(&self.objects);
        self.write_locked(&mut objects, location, bytes)
    }

    fn write_locked(
        &self,
        objects: &mut BTreeMap<(String, String), StoredObject>,
        location: &ObjectLocation,
        bytes: Vec<u8>,
    ) -> ObjectVersion {
        let version = self.next_version();
        let entry_key = (location.bucket.clone(), location.key.clone());
        let tagging = objects
            .get(&entry_key)
            .map(|o| o.tagging.clone())
            .unwrap_or_default();
        objects.insert(
            entry_key,
            StoredObject {
                bytes,
                version: version.clone(),
                tagging,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        version
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<ObjectVersion, ClientError> {
        self.check_writable()?;
        Ok(self.write(location, bytes))
    }

    fn put_if_match(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        expected: &ObjectVersion,
    ) -> Result<ObjectVersion, ClientError> {
        self.check_writable()?;
        let mut objects = lock(&self.objects);
        let current = objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|o| &o.version);
        if current != Some(expected) {
            return Err(ClientError::PreconditionFailed);
        }
        Ok(self.write_locked(&mut objects, location, bytes))
    }

    fn get(&self, location: &ObjectLocation) -> Result<(Vec<u8>, ObjectVersion), ClientError> {
        lock(&self.objects)
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|o| (o.bytes.clone(), o.version.clone()))
            .ok_or(ClientError::NotFound)
    }

    fn copy(
        &self,
        from: &ObjectLocation,
        to: &ObjectLocation,
    ) -> Result<ObjectVersion, ClientError> {
        self.check_writable()?;
        let (bytes, _) = self.get(from)?;
        Ok(self.write(to, bytes))
    }

    fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsSchema, ClientError> {
        let prefix = prefix.unwrap_or("");
        let objects = lock(&self.objects);
        let mut listing = ListObjectsSchema::default();

        for ((b, key), object) in objects.iter() {
            if b != bucket {
                continue;
            }
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            match delimiter.and_then(|d| rest.find(d).map(|i| i + d.len())) {
                Some(end) => {
                    let common = format!("{prefix}{}", &rest[..end]);
                    if listing.common_prefixes.last() != Some(&common) {
                        listing.common_prefixes.push(common);
                    }
                }
                None => listing.contents.push(ObjectSummarySchema {
                    key: key.clone(),
                    size: object.bytes.len() as u64,
                    etag: Some(object.version.0.clone()),
                }),
            }
        }

        Ok(listing)
    }

    fn put_tagging(
        &self,
        location: &ObjectLocation,
        tagging: &TaggingSchema,
    ) -> Result<(), ClientError> {
        self.check_writable()?;
        let mut objects = lock(&self.objects);
        let object = objects
            .get_mut(&(location.bucket.clone(), location.key.clone()))
            .ok_or(ClientError::NotFound)?;
        object.tagging = tagging.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_tagging(&self, location: &ObjectLocation) -> Result<TaggingSchema, ClientError> {
        lock(&self.objects)
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|o| o.tagging.clone())
            .ok_or(ClientError::NotFound)
    }
}

// Tables

#[derive(Default)]
pub struct MemoryTables {
    tables: Mutex<HashMap<String, BTreeMap<String, serde_json::Value>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryTables {
    /// Number of successful row writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail with an internal server error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        lock(&self.tables)
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl TableStore for MemoryTables {
    fn put_item(
        &self,
        table: &str,
        key: &str,
        item: serde_json::Value,
    ) -> Result<(), ClientError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ClientError::InternalServerError);
        }
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), item);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_item(&self, table: &str, key: &str) -> Result<Option<serde_json::Value>, ClientError> {
        Ok(lock(&self.tables)
            .get(table)
            .and_then(|rows| rows.get(key).cloned()))
    }

    fn scan(&self, table: &str, limit: usize) -> Result<Vec<serde_json::Value>, ClientError> {
        Ok(lock(&self.tables)
            .get(table)
            .map(|rows| rows.values().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// Macro backend

#[derive(Default)]
pub struct MemoryCluster {
    tasks: Mutex<Vec<TaskSchema>>,
    run_requests: Mutex<Vec<RunTaskRequestSchema>>,
    stop_requests: Mutex<Vec<(String, String)>>,
    reject_reason: Mutex<Option<String>>,
    next_task: AtomicU64,
}

impl MemoryCluster {
    pub fn run_requests(&self) -> Vec<RunTaskRequestSchema> {
        lock(&self.run_requests).clone()
    }

    /// `(task_id, reason)` of every stop request.
    pub fn stop_requests(&self) -> Vec<(String, String)> {
        lock(&self.stop_requests).clone()
    }

    pub fn tasks_started_by(&self, started_by: &str) -> Vec<TaskSchema> {
        lock(&self.tasks)
            .iter()
            .filter(|t| t.started_by.as_deref() == Some(started_by))
            .cloned()
            .collect()
    }

    /// Answer every following run request with a placement failure.
    pub fn reject_runs(&self, reason: impl Into<String>) {
        *lock(&self.reject_reason) = Some(reason.into());
    }

    /// Move every task started by `started_by` to `status`.
    pub fn set_status(&self, started_by: &str, status: TaskStatus) {
        for task in lock(&self.tasks)
            .iter_mut()
            .filter(|t| t.started_by.as_deref() == Some(started_by))
        {
            task.last_status = status;
            if status == TaskStatus::Running && task.started_at.is_none() {
                task.started_at = Some(now_millis());
            }
            if status == TaskStatus::Stopped {
                task.desired_status = Some(TaskStatus::Stopped);
                task.stopped_at = Some(now_millis());
            }
        }
    }

    /// Forget every task started by `started_by`, as if its retention had expired.
    pub fn remove_tasks(&self, started_by: &str) {
        lock(&self.tasks).retain(|t| t.started_by.as_deref() != Some(started_by));
    }
}

impl MacroBackend for MemoryCluster {
    fn run_task(
        &self,
        cluster: &str,
        request: &RunTaskRequestSchema,
    ) -> Result<RunTaskResponseSchema, ClientError> {
        lock(&self.run_requests).push(request.clone());

        if let Some(reason) = lock(&self.reject_reason).clone() {
            return Ok(RunTaskResponseSchema {
                tasks: vec![],
                failures: vec![FailureSchema { arn: None, reason }],
            });
        }

        let n = self.next_task.fetch_add(1, Ordering::SeqCst) + 1;
        let task = TaskSchema {
            task_arn: format!("arn:faropt:ecs:local:task/{cluster}/{n:032x}"),
            last_status: TaskStatus::Provisioning,
            desired_status: Some(TaskStatus::Running),
            started_by: Some(request.started_by.clone()),
            created_at: Some(now_millis()),
            started_at: None,
            stopped_at: None,
            stopped_reason: None,
            containers: request
                .overrides
                .container_overrides
                .iter()
                .map(|c| ContainerSchema {
                    name: c.name.clone(),
                    last_status: None,
                    exit_code: None,
                    reason: None,
                })
                .collect(),
        };
        lock(&self.tasks).push(task.clone());

        Ok(RunTaskResponseSchema {
            tasks: vec![task],
            failures: vec![],
        })
    }

    fn list_tasks(
        &self,
        _cluster: &str,
        query: &ListTasksQuery,
    ) -> Result<Vec<String>, ClientError> {
        Ok(lock(&self.tasks)
            .iter()
            .filter(|t| t.started_by.as_deref() == Some(query.started_by.as_str()))
            .filter(|t| match query.desired_status {
                Some(status) => t.desired_status == Some(status),
                None => t.desired_status != Some(TaskStatus::Stopped),
            })
            .map(|t| t.task_arn.clone())
            .collect())
    }

    fn describe_tasks(
        &self,
        _cluster: &str,
        task_arns: Vec<String>,
    ) -> Result<Vec<TaskSchema>, ClientError> {
        let tasks = lock(&self.tasks);
        Ok(task_arns
            .iter()
            .filter_map(|arn| tasks.iter().find(|t| &t.task_arn == arn).cloned())
            .collect())
    }

    fn stop_task(&self, _cluster: &str, task_id: &str, reason: &str) -> Result<(), ClientError> {
        let mut tasks = lock(&self.tasks);
        let task = tasks
            .iter_mut()
            .find(|t| t.task_id() == task_id)
            .ok_or(ClientError::NotFound)?;
        task.desired_status = Some(TaskStatus::Stopped);
        task.last_status = TaskStatus::Stopped;
        task.stopped_at = Some(now_millis());
        task.stopped_reason = Some(reason.to_string());
        lock(&self.stop_requests).push((task_id.to_string(), reason.to_string()));
        Ok(())
    }
}

// Micro backend

type Handler = dyn Fn(&MicroJobPayload) -> Result<InvokeResponseSchema, ClientError> + Send + Sync;

pub struct MemoryFunction {
    handler: Mutex<Box<Handler>>,
    invocations: Mutex<Vec<(String, MicroJobPayload)>>,
}

impl Default for MemoryFunction {
    fn default() -> Self {
        Self {
            handler: Mutex::new(Box::new(|payload: &MicroJobPayload| {
                Ok(InvokeResponseSchema {
                    status_code: 200,
                    function_error: None,
                    log_result: Some(format!(
                        "START\nrunning s3://{}/{}/source.zip\nEND",
                        payload.bucket, payload.key
                    )),
                    payload: serde_json::Value::Null,
                })
            })),
            invocations: Mutex::new(vec![]),
        }
    }
}

impl MemoryFunction {
    /// Replace what an invocation returns.
    pub fn set_handler(
        &self,
        handler: impl Fn(&MicroJobPayload) -> Result<InvokeResponseSchema, ClientError>
        + Send
        + Sync
        + 'static,
    ) {
        *lock(&self.handler) = Box::new(handler);
    }

    /// `(function, payload)` of every invocation.
    pub fn invocations(&self) -> Vec<(String, MicroJobPayload)> {
        lock(&self.invocations).clone()
    }
}

impl MicroBackend for MemoryFunction {
    fn invoke(
        &self,
        function: &str,
        payload: &MicroJobPayload,
        _timeout: Duration,
    ) -> Result<InvokeResponseSchema, ClientError> {
        lock(&self.invocations).push((function.to_string(), payload.clone()));
        let handler = lock(&self.handler);
        (**handler)(payload)
    }
}

// Logs

pub struct MemoryLogs {
    streams: Mutex<HashMap<(String, String), Vec<LogEventSchema>>>,
    page_size: usize,
    requests: AtomicUsize,
}

impl Default for MemoryLogs {
    fn default() -> Self {
        Self::with_page_size(100)
    }
}

impl MemoryLogs {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            page_size: page_size.max(1),
            requests: AtomicUsize::new(0),
        }
    }

    /// Append events to a stream, keeping it ordered by emission time.
    pub fn push(
        &self,
        group: &str,
        stream: &str,
        events: impl IntoIterator<Item = LogEventSchema>,
    ) {
        let mut streams = lock(&self.streams);
        let stream = streams
            .entry((group.to_string(), stream.to_string()))
            .or_default();
        stream.extend(events);
        stream.sort_by_key(|e| e.timestamp);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl LogService for MemoryLogs {
    fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        query: &LogEventsQuery,
    ) -> Result<LogEventsSchema, ClientError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let streams = lock(&self.streams);
        let events: Vec<&LogEventSchema> = streams
            .get(&(group.to_string(), stream.to_string()))
            .ok_or(ClientError::NotFound)?
            .iter()
            .filter(|e| query.start_time.is_none_or(|start| e.timestamp >= start))
            .collect();

        let start = match &query.next_token {
            Some(token) => token
                .strip_prefix("f/")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ClientError::UnknownError(format!("bad token {token}")))?,
            None if query.start_from_head => 0,
            None => events.len().saturating_sub(self.page_size),
        };
        let start = start.min(events.len());
        let end = (start + self.page_size).min(events.len());

        Ok(LogEventsSchema {
            events: events[start..end].iter().map(|e| (*e).clone()).collect(),
            next_forward_token: Some(format!("f/{end}")),
            next_backward_token: Some(format!("b/{start}")),
        })
    }
}

// Metrics

#[derive(Default)]
pub struct MemoryMetrics {
    datapoints: Mutex<Vec<(String, String, String, DatapointSchema)>>,
    queries: Mutex<Vec<MetricStatisticsQuery>>,
}

impl MemoryMetrics {
    /// Record one value of `metric` for the job whose prefix is `job`.
    pub fn record(&self, namespace: &str, metric: &str, job: &str, timestamp: i64, value: f64) {
        lock(&self.datapoints).push((
            namespace.to_string(),
            metric.to_string(),
            job.to_string(),
            DatapointSchema {
                timestamp,
                average: Some(value),
                sum: Some(value),
                minimum: Some(value),
                maximum: Some(value),
                sample_count: Some(1.0),
                unit: Some("None".to_string()),
            },
        ));
    }

    pub fn queries(&self) -> Vec<MetricStatisticsQuery> {
        lock(&self.queries).clone()
    }
}

impl MetricsService for MemoryMetrics {
    fn get_metric_statistics(
        &self,
        namespace: &str,
        query: &MetricStatisticsQuery,
    ) -> Result<MetricStatisticsSchema, ClientError> {
        lock(&self.queries).push(query.clone());
        let datapoints = lock(&self.datapoints)
            .iter()
            .filter(|(ns, metric, job, point)| {
                ns == namespace
                    && metric == &query.metric_name
                    && job == &query.dimension_value
                    && point.timestamp >= query.start_time
                    && point.timestamp <= query.end_time
            })
            .map(|(_, _, _, point)| point.clone())
            .collect();

        Ok(MetricStatisticsSchema {
            label: Some(query.metric_name.clone()),
            datapoints,
        })
    }
}
