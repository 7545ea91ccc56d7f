use std::time::Duration;

use reqwest::Url;
use reqwest::header::{ETAG, HeaderValue, IF_MATCH};
use serde::Serialize;

use crate::credentials::FarOptCredentials;
use crate::error::{ApiErrorBody, ApiErrorCode, ClientError};
use crate::schemas::{
    CopyObjectSchema, DescribeTasksRequestSchema, DescribeTasksSchema, GetItemSchema,
    InvokeResponseSchema, ListObjectsSchema, ListTasksQuery, ListTasksSchema, LogEventsQuery,
    LogEventsSchema, MetricStatisticsQuery, MetricStatisticsSchema, PutItemSchema,
    RunTaskRequestSchema, RunTaskResponseSchema, ScanSchema, StackSchema,
    StopTaskRequestSchema, TaggingSchema,
};

const API_KEY_HEADER: &str = "x-api-key";

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return ClientError::Timeout;
        }
        match error.status() {
            Some(status) => ClientError::ApiError {
                status,
                body: ApiErrorBody {
                    code: ApiErrorCode::Unknown,
                    message: error.to_string(),
                },
            },
            None => ClientError::UnknownError(error.to_string()),
        }
    }
}

trait ResponseExt {
    fn map_to_faropt_err(self) -> Result<reqwest::blocking::Response, ClientError>;
}

impl ResponseExt for reqwest::blocking::Response {
    fn map_to_faropt_err(self) -> Result<reqwest::blocking::Response, ClientError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            match self.status() {
                reqwest::StatusCode::NOT_FOUND => Err(ClientError::NotFound),
                reqwest::StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                reqwest::StatusCode::FORBIDDEN => Err(ClientError::Forbidden),
                reqwest::StatusCode::PRECONDITION_FAILED => Err(ClientError::PreconditionFailed),
                reqwest::StatusCode::REQUEST_TIMEOUT | reqwest::StatusCode::GATEWAY_TIMEOUT => {
                    Err(ClientError::Timeout)
                }
                reqwest::StatusCode::INTERNAL_SERVER_ERROR => Err(ClientError::InternalServerError),
                status => Err(ClientError::ApiError {
                    status,
                    body: ApiErrorBody::parse(
                        &self
                            .text()
                            .map_err(|e| ClientError::UnknownError(e.to_string()))?,
                    ),
                }),
            }
        }
    }
}

/// Version tag of a stored object, as returned in the `ETag` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectVersion(pub String);

impl std::fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A client for the FarOpt gateway.
///
/// The gateway fronts every remote service the SDK talks to: the object store, the job and
/// recipe tables, the macro task cluster, the micro function, log storage and metrics. All
/// calls are blocking.
#[derive(Debug, Clone)]
pub struct Client {
    http_client: reqwest::blocking::Client,
    base_url: Url,
    credentials: Option<FarOptCredentials>,
}

impl Client {
    /// Create a new client for the given base URL.
    pub fn new(base_url: Url, credentials: Option<FarOptCredentials>) -> Result<Self, ClientError> {
        // No client-wide timeout. Bounded calls set their own per request.
        let http_client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| ClientError::UnknownError(e.to_string()))?;

        Ok(Client {
            http_client,
            base_url,
            credentials,
        })
    }

    pub fn describe_stack(&self, stack_name: &str) -> Result<StackSchema, ClientError> {
        let url = self.url(&["stacks", stack_name])?;
        self.get_json(url)
    }

    // Object store

    pub fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectVersion, ClientError> {
        let url = self.url(&["buckets", bucket, "objects", key])?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .body(bytes)
            .send()?
            .map_to_faropt_err()?;
        Ok(version_of(&response))
    }

    /// Write an object only if its current version matches `expected`.
    pub fn put_object_if_match(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        expected: &ObjectVersion,
    ) -> Result<ObjectVersion, ClientError> {
        let url = self.url(&["buckets", bucket, "objects", key])?;
        let if_match = HeaderValue::from_str(&expected.0)
            .map_err(|e| ClientError::UnknownError(e.to_string()))?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .header(IF_MATCH, if_match)
            .body(bytes)
            .send()?
            .map_to_faropt_err()?;
        Ok(version_of(&response))
    }

    pub fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(Vec<u8>, ObjectVersion), ClientError> {
        let url = self.url(&["buckets", bucket, "objects", key])?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()?
            .map_to_faropt_err()?;
        let version = version_of(&response);
        let bytes = response.bytes()?.to_vec();
        Ok((bytes, version))
    }

    pub fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectVersion, ClientError> {
        let url = self.url(&["buckets", bucket, "objects", key, "copy"])?;
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&CopyObjectSchema::new(
                source_bucket.to_string(),
                source_key.to_string(),
            ))
            .send()?
            .map_to_faropt_err()?;
        Ok(version_of(&response))
    }

    pub fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsSchema, ClientError> {
        let mut url = self.url(&["buckets", bucket, "objects"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(prefix) = prefix {
                query.append_pair("prefix", prefix);
            }
            if let Some(delimiter) = delimiter {
                query.append_pair("delimiter", delimiter);
            }
        }
        self.get_json(url)
    }

    pub fn put_object_tagging(
        &self,
        bucket: &str,
        key: &str,
        tagging: &TaggingSchema,
    ) -> Result<(), ClientError> {
        let url = self.url(&["buckets", bucket, "objects", key, "tagging"])?;
        self.send_json(reqwest::Method::PUT, url, tagging)
            .map(|_| ())
    }

    pub fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<TaggingSchema, ClientError> {
        let url = self.url(&["buckets", bucket, "objects", key, "tagging"])?;
        self.get_json(url)
    }

    // Tables

    pub fn put_item(&self, table: &str, item: serde_json::Value) -> Result<(), ClientError> {
        let url = self.url(&["tables", table, "items"])?;
        self.send_json(reqwest::Method::PUT, url, &PutItemSchema::new(item))
            .map(|_| ())
    }

    pub fn get_item(
        &self,
        table: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, ClientError> {
        let url = self.url(&["tables", table, "items", key])?;
        match self.get_json::<GetItemSchema>(url) {
            Ok(res) => Ok(res.item),
            Err(ClientError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn scan(&self, table: &str, limit: usize) -> Result<Vec<serde_json::Value>, ClientError> {
        let mut url = self.url(&["tables", table, "items"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json::<ScanSchema>(url).map(|res| res.items)
    }

    // Macro backend

    pub fn run_task(
        &self,
        cluster: &str,
        request: &RunTaskRequestSchema,
    ) -> Result<RunTaskResponseSchema, ClientError> {
        let url = self.url(&["clusters", cluster, "tasks"])?;
        self.send_json(reqwest::Method::POST, url, request)?
            .json::<RunTaskResponseSchema>()
            .map_err(Into::into)
    }

    pub fn list_tasks(
        &self,
        cluster: &str,
        query: &ListTasksQuery,
    ) -> Result<Vec<String>, ClientError> {
        let mut url = self.url(&["clusters", cluster, "tasks"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("started_by", &query.started_by);
            if let Some(status) = query.desired_status {
                pairs.append_pair("desired_status", &status.to_string());
            }
        }
        self.get_json::<ListTasksSchema>(url)
            .map(|res| res.task_arns)
    }

    pub fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: Vec<String>,
    ) -> Result<DescribeTasksSchema, ClientError> {
        let url = self.url(&["clusters", cluster, "tasks", "describe"])?;
        self.send_json(
            reqwest::Method::POST,
            url,
            &DescribeTasksRequestSchema::new(task_arns),
        )?
        .json::<DescribeTasksSchema>()
        .map_err(Into::into)
    }

    pub fn stop_task(&self, cluster: &str, task: &str, reason: &str) -> Result<(), ClientError> {
        let url = self.url(&["clusters", cluster, "tasks", task, "stop"])?;
        self.send_json(
            reqwest::Method::POST,
            url,
            &StopTaskRequestSchema::new(reason.to_string()),
        )
        .map(|_| ())
    }

    // Micro backend

    /// Synchronously invoke a function, requesting the tail of its output.
    ///
    /// The call blocks until the invocation returns or `timeout` elapses.
    pub fn invoke<T: Serialize>(
        &self,
        function: &str,
        payload: &T,
        timeout: Duration,
    ) -> Result<InvokeResponseSchema, ClientError> {
        let mut url = self.url(&["functions", function, "invocations"])?;
        url.query_pairs_mut().append_pair("log_type", "Tail");
        self.request(reqwest::Method::POST, url)
            .timeout(timeout)
            .json(payload)
            .send()?
            .map_to_faropt_err()?
            .json::<InvokeResponseSchema>()
            .map_err(Into::into)
    }

    // Logs

    pub fn get_log_events(
        &self,
        log_group: &str,
        log_stream: &str,
        query: &LogEventsQuery,
    ) -> Result<LogEventsSchema, ClientError> {
        let mut url = self.url(&["logs", log_group, "streams", log_stream, "events"])?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(start_time) = query.start_time {
                pairs.append_pair("start_time", &start_time.to_string());
            }
            pairs.append_pair("start_from_head", &query.start_from_head.to_string());
            if let Some(token) = &query.next_token {
                pairs.append_pair("next_token", token);
            }
        }
        self.get_json(url)
    }

    // Metrics

    pub fn get_metric_statistics(
        &self,
        namespace: &str,
        query: &MetricStatisticsQuery,
    ) -> Result<MetricStatisticsSchema, ClientError> {
        let url = self.url(&["metrics", namespace, "statistics"])?;
        self.send_json(reqwest::Method::POST, url, query)?
            .json::<MetricStatisticsSchema>()
            .map_err(Into::into)
    }

    fn get_json<R>(&self, url: Url) -> Result<R, ClientError>
    where
        R: for<'de> serde::Deserialize<'de>,
    {
        let response = self
            .request(reqwest::Method::GET, url)
            .send()?
            .map_to_faropt_err()?;
        let json = response.json::<R>()?;
        Ok(json)
    }

    fn send_json<T: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: Url,
        body: &T,
    ) -> Result<reqwest::blocking::Response, ClientError> {
        let response = self
            .request(method, url)
            .json(body)
            .send()?
            .map_to_faropt_err()?;
        Ok(response)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::blocking::RequestBuilder {
        log::debug!("{method} {url}");
        let builder = self.http_client.request(method, url);
        match &self.credentials {
            Some(creds) => builder.header(API_KEY_HEADER, creds.api_key()),
            None => builder,
        }
    }

    /// Append path segments to the base URL. Each segment is percent-encoded on its own, so
    /// object keys containing `/` stay a single segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn version_of(response: &reqwest::blocking::Response) -> ObjectVersion {
    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    ObjectVersion(etag.to_string())
}
