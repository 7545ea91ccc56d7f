//! Client side proxy of a remote job.
//!
//! A [`JobHandle`] moves through `Unconfigured -> Configured -> Submitted`. Every operation
//! checks the current state first and fails with [`FarOptError::InvalidState`] without
//! touching any remote service when called out of order.

mod logs;

pub use logs::{LogEvent, LogStream};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use faropt_api::schemas::{
    DatapointSchema, ListTasksQuery, MetricStatisticsQuery, TaskSchema, TaskStatus,
};
use faropt_package::{ArtifactPackager, PackagedArchive};

use crate::backend::Services;
use crate::cancellable::{CancellablePoller, CancellationToken};
use crate::config::FarOptConfig;
use crate::dispatch::{BackendDispatcher, BackendKind, Execution};
use crate::error::{FarOptError, LogErr};
use crate::ids::{JobId, RecipeId};
use crate::layout::JobLocation;
use crate::registry::{JobRecord, JobRegistry, RecipeRecord, RecipeRegistry};

/// Metric statistics granularity, in seconds.
const METRIC_PERIOD_SECS: u32 = 60;
pub const DEFAULT_METRIC_WINDOW: Duration = Duration::from_secs(60 * 60);

/// A job that reached the backend.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    job_id: JobId,
    location: JobLocation,
    execution: Execution,
    submitted_at: DateTime<Utc>,
}

impl SubmittedJob {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn location(&self) -> &JobLocation {
        &self.location
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn backend(&self) -> BackendKind {
        self.execution.backend()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

#[derive(Debug, Clone)]
pub enum JobState {
    Unconfigured,
    Configured(PackagedArchive),
    Submitted(SubmittedJob),
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Unconfigured => "unconfigured",
            JobState::Configured(_) => "configured",
            JobState::Submitted(_) => "submitted",
        }
    }
}

pub struct JobHandle {
    services: Services,
    config: Arc<FarOptConfig>,
    scratch_dir: PathBuf,
    state: JobState,
}

impl JobHandle {
    pub fn new(services: Services, config: Arc<FarOptConfig>) -> Self {
        let scratch_dir = config.scratch_dir().join(uuid::Uuid::new_v4().to_string());
        Self {
            services,
            config,
            scratch_dir,
            state: JobState::Unconfigured,
        }
    }

    /// A handle for a job submitted earlier, possibly by another process.
    ///
    /// The output of a micro invocation is only known to the handle that submitted it, so an
    /// attached micro job has no logs.
    pub fn attach(
        services: Services,
        config: Arc<FarOptConfig>,
        job_id: JobId,
        backend: BackendKind,
    ) -> Result<Self, FarOptError> {
        let location = JobLocation::new(config.bucket()?, &job_id, backend);
        let execution = match backend {
            BackendKind::Macro => Execution::Macro { task_arn: None },
            BackendKind::Micro => Execution::Micro { outcome: None },
        };
        let mut handle = Self::new(services, config);
        handle.state = JobState::Submitted(SubmittedJob {
            job_id,
            location,
            execution,
            submitted_at: Utc::now(),
        });
        Ok(handle)
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match &self.state {
            JobState::Submitted(job) => Some(&job.job_id),
            _ => None,
        }
    }

    pub fn backend(&self) -> Option<BackendKind> {
        match &self.state {
            JobState::Submitted(job) => Some(job.backend()),
            _ => None,
        }
    }

    /// Output captured from the micro invocation, if this handle submitted one.
    pub fn micrologs(&self) -> Option<&str> {
        match &self.state {
            JobState::Submitted(SubmittedJob {
                execution: Execution::Micro { outcome: Some(o) },
                ..
            }) => Some(o.micrologs.as_str()),
            _ => None,
        }
    }

    /// Package `source_dir`. May be called again to repackage before submitting.
    pub fn configure(
        &mut self,
        source_dir: impl Into<PathBuf>,
    ) -> Result<PackagedArchive, FarOptError> {
        if let JobState::Submitted(job) = &self.state {
            log::error!("Job {} was already submitted", job.job_id);
            return Err(self.invalid_state("configure", "unconfigured or configured"));
        }

        let source_dir = source_dir.into();
        let archive = ArtifactPackager::new(self.scratch_dir.clone())
            .package(&source_dir)
            .log_err(&format!("Failed to package {}", source_dir.display()))?;
        match archive.entry_point() {
            Some(entry_point) => log::info!("Found entry point {entry_point}"),
            None => log::warn!(
                "No main.py or main.jl at the root of {}; the runner will not find an entry point",
                source_dir.display()
            ),
        }
        log::info!("Configured job from {}", source_dir.display());

        self.state = JobState::Configured(archive.clone());
        Ok(archive)
    }

    /// Upload the packaged archive, register the job and dispatch it.
    ///
    /// The handle only becomes submitted once all three steps succeeded. For micro jobs this
    /// blocks until the invocation returns.
    pub fn submit(&mut self, backend: BackendKind) -> Result<JobId, FarOptError> {
        let JobState::Configured(archive) = &self.state else {
            log::error!("Please configure the job first!");
            return Err(self.invalid_state("submit", "configured"));
        };

        let job_id = JobId::generate();
        let location = JobLocation::new(self.config.bucket()?, &job_id, backend);
        let bytes = archive.read_bytes()?;
        let source = location.source();

        self.services
            .objects
            .put(&source, bytes)
            .log_err(&format!("Failed to upload {source}"))?;
        log::info!("Uploaded archive to {source}");

        self.register_and_dispatch(job_id, location, backend)
    }

    /// Submit a new job running the archive of an existing recipe. The archive is copied on
    /// the server side.
    pub fn run_recipe(
        &mut self,
        recipe_id: &RecipeId,
        backend: BackendKind,
    ) -> Result<JobId, FarOptError> {
        if matches!(self.state, JobState::Submitted(_)) {
            log::error!("This job has already been submitted");
            return Err(self.invalid_state("run a recipe", "unconfigured or configured"));
        }

        let recipe = self.recipe_registry()?.get(&recipe_id.to_string())?;
        let job_id = JobId::generate();
        let location = JobLocation::new(self.config.bucket()?, &job_id, backend);
        let source = location.source();

        self.services
            .objects
            .copy(&recipe.archive(), &source)
            .log_err(&format!("Failed to copy recipe {recipe_id} archive"))?;
        log::info!("Copied recipe {recipe_id} archive to {source}");

        self.register_and_dispatch(job_id, location, backend)
    }

    fn register_and_dispatch(
        &mut self,
        job_id: JobId,
        location: JobLocation,
        backend: BackendKind,
    ) -> Result<JobId, FarOptError> {
        let record = JobRecord::new(
            job_id.clone(),
            location.bucket().to_string(),
            location.source().key,
        );
        self.job_registry()?.put(&record)?;

        let execution = BackendDispatcher::new(self.services.clone(), self.config.clone())
            .dispatch(&job_id, &location, backend)?;

        self.state = JobState::Submitted(SubmittedJob {
            job_id: job_id.clone(),
            location,
            execution,
            submitted_at: Utc::now(),
        });
        Ok(job_id)
    }

    /// Full descriptor of the job's task execution.
    ///
    /// Live tasks are looked up first, then stopped ones. Fails with [`FarOptError::NotFound`]
    /// if the backend knows of neither, which also happens right after submission before the
    /// task becomes visible.
    pub fn status(&self) -> Result<TaskSchema, FarOptError> {
        let job = self.submitted("query status")?;
        if job.backend() == BackendKind::Micro {
            log::error!("Micro jobs have no task to describe");
            return Err(self.invalid_state("query status", "a submitted macro job"));
        }

        let cluster = &self.config.cluster;
        let backend = &self.services.macro_backend;
        let mut query = ListTasksQuery {
            started_by: job.job_id.to_string(),
            desired_status: None,
        };
        let mut task_arns = backend
            .list_tasks(cluster, &query)
            .log_err("Failed to list running tasks")?;
        if task_arns.is_empty() {
            log::debug!("No running tasks for {}, checking stopped tasks", job.job_id);
            query.desired_status = Some(TaskStatus::Stopped);
            task_arns = backend
                .list_tasks(cluster, &query)
                .log_err("Failed to list stopped tasks")?;
        }

        let not_found = || FarOptError::NotFound(format!("task for job {}", job.job_id));
        let first = task_arns.into_iter().next().ok_or_else(not_found)?;
        backend
            .describe_tasks(cluster, vec![first])
            .log_err("Failed to describe task")?
            .into_iter()
            .next()
            .ok_or_else(not_found)
    }

    /// Current status. Micro jobs are always `STOPPED` once submitted.
    pub fn primary_status(&self) -> Result<TaskStatus, FarOptError> {
        match self.submitted("query status")?.backend() {
            BackendKind::Micro => Ok(TaskStatus::Stopped),
            BackendKind::Macro => Ok(self.status()?.last_status),
        }
    }

    /// Poll [`JobHandle::primary_status`] until the job is `STOPPED` or `token` is cancelled.
    pub fn wait(&self, token: &CancellationToken) -> Result<TaskStatus, FarOptError> {
        self.submitted("wait")?;
        let poller = CancellablePoller::with_interval(token.clone(), self.config.poll_interval());
        let mut last = None;

        poller
            .poll_until(|| match self.primary_status() {
                Ok(TaskStatus::Stopped) => Some(Ok(TaskStatus::Stopped)),
                Ok(status) => {
                    if last != Some(status) {
                        log::info!("Job is {status}");
                        last = Some(status);
                    }
                    None
                }
                // Not observable yet.
                Err(FarOptError::NotFound(_)) => None,
                Err(e) => Some(Err(e)),
            })
            .into_result(|| FarOptError::Cancelled)?
    }

    /// All log events currently available.
    pub fn logs(&self) -> Result<Vec<LogEvent>, FarOptError> {
        self.stream_logs(None, 0)?.collect()
    }

    /// Lazily stream the job's log events, dropping the first `skip` of them.
    pub fn stream_logs(
        &self,
        start_time: Option<i64>,
        skip: usize,
    ) -> Result<LogStream, FarOptError> {
        let job = self.submitted("fetch logs")?;
        match &job.execution {
            Execution::Micro { outcome } => {
                let events = match outcome {
                    Some(outcome) => logs::micro_events(
                        &outcome.micrologs,
                        job.submitted_at.timestamp_millis(),
                    ),
                    None => {
                        log::warn!("Output of micro job {} is not available", job.job_id);
                        vec![]
                    }
                };
                Ok(LogStream::replay(events, skip))
            }
            Execution::Macro { .. } => {
                let task = self.status()?;
                if !task.last_status.has_logs() {
                    return Err(FarOptError::LogsUnavailable(task.last_status));
                }
                let stream = format!("{}/{}", self.config.log_stream_prefix, task.task_id());
                Ok(LogStream::remote(
                    self.services.logs.clone(),
                    self.config.log_group.clone(),
                    stream,
                    start_time,
                    skip,
                ))
            }
        }
    }

    /// Request cancellation of the task. Micro jobs cannot be stopped.
    pub fn stop(&self) -> Result<(), FarOptError> {
        let job = self.submitted("stop")?;
        if job.backend() == BackendKind::Micro {
            log::warn!("Micro job {} cannot be stopped once invoked", job.job_id);
            return Ok(());
        }
        let task = self.status()?;
        self.services
            .macro_backend
            .stop_task(&self.config.cluster, task.task_id(), "Stopped by user")
            .log_err(&format!("Failed to stop task {}", task.task_id()))?;
        log::info!("Stopped job {}", job.job_id);
        Ok(())
    }

    /// Save this job's archive as a recipe that can be re-run later.
    pub fn add_recipe(
        &self,
        description: impl Into<String>,
        maintainer: impl Into<String>,
    ) -> Result<RecipeId, FarOptError> {
        let job = self.submitted("add a recipe")?;
        let source = job.location.source();
        let recipe = RecipeRecord::new(
            RecipeId::generate(),
            description.into(),
            source.bucket,
            source.key,
            maintainer.into(),
        );
        self.recipe_registry()?.put(&recipe)?;
        log::info!("Added recipe {} from job {}", recipe.recipeid, job.job_id);
        Ok(recipe.recipeid)
    }

    /// Names of the files the job wrote to its output directory.
    pub fn list_outputs(&self) -> Result<Vec<String>, FarOptError> {
        let job = self.submitted("list outputs")?;
        let prefix = job.location.output_prefix();
        let listing = self
            .services
            .objects
            .list(job.location.bucket(), Some(&prefix), None)
            .log_err("Failed to list outputs")?;
        Ok(listing
            .contents
            .into_iter()
            .filter_map(|o| o.key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    pub fn download_output(&self, file_name: &str) -> Result<Vec<u8>, FarOptError> {
        let job = self.submitted("download outputs")?;
        let location = job.location.output(file_name);
        let (bytes, _) = self
            .services
            .objects
            .get(&location)
            .map_err(|e| match FarOptError::from(e) {
                FarOptError::NotFound(_) => FarOptError::NotFound(format!("output {file_name}")),
                other => other,
            })
            .log_err(&format!("Failed to download {location}"))?;
        Ok(bytes)
    }

    /// Averages of `name` over the last `window`, oldest first.
    pub fn metric(
        &self,
        name: &str,
        window: Duration,
    ) -> Result<Vec<DatapointSchema>, FarOptError> {
        let job = self.submitted("read metrics")?;
        let end = Utc::now().timestamp_millis();
        let window = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let query = MetricStatisticsQuery {
            metric_name: name.to_string(),
            dimension_name: "jobid".to_string(),
            dimension_value: job.location.prefix().to_string(),
            start_time: end.saturating_sub(window),
            end_time: end,
            period: METRIC_PERIOD_SECS,
            statistics: "Average".to_string(),
        };
        let mut datapoints = self
            .services
            .metrics
            .get_metric_statistics(&self.config.metrics_namespace, &query)
            .log_err(&format!("Failed to read metric {name}"))?
            .datapoints;
        datapoints.sort_by_key(|d| d.timestamp);
        Ok(datapoints)
    }

    fn submitted(&self, operation: &'static str) -> Result<&SubmittedJob, FarOptError> {
        match &self.state {
            JobState::Submitted(job) => Ok(job),
            _ => {
                log::error!("Cannot {operation}: please submit the job first!");
                Err(self.invalid_state(operation, "submitted"))
            }
        }
    }

    fn invalid_state(&self, operation: &'static str, required: &'static str) -> FarOptError {
        FarOptError::InvalidState {
            operation,
            required,
            actual: self.state.name(),
        }
    }

    fn job_registry(&self) -> Result<JobRegistry, FarOptError> {
        Ok(JobRegistry::new(
            self.services.tables.clone(),
            self.config.job_table()?,
        ))
    }

    fn recipe_registry(&self) -> Result<RecipeRegistry, FarOptError> {
        Ok(RecipeRegistry::new(
            self.services.tables.clone(),
            self.config.recipe_table()?,
        ))
    }
}

#[cfg(test)]
mod tests;
