use std::sync::Arc;

use faropt_api::schemas::{
    ContainerOverrideSchema, InvokeResponseSchema, KeyValuePairSchema, MicroJobPayload,
    RunTaskRequestSchema, TaskOverridesSchema,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::backend::Services;
use crate::config::FarOptConfig;
use crate::error::{FarOptError, LogErr};
use crate::ids::JobId;
use crate::layout::JobLocation;

/// Which backend executes a job.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Long running container task. Fire and forget.
    #[default]
    Macro,
    /// Short synchronous function invocation.
    Micro,
}

/// What the backend acknowledged when a job was dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Macro {
        task_arn: Option<String>,
    },
    /// `outcome` is absent for handles re-attached to an existing job.
    Micro { outcome: Option<MicroOutcome> },
}

impl Execution {
    pub fn backend(&self) -> BackendKind {
        match self {
            Execution::Macro { .. } => BackendKind::Macro,
            Execution::Micro { .. } => BackendKind::Micro,
        }
    }
}

/// Result of a micro invocation. A fault in the user code does not make the dispatch fail;
/// it shows up in `function_error` and in the captured output.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroOutcome {
    pub status_code: u16,
    pub function_error: Option<String>,
    pub micrologs: String,
    pub payload: serde_json::Value,
}

impl From<InvokeResponseSchema> for MicroOutcome {
    fn from(response: InvokeResponseSchema) -> Self {
        Self {
            status_code: response.status_code,
            function_error: response.function_error,
            micrologs: response.log_result.unwrap_or_default(),
            payload: response.payload,
        }
    }
}

/// Sends a staged job to exactly one backend.
pub struct BackendDispatcher {
    services: Services,
    config: Arc<FarOptConfig>,
}

impl BackendDispatcher {
    pub fn new(services: Services, config: Arc<FarOptConfig>) -> Self {
        Self { services, config }
    }

    pub fn dispatch(
        &self,
        job_id: &JobId,
        location: &JobLocation,
        backend: BackendKind,
    ) -> Result<Execution, FarOptError> {
        match backend {
            BackendKind::Macro => self.dispatch_macro(job_id, location),
            BackendKind::Micro => self.dispatch_micro(job_id, location),
        }
    }

    /// Enqueue a task. Returns once the cluster acknowledged the request.
    fn dispatch_macro(
        &self,
        job_id: &JobId,
        location: &JobLocation,
    ) -> Result<Execution, FarOptError> {
        let request = RunTaskRequestSchema {
            task_definition: self.config.task_definition.clone(),
            count: 1,
            started_by: job_id.to_string(),
            overrides: TaskOverridesSchema {
                container_overrides: vec![ContainerOverrideSchema {
                    name: self.config.container_name.clone(),
                    environment: vec![
                        KeyValuePairSchema {
                            name: "s3bucket".to_string(),
                            value: location.bucket().to_string(),
                        },
                        KeyValuePairSchema {
                            name: "s3key".to_string(),
                            value: location.prefix().to_string(),
                        },
                    ],
                }],
            },
        };

        let response = self
            .services
            .macro_backend
            .run_task(&self.config.cluster, &request)
            .log_err(&format!("Failed to start a task for job {job_id}"))?;

        if response.tasks.is_empty() {
            let reasons = response
                .failures
                .iter()
                .map(|f| f.reason.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            log::error!("Task for job {job_id} was not placed: {reasons}");
            return Err(FarOptError::Dispatch(reasons));
        }

        let task_arn = response.tasks.first().map(|t| t.task_arn.clone());
        log::info!("Submitted macro job {job_id}");
        Ok(Execution::Macro { task_arn })
    }

    /// Invoke the function and block until it returns.
    fn dispatch_micro(
        &self,
        job_id: &JobId,
        location: &JobLocation,
    ) -> Result<Execution, FarOptError> {
        let payload = MicroJobPayload {
            bucket: location.bucket().to_string(),
            key: location.prefix().to_string(),
        };

        log::info!("Invoking micro function for job {job_id}");
        let response = self
            .services
            .micro_backend
            .invoke(
                &self.config.micro_function,
                &payload,
                self.config.micro_timeout(),
            )
            .log_err(&format!("Micro invocation for job {job_id} failed"))?;

        let outcome = MicroOutcome::from(response);
        if let Some(error) = &outcome.function_error {
            log::warn!("Micro job {job_id} reported a function error: {error}");
        }
        log::info!("Submitted micro job {job_id}");
        Ok(Execution::Micro {
            outcome: Some(outcome),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use faropt_api::ClientError;

    fn setup() -> (MemoryBackend, BackendDispatcher) {
        let memory = MemoryBackend::new();
        let config = FarOptConfig::builder().with_bucket("bucket").build();
        let dispatcher = BackendDispatcher::new(memory.services(), Arc::new(config));
        (memory, dispatcher)
    }

    #[test]
    fn macro_dispatch_passes_job_location_to_the_container() {
        let (memory, dispatcher) = setup();
        let job_id = JobId::generate();
        let location = JobLocation::new("bucket", &job_id, BackendKind::Macro);

        let execution = dispatcher
            .dispatch(&job_id, &location, BackendKind::Macro)
            .unwrap();

        assert!(matches!(execution, Execution::Macro { task_arn: Some(_) }));
        let requests = memory.cluster.run_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].started_by, job_id.to_string());
        let env = &requests[0].overrides.container_overrides[0].environment;
        assert_eq!(env[0].value, "bucket");
        assert_eq!(env[1].value, job_id.to_string());
        assert!(memory.function.invocations().is_empty());
    }

    #[test]
    fn unplaced_task_is_a_dispatch_error() {
        let (memory, dispatcher) = setup();
        memory.cluster.reject_runs("RESOURCE:MEMORY");
        let job_id = JobId::generate();
        let location = JobLocation::new("bucket", &job_id, BackendKind::Macro);

        let err = dispatcher
            .dispatch(&job_id, &location, BackendKind::Macro)
            .unwrap_err();
        assert!(matches!(err, FarOptError::Dispatch(ref r) if r == "RESOURCE:MEMORY"));
        assert!(err.is_transient());
    }

    #[test]
    fn micro_dispatch_sends_staged_prefix() {
        let (memory, dispatcher) = setup();
        let job_id = JobId::generate();
        let location = JobLocation::new("bucket", &job_id, BackendKind::Micro);

        let execution = dispatcher
            .dispatch(&job_id, &location, BackendKind::Micro)
            .unwrap();

        let invocations = memory.function.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].1.key, format!("staged/{job_id}"));
        match execution {
            Execution::Micro { outcome: Some(o) } => assert!(o.micrologs.contains("source.zip")),
            other => panic!("unexpected execution {other:?}"),
        }
        assert!(memory.cluster.run_requests().is_empty());
    }

    #[test]
    fn micro_user_fault_is_still_a_successful_dispatch() {
        let (memory, dispatcher) = setup();
        memory.function.set_handler(|_| {
            Ok(InvokeResponseSchema {
                status_code: 200,
                function_error: Some("Unhandled".into()),
                log_result: Some("Traceback: ZeroDivisionError".into()),
                payload: serde_json::Value::Null,
            })
        });
        let job_id = JobId::generate();
        let location = JobLocation::new("bucket", &job_id, BackendKind::Micro);

        let execution = dispatcher
            .dispatch(&job_id, &location, BackendKind::Micro)
            .unwrap();
        assert_eq!(execution.backend(), BackendKind::Micro);
    }

    #[test]
    fn micro_timeout_fails_the_submission() {
        let (memory, dispatcher) = setup();
        memory.function.set_handler(|_| Err(ClientError::Timeout));
        let job_id = JobId::generate();
        let location = JobLocation::new("bucket", &job_id, BackendKind::Micro);

        let err = dispatcher
            .dispatch(&job_id, &location, BackendKind::Micro)
            .unwrap_err();
        assert!(matches!(err, FarOptError::Backend(ClientError::Timeout)));
    }
}
