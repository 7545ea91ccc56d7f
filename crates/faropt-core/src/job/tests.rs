use std::thread;

use faropt_api::ClientError;
use faropt_api::schemas::{InvokeResponseSchema, LogEventSchema};
use rstest::rstest;
use tempfile::TempDir;

use super::*;
use crate::backend::memory::MemoryBackend;

const BUCKET: &str = "faropt-bucket";

struct Fixture {
    memory: MemoryBackend,
    config: Arc<FarOptConfig>,
    source: TempDir,
    _scratch: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("main.py"), b"print('optimizing')\n").unwrap();
        std::fs::create_dir_all(source.path().join("data")).unwrap();
        std::fs::write(source.path().join("data/input.csv"), b"x,y\n1,2\n").unwrap();

        let config = FarOptConfig::builder()
            .with_bucket(BUCKET)
            .with_job_table("jobs")
            .with_recipe_table("recipes")
            .with_scratch_dir(scratch.path())
            .with_poll_interval(Duration::ZERO)
            .build();

        Self {
            memory: MemoryBackend::new(),
            config: Arc::new(config),
            source,
            _scratch: scratch,
        }
    }

    fn handle(&self) -> JobHandle {
        JobHandle::new(self.memory.services(), self.config.clone())
    }

    fn submitted(&self, backend: BackendKind) -> (JobHandle, JobId) {
        let mut handle = self.handle();
        handle.configure(self.source.path()).unwrap();
        let job_id = handle.submit(backend).unwrap();
        (handle, job_id)
    }

    fn remote_writes(&self) -> usize {
        self.memory.objects.write_count()
            + self.memory.tables.write_count()
            + self.memory.cluster.run_requests().len()
            + self.memory.function.invocations().len()
    }

    fn push_logs(&self, handle: &JobHandle, first: i64, messages: &[&str]) {
        let task = handle.status().unwrap();
        let stream = format!("faroptlogs/FarOptImage/{}", task.task_id());
        self.memory.logs.push(
            "faroptlogGroup",
            &stream,
            messages.iter().enumerate().map(|(i, m)| LogEventSchema {
                timestamp: 1_700_000_000_000 + first + i as i64,
                message: m.to_string(),
                ingestion_time: None,
            }),
        );
    }
}

#[test]
fn submit_before_configure_does_not_touch_remote_state() {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();

    let err = handle.submit(BackendKind::Macro).unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(handle.state().name(), "unconfigured");
    assert_eq!(fixture.remote_writes(), 0);
}

#[test]
fn operations_before_submit_are_rejected() {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();
    handle.configure(fixture.source.path()).unwrap();

    assert!(handle.status().unwrap_err().is_configuration());
    assert!(handle.logs().unwrap_err().is_configuration());
    assert!(handle.stop().unwrap_err().is_configuration());
    assert!(handle.add_recipe("d", "m").unwrap_err().is_configuration());
    assert!(
        handle
            .wait(&CancellationToken::new())
            .unwrap_err()
            .is_configuration()
    );
    assert_eq!(fixture.remote_writes(), 0);
}

#[test]
fn configure_can_repackage_until_submitted() {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();

    let first = handle.configure(fixture.source.path()).unwrap();
    std::fs::write(fixture.source.path().join("extra.py"), b"pass").unwrap();
    let second = handle.configure(fixture.source.path()).unwrap();
    assert_eq!(first.file_count() + 1, second.file_count());

    handle.submit(BackendKind::Macro).unwrap();
    assert!(
        handle
            .configure(fixture.source.path())
            .unwrap_err()
            .is_configuration()
    );
}

#[test]
fn missing_source_dir_fails_configure() {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();

    let err = handle.configure("/definitely/not/here").unwrap_err();
    assert!(matches!(err, FarOptError::Package(_)));
    assert_eq!(handle.state().name(), "unconfigured");
}

#[test]
fn macro_submit_uploads_registers_and_dispatches() {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();
    let archive = handle.configure(fixture.source.path()).unwrap();

    let job_id = handle.submit(BackendKind::Macro).unwrap();

    let key = format!("{job_id}/source.zip");
    assert_eq!(
        fixture.memory.objects.bytes(BUCKET, &key).unwrap(),
        archive.read_bytes().unwrap()
    );
    let rows = fixture.memory.tables.rows("jobs");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["path"], key.as_str());
    assert_eq!(rows[0]["bucket"], BUCKET);

    let requests = fixture.memory.cluster.run_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].started_by, job_id.to_string());
    assert_eq!(handle.backend(), Some(BackendKind::Macro));
    assert_eq!(handle.job_id(), Some(&job_id));
}

#[test]
fn failed_upload_leaves_handle_configured() {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();
    handle.configure(fixture.source.path()).unwrap();
    fixture.memory.objects.set_fail_writes(true);

    let err = handle.submit(BackendKind::Macro).unwrap_err();

    assert!(err.is_transient());
    assert_eq!(handle.state().name(), "configured");
    assert_eq!(fixture.memory.tables.write_count(), 0);
    assert!(fixture.memory.cluster.run_requests().is_empty());

    fixture.memory.objects.set_fail_writes(false);
    handle.submit(BackendKind::Macro).unwrap();
    assert_eq!(handle.state().name(), "submitted");
}

#[test]
fn rejected_dispatch_leaves_handle_configured() {
    let fixture = Fixture::new();
    fixture.memory.cluster.reject_runs("RESOURCE:CPU");
    let mut handle = fixture.handle();
    handle.configure(fixture.source.path()).unwrap();

    let err = handle.submit(BackendKind::Macro).unwrap_err();

    assert!(matches!(err, FarOptError::Dispatch(_)));
    assert_eq!(handle.state().name(), "configured");
}

#[rstest]
#[case(BackendKind::Macro)]
#[case(BackendKind::Micro)]
fn failed_registration_leaves_handle_configured(#[case] backend: BackendKind) {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();
    handle.configure(fixture.source.path()).unwrap();
    fixture.memory.tables.set_fail_writes(true);

    let err = handle.submit(backend).unwrap_err();

    assert!(err.is_transient());
    assert_eq!(handle.state().name(), "configured");
    assert_eq!(handle.job_id(), None);
    assert!(fixture.memory.tables.rows("jobs").is_empty());
    assert!(fixture.memory.cluster.run_requests().is_empty());
    assert!(fixture.memory.function.invocations().is_empty());

    fixture.memory.tables.set_fail_writes(false);
    handle.submit(backend).unwrap();
    assert_eq!(handle.state().name(), "submitted");
    assert_eq!(fixture.memory.tables.rows("jobs").len(), 1);
}

#[test]
fn failed_micro_upload_leaves_handle_configured() {
    let fixture = Fixture::new();
    let mut handle = fixture.handle();
    handle.configure(fixture.source.path()).unwrap();
    fixture.memory.objects.set_fail_writes(true);

    let err = handle.submit(BackendKind::Micro).unwrap_err();

    assert!(err.is_transient());
    assert_eq!(handle.state().name(), "configured");
    assert_eq!(fixture.memory.tables.write_count(), 0);
    assert!(fixture.memory.function.invocations().is_empty());
    assert!(fixture.memory.objects.keys(BUCKET).is_empty());
}

#[test]
fn micro_submit_is_stopped_immediately() {
    let fixture = Fixture::new();
    fixture.memory.function.set_handler(|_| {
        Ok(InvokeResponseSchema {
            status_code: 200,
            function_error: Some("Unhandled".into()),
            log_result: Some("START\nZeroDivisionError\nEND".into()),
            payload: serde_json::Value::Null,
        })
    });

    let (handle, job_id) = fixture.submitted(BackendKind::Micro);

    assert_eq!(handle.primary_status().unwrap(), TaskStatus::Stopped);
    assert!(
        fixture
            .memory
            .objects
            .bytes(BUCKET, &format!("staged/{job_id}/source.zip"))
            .is_some()
    );
    let invocations = fixture.memory.function.invocations();
    assert_eq!(invocations[0].1.key, format!("staged/{job_id}"));
    assert!(fixture.memory.cluster.run_requests().is_empty());

    let messages: Vec<String> = handle
        .logs()
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, vec!["START", "ZeroDivisionError", "END"]);
    assert_eq!(handle.micrologs(), Some("START\nZeroDivisionError\nEND"));
}

#[test]
fn micro_jobs_cannot_be_stopped_or_described() {
    let fixture = Fixture::new();
    let (handle, _) = fixture.submitted(BackendKind::Micro);

    handle.stop().unwrap();
    assert!(fixture.memory.cluster.stop_requests().is_empty());
    assert!(handle.status().unwrap_err().is_configuration());
}

#[test]
fn micro_timeout_fails_submission() {
    let fixture = Fixture::new();
    fixture
        .memory
        .function
        .set_handler(|_| Err(ClientError::Timeout));
    let mut handle = fixture.handle();
    handle.configure(fixture.source.path()).unwrap();

    let err = handle.submit(BackendKind::Micro).unwrap_err();

    assert!(matches!(err, FarOptError::Backend(ClientError::Timeout)));
    assert_eq!(handle.state().name(), "configured");
}

#[test]
fn status_without_any_task_is_not_found() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    fixture.memory.cluster.remove_tasks(&job_id.to_string());

    assert!(handle.status().unwrap_err().is_not_found());
}

#[test]
fn status_falls_back_to_stopped_tasks() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    assert_eq!(handle.primary_status().unwrap(), TaskStatus::Provisioning);

    fixture
        .memory
        .cluster
        .set_status(&job_id.to_string(), TaskStatus::Stopped);

    let task = handle.status().unwrap();
    assert_eq!(task.last_status, TaskStatus::Stopped);
    assert_eq!(task.started_by.as_deref(), Some(job_id.as_str()));
}

#[test]
fn logs_require_a_started_task() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    fixture
        .memory
        .cluster
        .set_status(&job_id.to_string(), TaskStatus::Pending);

    assert!(matches!(
        handle.logs().unwrap_err(),
        FarOptError::LogsUnavailable(TaskStatus::Pending)
    ));
    assert_eq!(fixture.memory.logs.request_count(), 0);
}

#[test]
fn logs_are_read_from_the_task_stream() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    fixture
        .memory
        .cluster
        .set_status(&job_id.to_string(), TaskStatus::Running);
    fixture.push_logs(&handle, 0, &["iteration 0", "iteration 1", "iteration 2"]);

    let events = handle.logs().unwrap();

    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(events[2].message, "iteration 2");
}

#[test]
fn stream_logs_resumes_after_skip() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    fixture
        .memory
        .cluster
        .set_status(&job_id.to_string(), TaskStatus::Running);
    fixture.push_logs(&handle, 0, &["a", "b", "c"]);

    let mut stream = handle.stream_logs(None, 0).unwrap();
    assert_eq!(stream.next().unwrap().unwrap().message, "a");
    assert_eq!(stream.next().unwrap().unwrap().message, "b");
    let position = stream.position();

    fixture.push_logs(&handle, 3, &["d"]);
    let rest: Vec<String> = handle
        .stream_logs(None, position)
        .unwrap()
        .map(|e| e.unwrap().message)
        .collect();

    assert_eq!(rest, vec!["c", "d"]);
}

#[test]
fn wait_returns_once_stopped() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    let cluster = fixture.memory.cluster.clone();
    let started_by = job_id.to_string();

    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        cluster.set_status(&started_by, TaskStatus::Running);
        thread::sleep(Duration::from_millis(20));
        cluster.set_status(&started_by, TaskStatus::Stopped);
    });

    let status = handle.wait(&CancellationToken::new()).unwrap();
    worker.join().unwrap();
    assert_eq!(status, TaskStatus::Stopped);
}

#[test]
fn wait_tolerates_invisible_task_and_can_be_cancelled() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    fixture.memory.cluster.remove_tasks(&job_id.to_string());
    let token = CancellationToken::new();
    let canceller = token.clone();

    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        canceller.cancel();
    });

    let err = handle.wait(&token).unwrap_err();
    worker.join().unwrap();
    assert!(matches!(err, FarOptError::Cancelled));
}

#[test]
fn micro_wait_returns_immediately() {
    let fixture = Fixture::new();
    let (handle, _) = fixture.submitted(BackendKind::Micro);
    assert_eq!(
        handle.wait(&CancellationToken::new()).unwrap(),
        TaskStatus::Stopped
    );
}

#[test]
fn stop_requests_task_cancellation() {
    let fixture = Fixture::new();
    let (handle, _) = fixture.submitted(BackendKind::Macro);
    let task_id = handle.status().unwrap().task_id().to_string();

    handle.stop().unwrap();

    let stops = fixture.memory.cluster.stop_requests();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].0, task_id);
    assert_eq!(handle.primary_status().unwrap(), TaskStatus::Stopped);
}

#[test]
fn recipe_rerun_uses_byte_identical_archive() {
    let fixture = Fixture::new();
    let (original, original_id) = fixture.submitted(BackendKind::Macro);
    let recipe_id = original.add_recipe("weekly routing", "ops@example.com").unwrap();

    let recipes = fixture.memory.tables.rows("recipes");
    assert_eq!(recipes[0]["maintainer"], "ops@example.com");
    assert_eq!(recipes[0]["path"], format!("{original_id}/source.zip"));

    let puts_before = fixture.memory.objects.write_count();
    let mut rerun = fixture.handle();
    let rerun_id = rerun.run_recipe(&recipe_id, BackendKind::Micro).unwrap();

    assert_ne!(rerun_id, original_id);
    assert_eq!(fixture.memory.objects.write_count(), puts_before + 1);
    assert_eq!(
        fixture
            .memory
            .objects
            .bytes(BUCKET, &format!("staged/{rerun_id}/source.zip"))
            .unwrap(),
        fixture
            .memory
            .objects
            .bytes(BUCKET, &format!("{original_id}/source.zip"))
            .unwrap()
    );
    assert_eq!(fixture.memory.tables.rows("jobs").len(), 2);
    assert_eq!(rerun.backend(), Some(BackendKind::Micro));
}

#[test]
fn run_recipe_checks_state_and_recipe() {
    let fixture = Fixture::new();
    let (mut submitted, _) = fixture.submitted(BackendKind::Macro);
    let recipe_id = submitted.add_recipe("d", "m").unwrap();

    assert!(
        submitted
            .run_recipe(&recipe_id, BackendKind::Macro)
            .unwrap_err()
            .is_configuration()
    );
    assert!(
        fixture
            .handle()
            .run_recipe(&RecipeId::generate(), BackendKind::Macro)
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn outputs_are_listed_and_downloaded() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    fixture.memory.objects.insert(
        BUCKET,
        &format!("{job_id}/output/routes.json"),
        b"{\"cost\": 12}".to_vec(),
    );

    assert_eq!(handle.list_outputs().unwrap(), vec!["routes.json"]);
    assert_eq!(
        handle.download_output("routes.json").unwrap(),
        b"{\"cost\": 12}"
    );
    assert!(handle.download_output("missing.json").unwrap_err().is_not_found());
}

#[test]
fn metric_queries_the_job_dimension() {
    let fixture = Fixture::new();
    let (handle, job_id) = fixture.submitted(BackendKind::Macro);
    let now = Utc::now().timestamp_millis();
    let metrics = &fixture.memory.metrics;
    metrics.record("FarOpt", "objective", job_id.as_str(), now - 1_000, 2.0);
    metrics.record("FarOpt", "objective", job_id.as_str(), now - 5_000, 3.0);
    metrics.record("FarOpt", "objective", "other-job", now - 1_000, 9.0);
    metrics.record("FarOpt", "objective", job_id.as_str(), now - 7_200_000, 4.0);

    let points = handle.metric("objective", DEFAULT_METRIC_WINDOW).unwrap();

    let values: Vec<f64> = points.iter().filter_map(|p| p.average).collect();
    assert_eq!(values, vec![3.0, 2.0]);
    let query = &metrics.queries()[0];
    assert_eq!(query.period, 60);
    assert_eq!(query.dimension_name, "jobid");
    assert_eq!(query.statistics, "Average");
}

#[test]
fn attached_handle_sees_existing_job() {
    let fixture = Fixture::new();
    let (_, job_id) = fixture.submitted(BackendKind::Macro);

    let attached = JobHandle::attach(
        fixture.memory.services(),
        fixture.config.clone(),
        job_id.clone(),
        BackendKind::Macro,
    )
    .unwrap();

    assert_eq!(attached.primary_status().unwrap(), TaskStatus::Provisioning);
    attached.stop().unwrap();
    assert_eq!(fixture.memory.cluster.stop_requests().len(), 1);
}
