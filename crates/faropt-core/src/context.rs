use std::sync::Arc;

use faropt_api::Client;

use crate::backend::Services;
use crate::config::FarOptConfig;
use crate::dispatch::BackendKind;
use crate::error::{FarOptError, LogErr};
use crate::ids::{JobId, RecipeId};
use crate::job::JobHandle;
use crate::model::ModelStore;
use crate::registry::{JobRecord, JobRegistry, RecipeRecord, RecipeRegistry};

/// Entry point to a deployed FarOpt stack.
#[derive(Debug, Clone)]
pub struct FarOpt {
    config: Arc<FarOptConfig>,
    services: Services,
}

impl FarOpt {
    /// Connect to the gateway and check that the stack is deployed.
    ///
    /// Storage locations missing from `config` are taken from the stack outputs.
    pub fn connect(mut config: FarOptConfig) -> Result<Self, FarOptError> {
        let client = Client::new(config.endpoint_url()?, config.credentials())
            .log_err("Failed to create the FarOpt client")?;

        let stack = client
            .describe_stack(&config.stack_name)
            .map_err(|e| match e {
                faropt_api::ClientError::NotFound => {
                    FarOptError::NotReady(format!("stack {} is not deployed", config.stack_name))
                }
                other => other.into(),
            })
            .log_err("Failed to describe the FarOpt stack")?;
        if !stack.is_ready() {
            return Err(FarOptError::NotReady(format!(
                "stack {} is {}",
                stack.stack_name, stack.stack_status
            )));
        }
        config.apply_stack_outputs(&stack);
        log::info!("Connected to FarOpt stack {}", stack.stack_name);

        Ok(Self::with_services(config, Services::http(client)))
    }

    /// A context on arbitrary services, without any readiness check.
    pub fn with_services(config: FarOptConfig, services: Services) -> Self {
        Self {
            config: Arc::new(config),
            services,
        }
    }

    pub fn config(&self) -> &FarOptConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// A new, unconfigured job.
    pub fn job(&self) -> JobHandle {
        JobHandle::new(self.services.clone(), self.config.clone())
    }

    /// A handle on a job submitted earlier.
    pub fn attach(&self, job_id: JobId, backend: BackendKind) -> Result<JobHandle, FarOptError> {
        JobHandle::attach(self.services.clone(), self.config.clone(), job_id, backend)
    }

    /// Like [`FarOpt::attach`], with the backend read from the job registry.
    pub fn attach_registered(&self, job_id: &JobId) -> Result<JobHandle, FarOptError> {
        let record = self.jobs()?.get(job_id.as_str())?;
        self.attach(record.jobid.clone(), record.backend())
    }

    pub fn models(&self) -> Result<ModelStore, FarOptError> {
        Ok(ModelStore::new(
            self.services.objects.clone(),
            self.config.async_bucket()?,
            self.config.concurrency,
        ))
    }

    pub fn list_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, FarOptError> {
        self.jobs()?.scan(limit)
    }

    pub fn list_recipes(&self, limit: usize) -> Result<Vec<RecipeRecord>, FarOptError> {
        self.recipes()?.scan(limit)
    }

    pub fn recipe(&self, id: &RecipeId) -> Result<RecipeRecord, FarOptError> {
        self.recipes()?.get(&id.to_string())
    }

    fn jobs(&self) -> Result<JobRegistry, FarOptError> {
        Ok(JobRegistry::new(
            self.services.tables.clone(),
            self.config.job_table()?,
        ))
    }

    fn recipes(&self) -> Result<RecipeRegistry, FarOptError> {
        Ok(RecipeRegistry::new(
            self.services.tables.clone(),
            self.config.recipe_table()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::config::ConcurrencyMode;
    use faropt_api::schemas::TaskStatus;
    use std::time::Duration;

    fn context() -> (MemoryBackend, FarOpt, tempfile::TempDir) {
        let scratch = tempfile::tempdir().unwrap();
        let config = FarOptConfig::builder()
            .with_bucket("faropt-bucket")
            .with_async_bucket("faropt-async")
            .with_job_table("jobs")
            .with_recipe_table("recipes")
            .with_poll_interval(Duration::ZERO)
            .with_scratch_dir(scratch.path())
            .build();
        let backend = MemoryBackend::new();
        let faropt = FarOpt::with_services(config, backend.services());
        (backend, faropt, scratch)
    }

    fn source_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print('hello')").unwrap();
        dir
    }

    #[test]
    fn submitted_jobs_are_listed() {
        let (_backend, faropt, _scratch) = context();
        let source = source_dir();

        let mut job = faropt.job();
        job.configure(source.path()).unwrap();
        let job_id = job.submit(BackendKind::Macro).unwrap();

        let jobs = faropt.list_jobs(10).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].jobid, job_id);
        assert_eq!(jobs[0].path, format!("{job_id}/source.zip"));
    }

    #[test]
    fn list_jobs_honours_limit() {
        let (_backend, faropt, _scratch) = context();
        let source = source_dir();

        for _ in 0..3 {
            let mut job = faropt.job();
            job.configure(source.path()).unwrap();
            job.submit(BackendKind::Macro).unwrap();
        }

        assert_eq!(faropt.list_jobs(2).unwrap().len(), 2);
        assert_eq!(faropt.list_jobs(10).unwrap().len(), 3);
    }

    #[test]
    fn attached_job_reports_live_status() {
        let (backend, faropt, _scratch) = context();
        let source = source_dir();

        let mut job = faropt.job();
        job.configure(source.path()).unwrap();
        let job_id = job.submit(BackendKind::Macro).unwrap();
        backend.cluster.set_status(job_id.as_str(), TaskStatus::Running);

        let attached = faropt.attach_registered(&job_id).unwrap();
        assert_eq!(attached.backend(), Some(BackendKind::Macro));
        assert_eq!(attached.primary_status().unwrap(), TaskStatus::Running);
    }

    #[test]
    fn recipes_are_listed_and_fetched() {
        let (_backend, faropt, _scratch) = context();
        let source = source_dir();

        let mut job = faropt.job();
        job.configure(source.path()).unwrap();
        job.submit(BackendKind::Macro).unwrap();
        let recipe_id = job.add_recipe("quadratic", "ops@example.com").unwrap();

        let recipe = faropt.recipe(&recipe_id).unwrap();
        assert_eq!(recipe.description, "quadratic");
        assert_eq!(faropt.list_recipes(10).unwrap().len(), 1);
        assert!(matches!(
            faropt.recipe(&RecipeId::generate()),
            Err(FarOptError::NotFound(_))
        ));
    }

    #[test]
    fn models_follow_configured_mode() {
        let (backend, _faropt, scratch) = context();
        let config = FarOptConfig::builder()
            .with_async_bucket("faropt-async")
            .with_concurrency(ConcurrencyMode::Optimistic)
            .with_scratch_dir(scratch.path())
            .build();
        let faropt = FarOpt::with_services(config, backend.services());

        let models = faropt.models().unwrap();
        assert_eq!(models.mode(), ConcurrencyMode::Optimistic);
        let name = models.create_model(vec![(0.0, 1.0)], None).unwrap();
        assert!(
            backend
                .objects
                .bytes("faropt-async", &format!("{name}/model.pkl"))
                .is_some()
        );
    }

    #[test]
    fn missing_tables_are_configuration_errors() {
        let backend = MemoryBackend::new();
        let faropt = FarOpt::with_services(FarOptConfig::default(), backend.services());

        let error = faropt.list_jobs(10).unwrap_err();
        assert!(error.is_configuration());
        assert!(faropt.models().unwrap_err().is_configuration());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let config = FarOptConfig::builder().with_endpoint("not a url").build();
        assert!(matches!(
            FarOpt::connect(config),
            Err(FarOptError::Config(_))
        ));
    }
}
