use std::sync::Arc;

use faropt_api::client::ObjectVersion;
use faropt_api::schemas::TaggingSchema;

use super::bounds::Bounds;
use super::optimizer::{Observation, Optimizer};
use crate::backend::ObjectStore;
use crate::config::ConcurrencyMode;
use crate::error::{FarOptError, LogErr};
use crate::ids::ModelName;
use crate::layout::{MODEL_FILE, ObjectLocation, model_key};

const TAG_KEY: &str = "tag";
const UNTAGGED: &str = "none";

/// A stored model as reported by [`ModelStore::list_models`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSummary {
    pub name: ModelName,
    pub tag: String,
}

/// Optimizer state read from the store, with the version it was read at.
#[derive(Debug, Clone)]
pub struct ModelCheckout {
    name: ModelName,
    optimizer: Optimizer,
    version: ObjectVersion,
}

impl ModelCheckout {
    pub fn name(&self) -> ModelName {
        self.name
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut Optimizer {
        &mut self.optimizer
    }

    pub fn version(&self) -> &ObjectVersion {
        &self.version
    }
}

/// Named optimizers persisted as one blob each in the object store.
///
/// A `tell` downloads the blob, records the observation and uploads the result. With
/// [`ConcurrencyMode::LastWriteWins`] two concurrent tells on the same model race and the
/// second upload silently replaces the first. [`ConcurrencyMode::Optimistic`] makes the
/// upload conditional on the version read, so the loser gets [`FarOptError::Conflict`].
#[derive(Clone)]
pub struct ModelStore {
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    mode: ConcurrencyMode,
}

impl ModelStore {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        mode: ConcurrencyMode,
    ) -> Self {
        Self {
            objects,
            bucket: bucket.into(),
            mode,
        }
    }

    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    fn location(&self, name: &ModelName) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), model_key(name))
    }

    /// Validates `bounds` before anything is uploaded.
    pub fn create_model<B>(&self, bounds: B, tag: Option<&str>) -> Result<ModelName, FarOptError>
    where
        B: TryInto<Bounds>,
        FarOptError: From<B::Error>,
    {
        let bounds: Bounds = bounds.try_into()?;
        let optimizer = Optimizer::with_bounds(bounds);
        let name = ModelName::generate();
        let location = self.location(&name);

        self.objects
            .put(&location, optimizer.to_bytes()?)
            .log_err("Failed to upload model")?;
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            self.objects
                .put_tagging(&location, &TaggingSchema::single(TAG_KEY, tag))
                .log_err("Failed to tag model")?;
        }

        log::info!("Created model {name} at {location}");
        Ok(name)
    }

    pub fn load(&self, name: &ModelName) -> Result<Optimizer, FarOptError> {
        Ok(self.checkout(name)?.optimizer)
    }

    /// Next candidate point. Nothing is written back.
    pub fn ask_model(&self, name: &ModelName) -> Result<Vec<f64>, FarOptError> {
        Ok(self.load(name)?.ask())
    }

    /// Records `f(x)` and uploads the updated state. Returns the best observation so far.
    pub fn tell_model(
        &self,
        name: &ModelName,
        x: Vec<f64>,
        f: f64,
    ) -> Result<Observation, FarOptError> {
        let mut checkout = self.checkout(name)?;
        let best = checkout.optimizer.tell(x, f)?.clone();
        self.commit(checkout)?;
        Ok(best)
    }

    /// Download half of the tell cycle.
    pub fn checkout(&self, name: &ModelName) -> Result<ModelCheckout, FarOptError> {
        let (bytes, version) = self
            .objects
            .get(&self.location(name))
            .map_err(|e| match e {
                faropt_api::ClientError::NotFound => {
                    FarOptError::NotFound(format!("model {name}"))
                }
                other => other.into(),
            })
            .log_err("Failed to download model")?;

        Ok(ModelCheckout {
            name: *name,
            optimizer: Optimizer::from_bytes(&bytes)?,
            version,
        })
    }

    /// Upload half of the tell cycle.
    pub fn commit(&self, checkout: ModelCheckout) -> Result<ObjectVersion, FarOptError> {
        let location = self.location(&checkout.name);
        let bytes = checkout.optimizer.to_bytes()?;

        let version = match self.mode {
            ConcurrencyMode::LastWriteWins => self.objects.put(&location, bytes)?,
            ConcurrencyMode::Optimistic => self
                .objects
                .put_if_match(&location, bytes, &checkout.version)
                .map_err(|e| match e {
                    faropt_api::ClientError::PreconditionFailed => {
                        FarOptError::Conflict(format!("model {}", checkout.name))
                    }
                    other => other.into(),
                })?,
        };

        log::debug!("Committed model {} as version {}", checkout.name, version.0);
        Ok(version)
    }

    pub fn list_models(&self) -> Result<Vec<ModelSummary>, FarOptError> {
        let suffix = format!("/{MODEL_FILE}");
        let listing = self
            .objects
            .list(&self.bucket, None, Some(&suffix))
            .log_err("Failed to list models")?;

        let mut models = Vec::new();
        for key in &listing.common_prefixes {
            let Some(name) = key
                .strip_suffix(&suffix)
                .and_then(|n| n.parse::<ModelName>().ok())
            else {
                continue;
            };
            let tagging = self.objects.get_tagging(&self.location(&name))?;
            models.push(ModelSummary {
                name,
                tag: tagging.get(TAG_KEY).unwrap_or(UNTAGGED).to_string(),
            });
        }
        Ok(models)
    }
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("bucket", &self.bucket)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryObjectStore;

    const BUCKET: &str = "faropt-async";

    fn store(mode: ConcurrencyMode) -> (Arc<MemoryObjectStore>, ModelStore) {
        let objects = Arc::new(MemoryObjectStore::default());
        let store = ModelStore::new(objects.clone(), BUCKET, mode);
        (objects, store)
    }

    fn bounds() -> Vec<(f64, f64)> {
        vec![(-2.0, 2.0), (0.0, 5.0)]
    }

    #[test]
    fn create_model_uploads_fresh_state() {
        let (objects, store) = store(ConcurrencyMode::default());
        let name = store.create_model(bounds(), Some("rosenbrock")).unwrap();

        assert!(objects.bytes(BUCKET, &model_key(&name)).is_some());
        let optimizer = store.load(&name).unwrap();
        assert_eq!(optimizer.bounds().len(), 2);
        assert!(optimizer.observations().is_empty());

        let other = store.create_model(bounds(), None).unwrap();
        assert_ne!(other, name);
    }

    #[test]
    fn malformed_bounds_fail_before_upload() {
        let (objects, store) = store(ConcurrencyMode::default());
        let flat: serde_json::Value = serde_json::json!([1, 2]);

        let result = store.create_model(&flat, None);

        assert!(matches!(result, Err(FarOptError::InvalidBounds(_))));
        assert_eq!(objects.write_count(), 0);
    }

    #[test]
    fn ask_does_not_persist() {
        let (objects, store) = store(ConcurrencyMode::default());
        let name = store.create_model(bounds(), None).unwrap();
        let writes = objects.write_count();

        let first = store.ask_model(&name).unwrap();
        let second = store.ask_model(&name).unwrap();

        assert_eq!(first, second);
        assert_eq!(objects.write_count(), writes);
    }

    #[test]
    fn tell_overwrites_the_blob() {
        let (objects, store) = store(ConcurrencyMode::default());
        let name = store.create_model(bounds(), None).unwrap();

        let x = store.ask_model(&name).unwrap();
        let best = store.tell_model(&name, x.clone(), 1.5).unwrap();
        assert_eq!(best.x, x);

        assert_eq!(store.load(&name).unwrap().observations().len(), 1);
        assert_ne!(store.ask_model(&name).unwrap(), x);
        assert_eq!(objects.keys(BUCKET).len(), 1);
    }

    #[test]
    fn invalid_observation_leaves_state_untouched() {
        let (objects, store) = store(ConcurrencyMode::default());
        let name = store.create_model(bounds(), None).unwrap();
        let writes = objects.write_count();

        let result = store.tell_model(&name, vec![9.0, 9.0], 1.0);

        assert!(matches!(result, Err(FarOptError::InvalidObservation(_))));
        assert_eq!(objects.write_count(), writes);
    }

    #[test]
    fn unknown_model_is_not_found() {
        let (_, store) = store(ConcurrencyMode::default());
        let result = store.ask_model(&ModelName::generate());
        assert!(matches!(result, Err(FarOptError::NotFound(_))));
    }

    #[test]
    fn concurrent_tells_last_write_wins() {
        let (_, store) = store(ConcurrencyMode::LastWriteWins);
        let name = store.create_model(bounds(), None).unwrap();

        let mut a = store.checkout(&name).unwrap();
        let mut b = store.checkout(&name).unwrap();
        a.optimizer_mut().tell(vec![0.0, 0.0], 1.0).unwrap();
        b.optimizer_mut().tell(vec![1.0, 1.0], 2.0).unwrap();
        store.commit(a).unwrap();
        store.commit(b).unwrap();

        let stored = store.load(&name).unwrap();
        assert_eq!(stored.observations().len(), 1);
        assert_eq!(stored.observations()[0].x, vec![1.0, 1.0]);
    }

    #[test]
    fn concurrent_tells_conflict_when_optimistic() {
        let (objects, store) = store(ConcurrencyMode::Optimistic);
        let name = store.create_model(bounds(), None).unwrap();

        let mut a = store.checkout(&name).unwrap();
        let mut b = store.checkout(&name).unwrap();
        a.optimizer_mut().tell(vec![0.0, 0.0], 1.0).unwrap();
        b.optimizer_mut().tell(vec![1.0, 1.0], 2.0).unwrap();
        store.commit(a).unwrap();
        let writes = objects.write_count();

        assert!(matches!(store.commit(b), Err(FarOptError::Conflict(_))));
        assert_eq!(objects.write_count(), writes);

        let stored = store.load(&name).unwrap();
        assert_eq!(stored.observations()[0].x, vec![0.0, 0.0]);
    }

    #[test]
    fn sequential_tells_succeed_when_optimistic() {
        let (_, store) = store(ConcurrencyMode::Optimistic);
        let name = store.create_model(bounds(), None).unwrap();

        for _ in 0..3 {
            let x = store.ask_model(&name).unwrap();
            store.tell_model(&name, x, 0.5).unwrap();
        }
        assert_eq!(store.load(&name).unwrap().observations().len(), 3);
    }

    #[test]
    fn list_models_reports_tags() {
        let (objects, store) = store(ConcurrencyMode::default());
        let tagged = store.create_model(bounds(), Some("rosenbrock")).unwrap();
        let untagged = store.create_model(bounds(), None).unwrap();
        objects.insert(BUCKET, "2024-01-01-job/source.zip", vec![1]);

        let mut models = store.list_models().unwrap();
        models.sort_by_key(|m| m.tag.clone());

        assert_eq!(
            models,
            vec![
                ModelSummary {
                    name: untagged,
                    tag: "none".to_string()
                },
                ModelSummary {
                    name: tagged,
                    tag: "rosenbrock".to_string()
                },
            ]
        );
    }
}
