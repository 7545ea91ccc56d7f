//! Job and model lifecycle orchestration for FarOpt.
//!
//! A [`JobHandle`] packages a source tree, submits it to the macro (container task) or micro
//! (synchronous function) backend, and follows it through status, logs and outputs. A
//! [`ModelStore`] keeps named ask/tell optimizers in the object store.
//!
//! Everything starts from a [`FarOpt`] context:
//!
//! ```no_run
//! use faropt_core::{BackendKind, CancellationToken, FarOpt, FarOptConfig};
//!
//! # fn main() -> Result<(), faropt_core::FarOptError> {
//! let faropt = FarOpt::connect(FarOptConfig::default().apply_env())?;
//! let mut job = faropt.job();
//! job.configure("./my-optimization")?;
//! job.submit(BackendKind::Macro)?;
//! job.wait(&CancellationToken::new())?;
//! for event in job.stream_logs(None, 0)? {
//!     println!("{}", event?.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cancellable;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod job;
pub mod layout;
pub mod model;
pub mod registry;

mod context;

pub use backend::Services;
pub use backend::memory;
pub use cancellable::CancellationToken;
pub use config::{ConcurrencyMode, FarOptConfig, FarOptConfigBuilder};
pub use context::FarOpt;
pub use dispatch::{BackendKind, Execution, MicroOutcome};
pub use error::FarOptError;
pub use ids::{JobId, ModelName, RecipeId};
pub use job::{DEFAULT_METRIC_WINDOW, JobHandle, JobState, LogEvent, LogStream};
pub use model::{Bounds, ModelStore, ModelSummary, Observation, Optimizer};
pub use registry::{JobRecord, RecipeRecord};
