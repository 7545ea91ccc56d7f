//! Remotely persisted ask/tell optimizers.

mod bounds;
mod gp;
mod optimizer;
mod store;

pub use bounds::{Bounds, Dimension};
pub use optimizer::{
    Acquisition, AcquisitionOptimizer, InitialDesign, Observation, Optimizer, OptimizerSettings,
};
pub use store::{ModelCheckout, ModelStore, ModelSummary};
