use faropt_api::ClientError;
use faropt_api::error::ApiErrorCode;
use faropt_api::schemas::TaskStatus;
use faropt_package::PackageError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum FarOptError {
    /// An operation was invoked out of the required state order.
    #[error("Cannot {operation}: job is {actual}, expected {required}")]
    InvalidState {
        operation: &'static str,
        required: &'static str,
        actual: &'static str,
    },
    #[error("FarOpt backend is not ready: {0}")]
    NotReady(String),
    #[error("Backend error: {0}")]
    Backend(ClientError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
    #[error("Conflict: {0} was modified concurrently")]
    Conflict(String),
    #[error("Dispatch rejected: {0}")]
    Dispatch(String),
    #[error("Logs are not available while the task is {0}")]
    LogsUnavailable(TaskStatus),
    #[error("Operation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error("Model encoding error: {0}")]
    ModelEncoding(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ClientError> for FarOptError {
    fn from(error: ClientError) -> Self {
        match error {
            ref e if e.code() == Some(ApiErrorCode::StackNotReady) => {
                FarOptError::NotReady(e.to_string())
            }
            ClientError::NotFound => FarOptError::NotFound("remote resource".to_string()),
            ClientError::PreconditionFailed => FarOptError::Conflict("remote object".to_string()),
            other => FarOptError::Backend(other),
        }
    }
}

impl From<std::convert::Infallible> for FarOptError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl From<rmp_serde::encode::Error> for FarOptError {
    fn from(error: rmp_serde::encode::Error) -> Self {
        FarOptError::ModelEncoding(error.to_string())
    }
}

impl From<rmp_serde::decode::Error> for FarOptError {
    fn from(error: rmp_serde::decode::Error) -> Self {
        FarOptError::ModelEncoding(error.to_string())
    }
}

impl FarOptError {
    /// Errors caused by calling an operation in the wrong order or with a bad setup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FarOptError::InvalidState { .. } | FarOptError::NotReady(_) | FarOptError::Config(_)
        )
    }

    /// Errors from the remote services. Nothing in this crate retries them.
    pub fn is_transient(&self) -> bool {
        matches!(self, FarOptError::Backend(_) | FarOptError::Dispatch(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FarOptError::NotFound(_))
    }
}

/// Log an error before handing it back to the caller.
pub(crate) trait LogErr {
    fn log_err(self, context: &str) -> Self;
}

impl<T, E: std::fmt::Display> LogErr for Result<T, E> {
    fn log_err(self, context: &str) -> Self {
        if let Err(e) = &self {
            log::error!("{context}: {e}");
        }
        self
    }
}
