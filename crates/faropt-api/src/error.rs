pub use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use strum::Display;
use thiserror::Error;

#[derive(Clone, Debug, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ApiErrorCode {
    /// The stack exists but is still being created or updated.
    StackNotReady,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
pub struct ApiErrorBody {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiErrorBody {
    /// Decode an error response body. Bodies that are not a FarOpt error keep their text as
    /// the message.
    pub(crate) fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| ApiErrorBody {
            code: ApiErrorCode::Unknown,
            message: text.to_string(),
        })
    }
}

impl Display for ApiErrorBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Code: {}, Message: {}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Resource not found")]
    NotFound,
    #[error("Unauthorized access")]
    Unauthorized,
    #[error("Forbidden access")]
    Forbidden,
    #[error("Precondition failed: the resource was modified concurrently")]
    PreconditionFailed,
    #[error("Request timed out")]
    Timeout,
    #[error("Internal server error")]
    InternalServerError,
    #[error("Api error {status}: {body}")]
    ApiError {
        status: StatusCode,
        body: ApiErrorBody,
    },
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown Error: {0}")]
    UnknownError(String),
}

impl ClientError {
    pub fn code(&self) -> Option<ApiErrorCode> {
        match self {
            ClientError::ApiError { body, .. } => Some(body.code.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_with_known_code() {
        let body =
            ApiErrorBody::parse(r#"{"code":"STACK_NOT_READY","message":"UPDATE_IN_PROGRESS"}"#);
        assert_eq!(body.code, ApiErrorCode::StackNotReady);

        let error = ClientError::ApiError {
            status: StatusCode::CONFLICT,
            body,
        };
        assert_eq!(error.code(), Some(ApiErrorCode::StackNotReady));
    }

    #[test]
    fn error_body_with_unknown_code_or_plain_text() {
        let body = ApiErrorBody::parse(r#"{"code":"SOMETHING_NEW","message":"m"}"#);
        assert_eq!(body.code, ApiErrorCode::Unknown);
        assert_eq!(body.message, "m");

        let body = ApiErrorBody::parse("<html>Bad Gateway</html>");
        assert_eq!(body.code, ApiErrorCode::Unknown);
        assert_eq!(body.message, "<html>Bad Gateway</html>");
        assert_eq!(ClientError::Timeout.code(), None);
    }
}
