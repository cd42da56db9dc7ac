//! Dispatch error taxonomy

use super::WebFailure;
use crate::body::AssemblyError;
use crate::http::StatusCode;
use crate::routing::RouteError;

/// Everything that can turn a request into an error response
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Invalid route: {0}")]
    InvalidTemplate(#[from] RouteError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("No route for {0}")]
    NotFound(String),

    #[error("Not acceptable")]
    NotAcceptable,

    /// Handler error or panic; the cause is for the log only
    #[error("Internal error: {0:#}")]
    Internal(anyhow::Error),

    #[error("{0}")]
    Failure(WebFailure),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::BadRequest(_) => StatusCode::BadRequest,
            DispatchError::PayloadTooLarge(_) => StatusCode::PayloadTooLarge,
            DispatchError::NotFound(_) => StatusCode::NotFound,
            DispatchError::NotAcceptable => StatusCode::NotAcceptable,
            DispatchError::InvalidTemplate(_) | DispatchError::Internal(_) => {
                StatusCode::InternalServerError
            }
            DispatchError::Failure(failure) => failure.status,
        }
    }

    /// What the client gets to see. Internal causes are replaced by the
    /// reason phrase.
    pub fn to_failure(&self) -> WebFailure {
        match self {
            DispatchError::Failure(failure) => failure.clone(),
            DispatchError::BadRequest(message) | DispatchError::PayloadTooLarge(message) => {
                WebFailure::new(self.status(), message.clone())
            }
            DispatchError::NotFound(path) => {
                WebFailure::new(StatusCode::NotFound, format!("No route for {}", path))
            }
            DispatchError::NotAcceptable => WebFailure::new(
                StatusCode::NotAcceptable,
                "The response cannot be rendered in any accepted media type",
            ),
            DispatchError::InvalidTemplate(_) | DispatchError::Internal(_) => {
                let status = StatusCode::InternalServerError;
                WebFailure::new(status, status.reason_phrase())
            }
        }
    }
}

impl From<AssemblyError> for DispatchError {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::TooLarge { .. } => DispatchError::PayloadTooLarge(err.to_string()),
            AssemblyError::Io(io) => DispatchError::Internal(io.into()),
            other => DispatchError::BadRequest(other.to_string()),
        }
    }
}
