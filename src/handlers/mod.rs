pub mod static_files;

use crate::config::LocationConfig;
use crate::http::{HttpRequest, Response, StatusCode};
use thiserror::Error;

pub use static_files::StaticFileHandler;

/// Per-request failures. The engine turns these into error pages and keeps
/// running; they never reach the process level.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Bad Request")]
    BadRequest,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("Internal Server Error")]
    Internal,
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest => StatusCode::BAD_REQUEST,
            HandlerError::Forbidden => StatusCode::FORBIDDEN,
            HandlerError::NotFound => StatusCode::NOT_FOUND,
            HandlerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            HandlerError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Produces the response for a request that already resolved to `location`.
pub trait RequestHandler {
    fn handle(&self, request: &HttpRequest, location: &LocationConfig) -> Result<Response, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&HttpRequest, &LocationConfig) -> Result<Response, HandlerError>,
{
    fn handle(&self, request: &HttpRequest, location: &LocationConfig) -> Result<Response, HandlerError> {
        self(request, location)
    }
}
