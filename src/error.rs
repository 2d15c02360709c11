use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::gateway::GatewayError;
use crate::models::ValidationError;
use crate::ownership::OwnershipDenied;
use crate::sync::SyncError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] NotFound(String),
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] Conflict(String),
    #[error("{0}")] Unavailable(String),
    #[error("internal error")] Internal,
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotFound(..) => ApiError::NotFound(e.to_string()),
            SyncError::QuestionResolved(_) => ApiError::Conflict(e.to_string()),
            SyncError::Invalid(v) => v.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<OwnershipDenied> for ApiError {
    fn from(e: OwnershipDenied) -> Self {
        ApiError::Forbidden(e.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unconfigured | GatewayError::Unavailable(_) => ApiError::Unavailable(e.to_string()),
            GatewayError::Rejected(_) if e.is_permission_denied() => ApiError::Forbidden(e.to_string()),
            GatewayError::Rejected(_) => ApiError::Internal,
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
