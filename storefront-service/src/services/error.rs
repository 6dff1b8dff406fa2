use service_core::error::AppError;
use thiserror::Error;

use crate::models::CartError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Catalog lookup failed: {0}")]
    Catalog(String),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ServiceError::Conflict(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

impl From<CartError> for ServiceError {
    fn from(err: CartError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::Catalog(msg) => AppError::BadGateway(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn domain_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::not_found("Cart not found"), StatusCode::NOT_FOUND),
            (ServiceError::validation("guest cart is empty"), StatusCode::BAD_REQUEST),
            (ServiceError::conflict("already finalized"), StatusCode::CONFLICT),
            (ServiceError::Unauthorized("no token".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("not yours".into()), StatusCode::FORBIDDEN),
            (ServiceError::Catalog("timeout".into()), StatusCode::BAD_GATEWAY),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }
}
