use axum::http::StatusCode;
use metrond_common::metric::{MetricError, MetricType};
use metrond_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] MetricError),

    #[error("metric not found: id={id}, type={mtype}")]
    NotFound { id: String, mtype: MetricType },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Error kinds map to status codes; messages never reach the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
