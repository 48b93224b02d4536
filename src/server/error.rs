use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{truncate_message, GenerationError, RagError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("index not loaded")]
    NotLoaded,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Rag(#[from] RagError),
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidBody(_) | ApiError::Rag(RagError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Rag(RagError::Generation(GenerationError::Timeout)) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ApiError::Rag(RagError::Generation(GenerationError::Unavailable)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Rag(RagError::Generation(_)) | ApiError::Rag(RagError::Embedding(_)) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Rag(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        }
        let body = Json(ErrorBody {
            error: truncate_message(&self.to_string()),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, ValidationError};

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::NotLoaded, StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::InvalidBody("EOF while parsing".into()), StatusCode::BAD_REQUEST),
            (RagError::from(ValidationError::EmptyQuery).into(), StatusCode::BAD_REQUEST),
            (RagError::from(GenerationError::Timeout).into(), StatusCode::GATEWAY_TIMEOUT),
            (
                RagError::from(GenerationError::Provider("model not found".into())).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RagError::from(EmbeddingError::Provider("connection refused".into())).into(),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }
}
