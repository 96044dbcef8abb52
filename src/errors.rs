use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("price unavailable for: {0}")]
    PriceUnavailable(String),

    #[error("order creation failed: {0}")]
    OrderCreationFailed(String),

    #[error("payment gateway misconfigured: {0}")]
    GatewayMisconfigured(String),

    #[error("payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("record persistence failed: {0}")]
    RecordPersistenceFailed(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::PriceUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::OrderCreationFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PaymentVerificationFailed(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::RecordPersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
