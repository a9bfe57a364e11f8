use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Одно нарушение валидации; в ответе собираются все сразу,
/// а не только первое.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// Ошибки хранилища броней.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// На месте уже есть активная (pending/confirmed) бронь.
    #[error("seat {seat_id} already has an active booking")]
    SeatConflict { seat_id: String },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.into())
    }
}

/// Доменные ошибки сервиса броней; HTTP-слой переводит их в статусы
/// один-в-один, внутренности наружу не утекают.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("seat {seat_id} is unavailable")]
    SeatUnavailable { seat_id: String },
    #[error("booking {id} not found")]
    NotFound { id: String },
    #[error("admin authorization required")]
    Unauthorized,
    #[error("infrastructure error: {0}")]
    Infrastructure(anyhow::Error),
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        match self {
            DomainError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "validation failed", "fields": fields })),
            )
                .into_response(),
            DomainError::SeatUnavailable { seat_id } => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "seat unavailable", "seatId": seat_id })),
            )
                .into_response(),
            DomainError::NotFound { id } => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "booking not found", "id": id })),
            )
                .into_response(),
            DomainError::Unauthorized => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "admin authorization required" })),
            )
                .into_response(),
            DomainError::Infrastructure(e) => {
                tracing::error!("infrastructure error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
