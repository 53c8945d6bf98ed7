use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tl_core::error::{AnalyticsError, StoreError, TallyError, ValidationError};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
}

pub fn map_error(err: &TallyError) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code, message) = match err {
        TallyError::Validation(validation) => map_validation_error(validation),
        TallyError::Store(store) => map_store_error(store),
        TallyError::Analytics(analytics) => map_analytics_error(analytics),
        TallyError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            message.clone(),
        ),
    };

    (
        status,
        Json(ErrorEnvelope {
            success: false,
            code,
            message,
        }),
    )
}

fn map_validation_error(err: &ValidationError) -> (StatusCode, &'static str, String) {
    (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
}

fn map_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::Unavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            err.to_string(),
        ),
        StoreError::Query { .. } | StoreError::Decode { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            err.to_string(),
        ),
    }
}

fn map_analytics_error(err: &AnalyticsError) -> (StatusCode, &'static str, String) {
    match err {
        AnalyticsError::Unauthenticated => {
            (StatusCode::UNAUTHORIZED, "unauthenticated", err.to_string())
        }
        AnalyticsError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", err.to_string()),
        AnalyticsError::InvalidQuery { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_query", err.to_string())
        }
    }
}
