use crate::context::RequestCapture;
use crate::routes::error::{map_error, ErrorEnvelope};
use crate::{build_tally, AppState};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tl_core::error::TallyError;
use tl_core::types::{TrackRequest, TrackResponse};
use utoipa::IntoParams;

#[derive(Debug, Default, serde::Deserialize, IntoParams)]
pub struct TrackQuery {
    /// Answer store failures with `200 {"success": false}` instead of an
    /// error status. Meant for beacon-style callers that never read replies.
    soft: Option<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analytics/track", post(track))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/analytics/track",
    params(TrackQuery),
    request_body = TrackRequest,
    responses(
        (status = 200, body = TrackResponse),
        (status = 400, body = ErrorEnvelope),
        (status = 503, body = ErrorEnvelope)
    )
)]
pub(crate) async fn track(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
    RequestCapture(ctx): RequestCapture,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Response {
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => return invalid_body(&rejection).into_response(),
    };

    if query.soft.unwrap_or(false) {
        return match build_tally(&state) {
            Ok(tally) => match tally.ingest().record_soft(input, ctx) {
                Ok(response) => Json(response).into_response(),
                Err(err) => map_error(&err).into_response(),
            },
            Err(err) => {
                tracing::debug!(error = %err, "event not accepted");
                Json(TrackResponse { success: false }).into_response()
            }
        };
    }

    match build_tally(&state).and_then(|tally| tally.ingest().record(input, ctx)) {
        Ok(event) => {
            tracing::debug!(id = %event.id, kind = %event.kind, "event accepted");
            Json(TrackResponse { success: true }).into_response()
        }
        Err(err @ TallyError::Validation(_)) => map_error(&err).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "event ingestion failed");
            map_error(&err).into_response()
        }
    }
}

fn invalid_body(rejection: &JsonRejection) -> (StatusCode, Json<ErrorEnvelope>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorEnvelope {
            success: false,
            code: "invalid_input",
            message: rejection.body_text(),
        }),
    )
}
