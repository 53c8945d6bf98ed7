use crate::routes::error::ErrorEnvelope;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tl_core::types::{
    ActivityEntry, ActivityPage, ActorRef, DayCount, Event, EventId, EventKind,
    IdentityProjection, PageCount, Pagination, SummaryStats, TrackRequest, TrackResponse,
    VisitorCount, WindowCounts,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::track::track,
        crate::routes::analytics::stats,
        crate::routes::analytics::visitors,
        crate::routes::analytics::activity,
        crate::routes::analytics::popular
    ),
    components(schemas(
        TrackRequest,
        TrackResponse,
        Event,
        EventId,
        EventKind,
        ActorRef,
        SummaryStats,
        WindowCounts,
        PageCount,
        DayCount,
        VisitorCount,
        ActivityPage,
        ActivityEntry,
        Pagination,
        IdentityProjection,
        ErrorEnvelope
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
