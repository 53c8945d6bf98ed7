use crate::routes::error::{map_error, ErrorEnvelope};
use crate::{build_tally, AppState};
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tl_core::error::{AnalyticsError, TallyError};
use tl_core::tally::POPULAR_PAGES_LIMIT;
use tl_core::types::{ActivityPage, PageCount, SummaryStats, VisitorCount};
use utoipa::IntoParams;

#[derive(Debug, serde::Deserialize, IntoParams)]
pub struct VisitorsQuery {
    days: Option<u32>,
}

#[derive(Debug, serde::Deserialize, IntoParams)]
pub struct ActivityQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, serde::Deserialize, IntoParams)]
pub struct PopularQuery {
    limit: Option<u32>,
}

/// Proof that the caller passed the host's admin check.
pub struct Admin;

impl FromRequestParts<AppState> for Admin {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.auth.current_actor(&parts.headers).is_none() {
            return Err(map_error(&TallyError::from(AnalyticsError::Unauthenticated)).into_response());
        }
        if !state.auth.is_admin(&parts.headers) {
            return Err(map_error(&TallyError::from(AnalyticsError::Forbidden)).into_response());
        }
        Ok(Admin)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analytics/stats", get(stats))
        .route("/analytics/visitors", get(visitors))
        .route("/analytics/activity", get(activity))
        .route("/analytics/popular", get(popular))
        .with_state(state)
}

fn respond<T: serde::Serialize>(result: Result<T, TallyError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/analytics/stats",
    responses(
        (status = 200, body = SummaryStats),
        (status = 401, body = ErrorEnvelope),
        (status = 403, body = ErrorEnvelope)
    )
)]
pub(crate) async fn stats(_admin: Admin, State(state): State<AppState>) -> Response {
    respond(build_tally(&state).and_then(|tally| tally.analytics().summary()))
}

#[utoipa::path(
    get,
    path = "/analytics/visitors",
    params(VisitorsQuery),
    responses(
        (status = 200, body = VisitorCount),
        (status = 400, body = ErrorEnvelope),
        (status = 403, body = ErrorEnvelope)
    )
)]
pub(crate) async fn visitors(
    _admin: Admin,
    State(state): State<AppState>,
    Query(query): Query<VisitorsQuery>,
) -> Response {
    respond(build_tally(&state).and_then(|tally| tally.analytics().visitors(query.days)))
}

#[utoipa::path(
    get,
    path = "/analytics/activity",
    params(ActivityQuery),
    responses(
        (status = 200, body = ActivityPage),
        (status = 403, body = ErrorEnvelope)
    )
)]
pub(crate) async fn activity(
    _admin: Admin,
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Response {
    respond(
        build_tally(&state).and_then(|tally| tally.analytics().activity(query.page, query.limit)),
    )
}

#[utoipa::path(
    get,
    path = "/analytics/popular",
    params(PopularQuery),
    responses(
        (status = 200, body = Vec<PageCount>),
        (status = 403, body = ErrorEnvelope)
    )
)]
pub(crate) async fn popular(
    _admin: Admin,
    State(state): State<AppState>,
    Query(query): Query<PopularQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(POPULAR_PAGES_LIMIT);
    respond(build_tally(&state).and_then(|tally| tally.analytics().popular_pages(limit)))
}
