pub mod analytics;
pub mod error;
pub mod health;
pub mod track;

use crate::middleware::capture::CaptureLayer;
use crate::{openapi, AppState};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(track::router(state.clone()))
        .merge(analytics::router(state.clone()))
        .merge(health::router())
        .merge(openapi::router())
        .layer(CaptureLayer::new(state))
        .layer(TraceLayer::new_for_http())
}
