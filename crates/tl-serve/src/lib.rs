pub mod auth;
pub mod config;
pub mod context;
pub mod middleware;
pub mod openapi;
pub mod routes;

use crate::auth::{AuthProvider, HeaderAuth};
use crate::config::{CapturePolicy, ServeConfig};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tl_core::{Tally, TallyError};
use tl_core::error::StoreError;
use tl_db::schema;
use tl_db::store::DbStore;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub db_path: String,
    pub policy: Arc<CapturePolicy>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(db_path: impl Into<String>, policy: CapturePolicy) -> Self {
        Self {
            db_path: db_path.into(),
            policy: Arc::new(policy),
            auth: Arc::new(HeaderAuth),
        }
    }

    pub fn from_config(config: &ServeConfig) -> Self {
        Self::new(config.db_path.clone(), config.capture.clone())
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }
}

pub fn build_tally(state: &AppState) -> Result<Tally<DbStore>, TallyError> {
    let conn = schema::open_and_migrate(&state.db_path).map_err(|err| StoreError::Unavailable {
        message: err.to_string(),
    })?;
    Ok(Tally::new(DbStore::new(conn)))
}

pub fn app(state: AppState) -> Router {
    routes::router(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, db_path = %state.db_path, "analytics server listening");
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
