use crate::config::CapturePolicy;
use crate::context::capture_context;
use crate::{build_tally, AppState};
use axum::body::Body;
use axum::extract::Query;
use axum::http::header::REFERER;
use axum::http::{Method, Request};
use axum::response::Response;
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::task::{Context, Poll};
use tl_core::types::{Attributes, CaptureContext, EventKind, NewEvent};
use tower::{Layer, Service};

/// Records inbound requests as analytics events without ever touching the
/// request or the response.
#[derive(Clone)]
pub struct CaptureLayer {
    state: AppState,
}

impl CaptureLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[derive(Clone)]
pub struct CaptureService<S> {
    inner: S,
    state: AppState,
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            state: self.state.clone(),
        }
    }
}

impl<S> Service<Request<Body>> for CaptureService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if let Some(event) = synthesize(&self.state, &request) {
            submit_detached(self.state.clone(), event);
        }
        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

/// Decides whether a request is recorded, and as which kind.
pub fn classify(policy: &CapturePolicy, method: &Method, path: &str) -> Option<EventKind> {
    if method == Method::OPTIONS || policy.is_ignored(path) {
        return None;
    }
    if policy.is_api(path) {
        policy.track_api_calls.then_some(EventKind::ApiCall)
    } else {
        policy.track_page_views.then_some(EventKind::PageView)
    }
}

fn synthesize(state: &AppState, request: &Request<Body>) -> Option<NewEvent> {
    let path = request.uri().path();
    let kind = classify(&state.policy, request.method(), path)?;
    let headers = request.headers();
    let ctx = capture_context(state, headers, request.extensions());
    let session_id = state
        .auth
        .session_id(headers)
        .unwrap_or_else(|| anonymous_session(&ctx));

    let mut attributes = Attributes::new();
    attributes.insert(
        "method".to_string(),
        Value::String(request.method().to_string()),
    );
    attributes.insert(
        "referrer".to_string(),
        headers
            .get(REFERER)
            .and_then(|value| value.to_str().ok())
            .map_or(Value::Null, |value| Value::String(value.to_string())),
    );
    let query = Query::<BTreeMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .unwrap_or_default();
    attributes.insert(
        "query".to_string(),
        Value::Object(
            query
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        ),
    );

    Some(NewEvent {
        page_url: path.to_string(),
        identity: ctx.identity,
        session_id,
        network_origin: ctx.network_origin,
        client_agent: ctx.client_agent,
        kind,
        attributes,
        occurred_at: Utc::now(),
    })
}

/// Stable stand-in for requests that carry no session: same origin and agent
/// map to the same pseudo-session.
fn anonymous_session(ctx: &CaptureContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ctx.network_origin.as_bytes());
    hasher.update(b"|");
    hasher.update(ctx.client_agent.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("anon_{}", &digest[..24])
}

fn submit_detached(state: AppState, event: NewEvent) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        report("no runtime available for capture");
        return;
    };
    handle.spawn(async move {
        let page_url = event.page_url.clone();
        let result = tokio::task::spawn_blocking(move || {
            build_tally(&state).and_then(|tally| tally.ingest().append(event))
        })
        .await;
        match result {
            Ok(Ok(stored)) => tracing::trace!(id = %stored.id, "captured request"),
            Ok(Err(err)) => report(&format!("capture of {page_url} not accepted: {err}")),
            Err(err) => report(&format!("capture task for {page_url} failed: {err}")),
        }
    });
}

fn report(message: &str) {
    if cfg!(debug_assertions) {
        tracing::warn!("{message}");
    }
}
