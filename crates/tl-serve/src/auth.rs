use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use tl_core::types::ActorRef;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ROLE_HEADER: &str = "x-actor-role";
pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE: &str = "tally_sid";

/// The host application's session and authorization system, seen from the
/// analytics side. Implementations must not fail: anything they cannot
/// resolve is reported as absent.
pub trait AuthProvider: Send + Sync {
    fn current_actor(&self, headers: &HeaderMap) -> Option<ActorRef>;
    fn is_admin(&self, headers: &HeaderMap) -> bool;
    fn session_id(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts identity headers set by an authenticating reverse proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderAuth;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

impl AuthProvider for HeaderAuth {
    fn current_actor(&self, headers: &HeaderMap) -> Option<ActorRef> {
        header_str(headers, ACTOR_HEADER).and_then(|value| ActorRef::new(value).ok())
    }

    fn is_admin(&self, headers: &HeaderMap) -> bool {
        self.current_actor(headers).is_some()
            && header_str(headers, ROLE_HEADER)
                .is_some_and(|role| role.eq_ignore_ascii_case("admin"))
    }

    fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        header_str(headers, SESSION_HEADER)
            .map(ToString::to_string)
            .or_else(|| cookie_value(headers, SESSION_COOKIE))
    }
}
