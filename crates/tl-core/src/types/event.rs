use crate::types::ids::{ActorRef, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Schema-less event detail. Stored and returned verbatim.
pub type Attributes = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[default]
    PageView,
    Login,
    Logout,
    Action,
    Registration,
    ApiCall,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::PageView,
        EventKind::Login,
        EventKind::Logout,
        EventKind::Action,
        EventKind::Registration,
        EventKind::ApiCall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Action => "action",
            Self::Registration => "registration",
            Self::ApiCall => "api_call",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// One immutable analytics record as it sits in the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub seq: i64,
    pub page_url: String,
    pub identity: Option<ActorRef>,
    pub session_id: String,
    pub network_origin: String,
    pub client_agent: String,
    pub kind: EventKind,
    #[schema(value_type = Object)]
    pub attributes: Attributes,
    pub occurred_at: DateTime<Utc>,
}

/// A validated event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub page_url: String,
    pub identity: Option<ActorRef>,
    pub session_id: String,
    pub network_origin: String,
    pub client_agent: String,
    pub kind: EventKind,
    pub attributes: Attributes,
    pub occurred_at: DateTime<Utc>,
}

/// Wire body of `POST /analytics/track`.
///
/// Every field is optional at the serde level so that missing fields surface
/// as validation errors from the ingest path instead of deserialization
/// rejections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub event_data: Option<Attributes>,
}

impl TrackRequest {
    pub fn new(kind: EventKind, page_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            page_url: Some(page_url.into()),
            session_id: Some(session_id.into()),
            event_type: Some(kind.as_str().to_string()),
            event_data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Attributes) -> Self {
        self.event_data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TrackResponse {
    pub success: bool,
}

/// Transport-level facts about who sent an event. Filled in by the server,
/// never by the client payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContext {
    pub network_origin: String,
    pub client_agent: String,
    pub identity: Option<ActorRef>,
}

impl CaptureContext {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn anonymous() -> Self {
        Self {
            network_origin: Self::UNKNOWN.to_string(),
            client_agent: Self::UNKNOWN.to_string(),
            identity: None,
        }
    }
}
