use crate::types::ids::ActorRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Record owned by the host's identity store. Analytics only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: ActorRef,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Display-only projection attached to activity entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProjection {
    pub id: ActorRef,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<&Identity> for IdentityProjection {
    fn from(value: &Identity) -> Self {
        Self {
            id: value.id.clone(),
            username: value.username.clone(),
            display_name: value.display_name.clone(),
            avatar_url: value.avatar_url.clone(),
        }
    }
}
