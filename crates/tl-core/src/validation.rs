use crate::error::ValidationError;
use crate::types::{CaptureContext, EventKind, NewEvent, TrackRequest};
use chrono::{DateTime, Utc};

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ValidationError::MissingField { field }),
    }
}

pub fn parse_kind(value: Option<&str>) -> Result<EventKind, ValidationError> {
    match value {
        None => Ok(EventKind::default()),
        Some(value) => value
            .parse::<EventKind>()
            .map_err(|err| ValidationError::UnknownKind { value: err.0 }),
    }
}

/// Turns a wire request into a storable event. `received_at` becomes
/// `occurred_at`; client clocks only ever live inside the attributes.
pub fn validate_track_request(
    request: TrackRequest,
    ctx: CaptureContext,
    received_at: DateTime<Utc>,
) -> Result<NewEvent, ValidationError> {
    let page_url = required(request.page_url, "pageUrl")?;
    let session_id = required(request.session_id, "sessionId")?;
    let kind = parse_kind(request.event_type.as_deref())?;
    Ok(NewEvent {
        page_url,
        identity: ctx.identity,
        session_id,
        network_origin: ctx.network_origin,
        client_agent: ctx.client_agent,
        kind,
        attributes: request.event_data.unwrap_or_default(),
        occurred_at: received_at,
    })
}
