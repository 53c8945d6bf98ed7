use crate::storage::KeyValueStore;
use ulid::Ulid;

pub const SESSION_PREFIX: &str = "sess_";

/// Fresh session token: millisecond timestamp plus 80 random bits.
pub fn generate_session_id() -> String {
    format!("{SESSION_PREFIX}{}", Ulid::new())
}

/// Returns the persisted session id, creating and persisting one if absent.
///
/// Never fails. When storage cannot be read or written the freshly generated
/// token is returned anyway and lives only as long as the caller keeps it.
pub fn get_or_create_session_id(storage: &dyn KeyValueStore, key: &str) -> String {
    match storage.get(key) {
        Ok(Some(existing)) if !existing.trim().is_empty() => return existing,
        Ok(_) => {}
        Err(err) => {
            tracing::debug!(error = %err, "session storage unreadable, using in-memory session");
            return generate_session_id();
        }
    }
    let session_id = generate_session_id();
    if let Err(err) = storage.set(key, &session_id) {
        tracing::debug!(error = %err, "session id not persisted");
    }
    session_id
}
