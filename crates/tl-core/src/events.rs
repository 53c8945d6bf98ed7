use crate::error::StoreError;
use crate::types::{ActivityEntry, Event, EventKind, NewEvent, PageCount};
use chrono::{DateTime, Utc};

/// Append-only access to stored events. There is deliberately no update or
/// delete method.
pub trait EventRepository {
    fn append(&self, event: NewEvent) -> Result<Event, StoreError>;
    fn count(&self) -> Result<u64, StoreError>;
    fn count_kind(&self, kind: EventKind) -> Result<u64, StoreError>;
    fn distinct_sessions_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError>;
    fn distinct_identities_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError>;
    fn top_pages_since(
        &self,
        kind: EventKind,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PageCount>, StoreError>;
    /// Newest first, `seq` breaking ties between equal timestamps.
    fn recent(&self, offset: u64, limit: u32) -> Result<Vec<ActivityEntry>, StoreError>;
}
