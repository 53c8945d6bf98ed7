use crate::error::StoreError;
use crate::types::{ActorRef, DayCount, Identity};
use chrono::{DateTime, Utc};

pub trait IdentityRepository {
    fn upsert(&self, identity: &Identity) -> Result<(), StoreError>;
    fn get(&self, id: &ActorRef) -> Result<Option<Identity>, StoreError>;
    fn count(&self) -> Result<u64, StoreError>;
    fn count_approved(&self) -> Result<u64, StoreError>;
    /// UTC calendar-day buckets, oldest first, days without registrations omitted.
    fn created_per_day_since(&self, since: DateTime<Utc>) -> Result<Vec<DayCount>, StoreError>;
}
