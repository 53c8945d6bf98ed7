use crate::error::{AnalyticsError, TallyError};
use crate::events::EventRepository;
use crate::identities::IdentityRepository;
use crate::store::Store;
use crate::types::{
    ActivityPage, CaptureContext, Event, EventKind, NewEvent, PageCount, Pagination,
    SummaryStats, TrackRequest, TrackResponse, VisitorCount, WindowCounts,
};
use crate::validation::validate_track_request;
use chrono::{DateTime, TimeDelta, Utc};

pub const DEFAULT_VISITOR_DAYS: u32 = 7;
pub const MAX_WINDOW_DAYS: u32 = 3650;
pub const POPULAR_WINDOW_DAYS: u32 = 7;
pub const POPULAR_PAGES_LIMIT: u32 = 10;
pub const NEW_USERS_WINDOW_DAYS: u32 = 30;
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
pub const MAX_ACTIVITY_LIMIT: u32 = 100;

pub struct Tally<S: Store> {
    store: S,
}

impl<S: Store> Tally<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn ingest(&self) -> IngestApi<'_, S> {
        IngestApi { core: self }
    }

    pub fn analytics(&self) -> AnalyticsApi<'_, S> {
        AnalyticsApi { core: self }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

pub struct IngestApi<'a, S: Store> {
    core: &'a Tally<S>,
}

impl<'a, S: Store> IngestApi<'a, S> {
    /// Direct ingestion. Validation and store failures come back as errors so
    /// the caller can tell a bad event from an unavailable store.
    pub fn record(&self, request: TrackRequest, ctx: CaptureContext) -> Result<Event, TallyError> {
        let event = validate_track_request(request, ctx, Utc::now())?;
        self.append(event)
    }

    pub fn append(&self, event: NewEvent) -> Result<Event, TallyError> {
        Ok(self.core.store.events().append(event)?)
    }

    /// Beacon-style ingestion. A malformed event is still an error; a store
    /// failure collapses into `success: false`.
    pub fn record_soft(
        &self,
        request: TrackRequest,
        ctx: CaptureContext,
    ) -> Result<TrackResponse, TallyError> {
        let event = validate_track_request(request, ctx, Utc::now())?;
        Ok(TrackResponse {
            success: self.append(event).is_ok(),
        })
    }
}

pub struct AnalyticsApi<'a, S: Store> {
    core: &'a Tally<S>,
}

impl<'a, S: Store> AnalyticsApi<'a, S> {
    pub fn summary(&self) -> Result<SummaryStats, TallyError> {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> Result<SummaryStats, TallyError> {
        let events = self.core.store.events();
        let identities = self.core.store.identities();
        let day = window_start(now, 1)?;
        let week = window_start(now, 7)?;
        let month = window_start(now, 30)?;

        let unique_visitors = WindowCounts {
            day: events.distinct_sessions_since(day)?,
            week: events.distinct_sessions_since(week)?,
            month: events.distinct_sessions_since(month)?,
        };
        let active_users = WindowCounts {
            day: events.distinct_identities_since(day)?,
            week: events.distinct_identities_since(week)?,
            month: events.distinct_identities_since(month)?,
        };

        Ok(SummaryStats {
            total_users: identities.count()?,
            approved_users: identities.count_approved()?,
            total_page_views: events.count_kind(EventKind::PageView)?,
            unique_visitors,
            active_users,
            popular_pages: self.popular_pages_at(now, POPULAR_PAGES_LIMIT)?,
            new_users_by_day: identities
                .created_per_day_since(window_start(now, NEW_USERS_WINDOW_DAYS)?)?,
        })
    }

    pub fn popular_pages(&self, limit: u32) -> Result<Vec<PageCount>, TallyError> {
        self.popular_pages_at(Utc::now(), limit)
    }

    pub fn popular_pages_at(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PageCount>, TallyError> {
        let since = window_start(now, POPULAR_WINDOW_DAYS)?;
        let limit = limit.clamp(1, MAX_ACTIVITY_LIMIT);
        Ok(self
            .core
            .store
            .events()
            .top_pages_since(EventKind::PageView, since, limit)?)
    }

    pub fn visitors(&self, days: Option<u32>) -> Result<VisitorCount, TallyError> {
        self.visitors_at(Utc::now(), days)
    }

    pub fn visitors_at(
        &self,
        now: DateTime<Utc>,
        days: Option<u32>,
    ) -> Result<VisitorCount, TallyError> {
        let days = days.unwrap_or(DEFAULT_VISITOR_DAYS);
        let start_date = window_start(now, days)?;
        let count = self
            .core
            .store
            .events()
            .distinct_sessions_since(start_date)?;
        Ok(VisitorCount {
            count,
            period: format!("{days} days"),
            start_date,
        })
    }

    pub fn activity(&self, page: Option<u32>, limit: Option<u32>) -> Result<ActivityPage, TallyError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT);
        let events = self.core.store.events();
        let total = events.count()?;
        let offset = u64::from(page - 1) * u64::from(limit);
        let activities = if offset >= total {
            Vec::new()
        } else {
            events.recent(offset, limit)?
        };
        Ok(ActivityPage {
            activities,
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(u64::from(limit)),
            },
        })
    }
}

fn window_start(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, TallyError> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(AnalyticsError::InvalidQuery {
            message: format!("days must be between 1 and {MAX_WINDOW_DAYS}"),
        }
        .into());
    }
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(|| {
            AnalyticsError::InvalidQuery {
                message: format!("window of {days} days is out of range"),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_start_subtracts_whole_days() {
        let now = Utc::now();
        assert_eq!(window_start(now, 7).unwrap(), now - TimeDelta::days(7));
    }

    #[test]
    fn window_start_rejects_zero_and_huge_windows() {
        assert!(matches!(
            window_start(Utc::now(), 0),
            Err(TallyError::Analytics(AnalyticsError::InvalidQuery { .. }))
        ));
        assert!(window_start(Utc::now(), MAX_WINDOW_DAYS + 1).is_err());
    }
}
