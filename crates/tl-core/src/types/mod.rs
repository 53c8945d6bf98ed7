pub mod analytics;
pub mod event;
pub mod identity;
pub mod ids;

pub use analytics::{
    ActivityEntry, ActivityPage, DayCount, PageCount, Pagination, SummaryStats, VisitorCount,
    WindowCounts,
};
pub use event::{
    Attributes, CaptureContext, Event, EventKind, NewEvent, TrackRequest, TrackResponse,
    UnknownEventKind,
};
pub use identity::{Identity, IdentityProjection};
pub use ids::{ActorRef, EventId, IdError};
