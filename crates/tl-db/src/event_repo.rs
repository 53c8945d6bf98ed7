use crate::util::{decode_json, encode_json, from_rfc3339, query_error, to_count, to_rfc3339, DbError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tl_core::error::StoreError;
use tl_core::events::EventRepository;
use tl_core::types::{
    ActivityEntry, ActorRef, Event, EventId, EventKind, IdentityProjection, NewEvent, PageCount,
};

const EVENT_COLUMNS: &str = "e.seq, e.id, e.page_url, e.identity_id, e.session_id, e.network_origin, \
     e.client_agent, e.kind, e.attributes_json, e.occurred_at";

pub struct EventRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> EventRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn scalar(&self, sql: &str, params: impl rusqlite::Params) -> Result<u64, StoreError> {
        let value: i64 = self
            .conn
            .query_row(sql, params, |row| row.get(0))
            .map_err(query_error)?;
        Ok(to_count(value))
    }
}

impl<'a> EventRepository for EventRepo<'a> {
    fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        let id = EventId::generate();
        let occurred_at = to_rfc3339(&event.occurred_at);
        let sql = "INSERT INTO events (id, page_url, identity_id, session_id, network_origin, client_agent, kind, attributes_json, occurred_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
        self.conn
            .execute(
                sql,
                params![
                    id.as_str(),
                    event.page_url,
                    event.identity.as_ref().map(ActorRef::as_str),
                    event.session_id,
                    event.network_origin,
                    event.client_agent,
                    event.kind.as_str(),
                    encode_json(&event.attributes)?,
                    occurred_at,
                ],
            )
            .map_err(query_error)?;
        let seq = self.conn.last_insert_rowid();
        Ok(Event {
            id,
            seq,
            page_url: event.page_url,
            identity: event.identity,
            session_id: event.session_id,
            network_origin: event.network_origin,
            client_agent: event.client_agent,
            kind: event.kind,
            attributes: event.attributes,
            occurred_at: from_rfc3339(&occurred_at)?,
        })
    }

    fn count(&self) -> Result<u64, StoreError> {
        self.scalar("SELECT COUNT(*) FROM events", [])
    }

    fn count_kind(&self, kind: EventKind) -> Result<u64, StoreError> {
        self.scalar(
            "SELECT COUNT(*) FROM events WHERE kind = ?1",
            [kind.as_str()],
        )
    }

    fn distinct_sessions_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        self.scalar(
            "SELECT COUNT(DISTINCT session_id) FROM events WHERE occurred_at >= ?1",
            [to_rfc3339(&since)],
        )
    }

    fn distinct_identities_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        self.scalar(
            "SELECT COUNT(DISTINCT identity_id) FROM events WHERE identity_id IS NOT NULL AND occurred_at >= ?1",
            [to_rfc3339(&since)],
        )
    }

    fn top_pages_since(
        &self,
        kind: EventKind,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PageCount>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT page_url, COUNT(*) AS hits, MIN(seq) AS first_seq FROM events \
                 WHERE kind = ?1 AND occurred_at >= ?2 \
                 GROUP BY page_url ORDER BY hits DESC, first_seq ASC LIMIT ?3",
            )
            .map_err(query_error)?;
        let mut rows = stmt
            .query(params![kind.as_str(), to_rfc3339(&since), limit])
            .map_err(query_error)?;
        let mut pages = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let page_url: String = row.get(0).map_err(query_error)?;
            let hits: i64 = row.get(1).map_err(query_error)?;
            pages.push(PageCount {
                page_url,
                count: to_count(hits),
            });
        }
        Ok(pages)
    }

    fn recent(&self, offset: u64, limit: u32) -> Result<Vec<ActivityEntry>, StoreError> {
        let offset = i64::try_from(offset).map_err(|_| StoreError::Query {
            message: format!("offset {offset} out of range"),
        })?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS}, i.id, i.username, i.display_name, i.avatar_url \
             FROM events e LEFT JOIN identities i ON i.id = e.identity_id \
             ORDER BY e.occurred_at DESC, e.seq DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(query_error)?;
        let mut rows = stmt.query(params![limit, offset]).map_err(query_error)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let event = map_event_row(row)?;
            let user = map_projection(row, 10)?;
            entries.push(ActivityEntry { event, user });
        }
        Ok(entries)
    }
}

fn map_event_row(row: &rusqlite::Row<'_>) -> Result<Event, StoreError> {
    let id: String = row.get(1).map_err(query_error)?;
    let identity: Option<String> = row.get(3).map_err(query_error)?;
    let kind: String = row.get(7).map_err(query_error)?;
    let attributes: String = row.get(8).map_err(query_error)?;
    let occurred_at: String = row.get(9).map_err(query_error)?;

    Ok(Event {
        id: EventId::new(id).map_err(|err| DbError::InvalidId {
            message: err.to_string(),
        })?,
        seq: row.get(0).map_err(query_error)?,
        page_url: row.get(2).map_err(query_error)?,
        identity: identity
            .map(ActorRef::new)
            .transpose()
            .map_err(|err| DbError::InvalidId {
                message: err.to_string(),
            })?,
        session_id: row.get(4).map_err(query_error)?,
        network_origin: row.get(5).map_err(query_error)?,
        client_agent: row.get(6).map_err(query_error)?,
        kind: kind
            .parse::<EventKind>()
            .map_err(|_| DbError::InvalidEnum { value: kind.clone() })?,
        attributes: decode_json(&attributes)?,
        occurred_at: from_rfc3339(&occurred_at)?,
    })
}

fn map_projection(
    row: &rusqlite::Row<'_>,
    start: usize,
) -> Result<Option<IdentityProjection>, StoreError> {
    let id: Option<String> = row.get(start).map_err(query_error)?;
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(Some(IdentityProjection {
        id: ActorRef::new(id).map_err(|err| DbError::InvalidId {
            message: err.to_string(),
        })?,
        username: row.get(start + 1).map_err(query_error)?,
        display_name: row.get(start + 2).map_err(query_error)?,
        avatar_url: row.get(start + 3).map_err(query_error)?,
    }))
}
