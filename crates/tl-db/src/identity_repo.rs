use crate::util::{from_rfc3339, query_error, to_count, to_rfc3339, DbError};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tl_core::error::StoreError;
use tl_core::identities::IdentityRepository;
use tl_core::types::{ActorRef, DayCount, Identity};

pub struct IdentityRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> IdentityRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> IdentityRepository for IdentityRepo<'a> {
    fn upsert(&self, identity: &Identity) -> Result<(), StoreError> {
        let sql = "INSERT INTO identities (id, username, display_name, avatar_url, approved, created_at) \
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                   ON CONFLICT(id) DO UPDATE SET username = excluded.username, \
                   display_name = excluded.display_name, avatar_url = excluded.avatar_url, \
                   approved = excluded.approved";
        self.conn
            .execute(
                sql,
                params![
                    identity.id.as_str(),
                    identity.username,
                    identity.display_name,
                    identity.avatar_url,
                    identity.approved,
                    to_rfc3339(&identity.created_at),
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn get(&self, id: &ActorRef) -> Result<Option<Identity>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, username, display_name, avatar_url, approved, created_at FROM identities WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(query_error)?;
        let Some((id, username, display_name, avatar_url, approved, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Identity {
            id: ActorRef::new(id).map_err(|err| DbError::InvalidId {
                message: err.to_string(),
            })?,
            username,
            display_name,
            avatar_url,
            approved,
            created_at: from_rfc3339(&created_at)?,
        }))
    }

    fn count(&self) -> Result<u64, StoreError> {
        let value: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .map_err(query_error)?;
        Ok(to_count(value))
    }

    fn count_approved(&self) -> Result<u64, StoreError> {
        let value: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM identities WHERE approved = 1",
                [],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        Ok(to_count(value))
    }

    fn created_per_day_since(&self, since: DateTime<Utc>) -> Result<Vec<DayCount>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT substr(created_at, 1, 10) AS day, COUNT(*) FROM identities \
                 WHERE created_at >= ?1 GROUP BY day ORDER BY day ASC",
            )
            .map_err(query_error)?;
        let mut rows = stmt.query([to_rfc3339(&since)]).map_err(query_error)?;
        let mut days = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let day: String = row.get(0).map_err(query_error)?;
            let count: i64 = row.get(1).map_err(query_error)?;
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|_| DbError::InvalidTimestamp { value: day.clone() })?;
            days.push(DayCount {
                date,
                count: to_count(count),
            });
        }
        Ok(days)
    }
}
