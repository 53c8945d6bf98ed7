use rusqlite::Connection;
use tl_core::store::Store;

use crate::event_repo::EventRepo;
use crate::identity_repo::IdentityRepo;

pub struct DbStore {
    conn: Connection,
}

impl DbStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for DbStore {
    type Events<'a>
        = EventRepo<'a>
    where
        Self: 'a;
    type Identities<'a>
        = IdentityRepo<'a>
    where
        Self: 'a;

    fn events(&self) -> Self::Events<'_> {
        EventRepo::new(&self.conn)
    }

    fn identities(&self) -> Self::Identities<'_> {
        IdentityRepo::new(&self.conn)
    }
}
