//! Rumor Intel Store
//!
//! SQLite-backed persistence for the rumor engine:
//! - `betis_news` rumors with moderation and analysis state
//! - `players` identities with aliases and denormalized rumor counts
//! - `news_players` junction rows linking the two
//!
//! Multi-row changes (hide, merge, link) run inside one transaction.

pub mod cursor;
pub mod links;
pub mod players;
pub mod rumors;
pub mod schema;

pub use cursor::*;
pub use links::*;
pub use players::*;
pub use rumors::*;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rumor_core::{PlayerLimits, RumorError};
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction};
use tracing::info;

/// Handle to the rumor database
pub struct RumorStore {
    conn: Mutex<Connection>,
    limits: PlayerLimits,
}

impl RumorStore {
    /// Open (creating if needed) a database file
    pub fn open(path: &Path, limits: PlayerLimits) -> Result<Self, RumorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                RumorError::Store(format!("cannot create {}: {}", parent.display(), err))
            })?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(store_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        info!("Opened rumor store at {}", path.display());
        Self::with_connection(conn, limits)
    }

    /// Private in-memory database
    pub fn open_in_memory(limits: PlayerLimits) -> Result<Self, RumorError> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::with_connection(conn, limits)
    }

    fn with_connection(conn: Connection, limits: PlayerLimits) -> Result<Self, RumorError> {
        conn.pragma_update(None, "foreign_keys", true).map_err(store_err)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            limits,
        })
    }

    pub fn limits(&self) -> &PlayerLimits {
        &self.limits
    }

    /// Run a read-only closure on the connection
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, RumorError>,
    ) -> Result<T, RumorError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run a closure inside a transaction, committing only on success
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, RumorError>,
    ) -> Result<T, RumorError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(store_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(store_err)?;
        Ok(out)
    }
}

pub(crate) fn store_err(err: rusqlite::Error) -> RumorError {
    RumorError::Store(err.to_string())
}

/// Timestamps are stored as integer microseconds since the epoch
pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        conversion_err(
            idx,
            Type::Integer,
            RumorError::Store(format!("timestamp out of range: {}", micros)),
        )
    })
}

pub(crate) fn opt_from_micros(
    idx: usize,
    micros: Option<i64>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    micros.map(|m| from_micros(idx, m)).transpose()
}

pub(crate) fn conversion_err(idx: usize, ty: Type, err: RumorError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}
