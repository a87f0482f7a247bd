//! Append-only version logs.
//!
//! A version log stores every write to a keyed record as a new immutable
//! row stamped by a [`Clock`](crate::clock::Clock). Nothing is ever updated
//! in place: "delete" appends a tombstone carrying the last known payload,
//! and reads reconstruct either the current state (maximum timestamp per
//! key) or the state as of a past instant (maximum timestamp strictly below
//! the given boundary). History grows without bound; garbage collection is
//! deliberately not offered.

mod sqlite;

pub use sqlite::SqliteVersionLog;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::clock::Timestamp;
use crate::error::LedgerResult;

/// One component of a composite record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Text(String),
    Int(i64),
}

impl rusqlite::ToSql for KeyPart {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            KeyPart::Text(s) => s.to_sql(),
            KeyPart::Int(i) => i.to_sql(),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Text(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Text(s)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<u32> for KeyPart {
    fn from(i: u32) -> Self {
        KeyPart::Int(i64::from(i))
    }
}

/// Composite key identifying one record within a log.
///
/// `COLUMNS` names the key columns in order, with their SQLite column
/// types; `values` must return one [`KeyPart`] per column, in the same
/// order. A *prefix* of the column list groups records for listing (for
/// example, the device id alone selects every qubit of a device).
pub trait VersionKey: Clone + Send + Sync + std::fmt::Debug {
    /// Key columns as `(name, sql_type)` pairs, in key order.
    const COLUMNS: &'static [(&'static str, &'static str)];

    /// Key values, one per column, in column order.
    fn values(&self) -> Vec<KeyPart>;
}

/// A record type stored in a version log.
pub trait VersionRecord: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Key shape for this record.
    type Key: VersionKey;

    /// Backing table name.
    const TABLE: &'static str;

    /// The key identifying this record.
    fn key(&self) -> Self::Key;
}

/// Trait for append-only versioned storage of one record type.
#[async_trait]
pub trait VersionLog<R: VersionRecord>: Send + Sync {
    /// Append a new live version of `record`, returning the timestamp just
    /// assigned to this write. The as-of boundary is exclusive, so querying
    /// as-of the returned timestamp yields the state immediately before
    /// this write.
    async fn append(&self, record: &R) -> LedgerResult<Timestamp>;

    /// The current version of `key`, or `None` if no version exists or the
    /// latest one is a tombstone.
    async fn current(&self, key: &R::Key) -> LedgerResult<Option<R>>;

    /// The version of `key` visible strictly before `at`, or `None`.
    async fn as_of(&self, key: &R::Key, at: Timestamp) -> LedgerResult<Option<R>>;

    /// All records whose key starts with `prefix` and whose current
    /// version is live, ordered by key.
    async fn list_current(&self, prefix: &[KeyPart]) -> LedgerResult<Vec<R>>;

    /// Same grouping as [`list_current`](Self::list_current), with each
    /// group's winner chosen as of `at` (exclusive).
    async fn list_as_of(&self, prefix: &[KeyPart], at: Timestamp) -> LedgerResult<Vec<R>>;

    /// All records whose key starts with `prefix` and whose current
    /// version is a tombstone.
    async fn list_tombstoned(&self, prefix: &[KeyPart]) -> LedgerResult<Vec<R>>;

    /// Append a tombstone for `key`, copying the current payload forward so
    /// historical queries keep seeing the last known values. Returns the
    /// tombstone's timestamp (usable as the exclusive as-of boundary that
    /// recovers the pre-delete state). Fails with
    /// [`LedgerError::NotFound`](crate::error::LedgerError::NotFound) if the
    /// key has no current version.
    async fn tombstone(&self, key: &R::Key) -> LedgerResult<Timestamp>;

    /// Undo a tombstone by appending a live version carrying the last known
    /// payload. Returns `None` when the key's latest version is already
    /// live or the key has no history at all.
    async fn revive(&self, key: &R::Key) -> LedgerResult<Option<Timestamp>>;
}
