//! SQLite-backed version log.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::debug;

use crate::clock::{Clock, Timestamp};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{KeyPart, VersionKey, VersionLog, VersionRecord};

/// Append-only version log persisted in SQLite.
///
/// Rows are `(key columns..., timestamp, data, archived)` with a primary
/// key over all key columns plus the timestamp, and an index on the key
/// columns alone to speed up the max-timestamp-per-key grouping. Record
/// payloads are stored as JSON in the `data` column; only the fields that
/// queries filter on get columns of their own.
///
/// Several logs may share one connection; the mutex serializes all access,
/// which together with the clock's strict monotonicity linearizes writes
/// per key. The lock is never held across an await point.
pub struct SqliteVersionLog<R: VersionRecord> {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    _record: PhantomData<fn() -> R>,
}

impl<R: VersionRecord> SqliteVersionLog<R> {
    /// Create a log over an existing connection, initializing the table
    /// and index if they do not exist yet.
    pub fn new(conn: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> LedgerResult<Self> {
        let log = Self {
            conn,
            clock,
            _record: PhantomData,
        };
        log.init_schema()?;
        Ok(log)
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LedgerError::Database(e.to_string()))
    }

    fn key_columns() -> Vec<&'static str> {
        R::Key::COLUMNS.iter().map(|(name, _)| *name).collect()
    }

    fn init_schema(&self) -> LedgerResult<()> {
        let conn = self.lock()?;
        let column_defs: Vec<String> = R::Key::COLUMNS
            .iter()
            .map(|(name, sql_type)| format!("{name} {sql_type} NOT NULL"))
            .collect();
        let key_cols = Self::key_columns().join(", ");
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                {columns},
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY ({key_cols}, timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_key ON {table}({key_cols});
            "#,
            table = R::TABLE,
            columns = column_defs.join(",\n                "),
        ))?;
        Ok(())
    }

    /// `c1 = ?i AND c2 = ?i+1 ...` for the first `columns.len()` key parts.
    fn match_clause(columns: &[&str], first_param: usize) -> String {
        columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", first_param + i))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Latest stored row for `key`, regardless of archived state, bounded
    /// by an exclusive upper timestamp when `before` is given.
    fn latest_row(
        conn: &Connection,
        key: &R::Key,
        before: Option<Timestamp>,
    ) -> LedgerResult<Option<(String, bool)>> {
        let columns = Self::key_columns();
        let mut sql = format!(
            "SELECT data, archived FROM {} WHERE {}",
            R::TABLE,
            Self::match_clause(&columns, 1),
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = key
            .values()
            .into_iter()
            .map(|v| Box::new(v) as Box<dyn rusqlite::ToSql>)
            .collect();
        if let Some(at) = before {
            sql.push_str(&format!(" AND timestamp < ?{}", params.len() + 1));
            params.push(Box::new(at.micros()));
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT 1");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(params_refs.as_slice())?;

        if let Some(row) = rows.next()? {
            let data: String = row.get(0)?;
            let archived: bool = row.get(1)?;
            Ok(Some((data, archived)))
        } else {
            Ok(None)
        }
    }

    /// Insert one version row, mapping a primary-key collision to
    /// [`LedgerError::TimestampConflict`].
    fn insert_version(
        conn: &Connection,
        key: &R::Key,
        at: Timestamp,
        data: &str,
        archived: bool,
    ) -> LedgerResult<()> {
        let columns = Self::key_columns();
        let placeholders: Vec<String> = (1..=columns.len() + 3).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}, timestamp, data, archived) VALUES ({})",
            R::TABLE,
            columns.join(", "),
            placeholders.join(", "),
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = key
            .values()
            .into_iter()
            .map(|v| Box::new(v) as Box<dyn rusqlite::ToSql>)
            .collect();
        params.push(Box::new(at.micros()));
        params.push(Box::new(data.to_string()));
        params.push(Box::new(archived));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();

        match conn.execute(&sql, params_refs.as_slice()) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LedgerError::TimestampConflict(at.micros()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Per-key winners under `prefix`: group by the full key, keep the row
    /// with the maximum timestamp (optionally bounded by an exclusive
    /// upper timestamp), then keep live or tombstoned winners as asked.
    fn winners(
        conn: &Connection,
        prefix: &[KeyPart],
        before: Option<Timestamp>,
        tombstoned: bool,
    ) -> LedgerResult<Vec<R>> {
        let columns = Self::key_columns();
        debug_assert!(prefix.len() <= columns.len());
        let key_cols = columns.join(", ");

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        for (i, (col, part)) in columns.iter().zip(prefix.iter()).enumerate() {
            conditions.push(format!("{col} = ?{}", i + 1));
            params.push(Box::new(part.clone()));
        }
        if let Some(at) = before {
            conditions.push(format!("timestamp < ?{}", params.len() + 1));
            params.push(Box::new(at.micros()));
        }
        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let join_on: Vec<String> = columns
            .iter()
            .map(|col| format!("t.{col} = latest.{col}"))
            .collect();
        let order_by: Vec<String> = columns.iter().map(|col| format!("t.{col}")).collect();

        let sql = format!(
            "SELECT t.data FROM {table} t \
             JOIN (SELECT {key_cols}, MAX(timestamp) AS max_ts FROM {table}{filter} \
                   GROUP BY {key_cols}) latest \
             ON {join_on} AND t.timestamp = latest.max_ts \
             WHERE t.archived = {archived} \
             ORDER BY {order_by}",
            table = R::TABLE,
            join_on = join_on.join(" AND "),
            archived = i32::from(tombstoned),
            order_by = order_by.join(", "),
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(params_refs.as_slice())?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let data: String = row.get(0)?;
            records.push(serde_json::from_str(&data)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl<R: VersionRecord> VersionLog<R> for SqliteVersionLog<R> {
    async fn append(&self, record: &R) -> LedgerResult<Timestamp> {
        let data = serde_json::to_string(record)?;
        let key = record.key();
        let conn = self.lock()?;
        let at = self.clock.now();
        Self::insert_version(&conn, &key, at, &data, false)?;
        debug!(table = R::TABLE, key = ?key, %at, "appended version");
        Ok(at)
    }

    async fn current(&self, key: &R::Key) -> LedgerResult<Option<R>> {
        let conn = self.lock()?;
        match Self::latest_row(&conn, key, None)? {
            Some((data, false)) => Ok(Some(serde_json::from_str(&data)?)),
            _ => Ok(None),
        }
    }

    async fn as_of(&self, key: &R::Key, at: Timestamp) -> LedgerResult<Option<R>> {
        let conn = self.lock()?;
        match Self::latest_row(&conn, key, Some(at))? {
            Some((data, false)) => Ok(Some(serde_json::from_str(&data)?)),
            _ => Ok(None),
        }
    }

    async fn list_current(&self, prefix: &[KeyPart]) -> LedgerResult<Vec<R>> {
        let conn = self.lock()?;
        Self::winners(&conn, prefix, None, false)
    }

    async fn list_as_of(&self, prefix: &[KeyPart], at: Timestamp) -> LedgerResult<Vec<R>> {
        let conn = self.lock()?;
        Self::winners(&conn, prefix, Some(at), false)
    }

    async fn list_tombstoned(&self, prefix: &[KeyPart]) -> LedgerResult<Vec<R>> {
        let conn = self.lock()?;
        Self::winners(&conn, prefix, None, true)
    }

    async fn tombstone(&self, key: &R::Key) -> LedgerResult<Timestamp> {
        let conn = self.lock()?;
        match Self::latest_row(&conn, key, None)? {
            Some((data, false)) => {
                let at = self.clock.now();
                Self::insert_version(&conn, key, at, &data, true)?;
                debug!(table = R::TABLE, key = ?key, %at, "appended tombstone");
                Ok(at)
            }
            _ => Err(LedgerError::NotFound(format!(
                "{}: no current version for key {key:?}",
                R::TABLE,
            ))),
        }
    }

    async fn revive(&self, key: &R::Key) -> LedgerResult<Option<Timestamp>> {
        let conn = self.lock()?;
        match Self::latest_row(&conn, key, None)? {
            Some((data, true)) => {
                let at = self.clock.now();
                Self::insert_version(&conn, key, at, &data, false)?;
                debug!(table = R::TABLE, key = ?key, %at, "revived tombstoned key");
                Ok(Some(at))
            }
            _ => Ok(None),
        }
    }
}
