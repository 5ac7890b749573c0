//! Bucket counter store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Offer an atomic read-modify-write over one counter per bucket key.
//! - Retry the whole transaction when another writer holds the lock.
//!
//! # Invariants
//! - Counter rows are written only inside `CounterStore::transaction`.
//! - A body that returns `Err` leaves every counter untouched (rollback).
//! - Retries are bounded by `TxOptions::max_attempts` and the deadline.
//!
//! # See also
//! - `service::folio_service` for the allocation rules run inside a body.

use crate::db::{is_busy_error, DbError};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

pub type CounterResult<T> = Result<T, CounterStoreError>;

/// Counter store failure.
#[derive(Debug)]
pub enum CounterStoreError {
    Db(DbError),
    /// Every attempt collided with a concurrent writer.
    RetryBudgetExhausted { bucket_key: String, attempts: u32 },
    /// The caller deadline passed before an attempt could commit.
    DeadlineExceeded { bucket_key: String, attempts: u32 },
    /// The `bucket_counters` table is absent (unmigrated connection).
    MissingCounterTable,
    InvalidData(String),
}

impl Display for CounterStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::RetryBudgetExhausted {
                bucket_key,
                attempts,
            } => write!(
                f,
                "counter `{bucket_key}` stayed locked after {attempts} attempt(s)"
            ),
            Self::DeadlineExceeded {
                bucket_key,
                attempts,
            } => write!(
                f,
                "deadline exceeded for counter `{bucket_key}` after {attempts} attempt(s)"
            ),
            Self::MissingCounterTable => write!(f, "required table missing: bucket_counters"),
            Self::InvalidData(message) => write!(f, "invalid persisted counter data: {message}"),
        }
    }
}

impl Error for CounterStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CounterStoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CounterStoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Retry policy for one store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub max_attempts: u32,
    /// Pause after the n-th conflict is `backoff * n`.
    pub backoff: Duration,
    /// No new attempt starts at or after this instant.
    pub deadline: Option<Instant>,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff: Duration::from_millis(10),
            deadline: None,
        }
    }
}

/// Operations available inside a counter transaction.
pub trait CounterTransaction {
    /// Reads the counter, `None` when the bucket was never allocated.
    fn get(&mut self, bucket_key: &str) -> CounterResult<Option<u32>>;
    /// Creates the counter; fails when it already exists.
    fn set(&mut self, bucket_key: &str, value: u32) -> CounterResult<()>;
    /// Overwrites an existing counter; fails when it does not exist.
    fn update(&mut self, bucket_key: &str, value: u32) -> CounterResult<()>;
}

/// Store that serializes read-modify-write transactions per bucket key.
pub trait CounterStore {
    /// Runs `body` atomically for `bucket_key`.
    ///
    /// `body` may run several times when the store detects a conflicting
    /// writer; only the attempt that commits has observable effects.
    fn transaction<T, E, F>(&self, bucket_key: &str, options: &TxOptions, body: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn CounterTransaction) -> Result<T, E>,
        E: From<CounterStoreError>;
}

/// SQLite-backed counter store.
pub struct SqliteCounterStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCounterStore<'conn> {
    /// Creates the store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> CounterResult<Self> {
        ensure_counter_table(conn)?;
        Ok(Self { conn })
    }
}

enum AttemptError<E> {
    Conflict(rusqlite::Error),
    Failed(E),
}

impl SqliteCounterStore<'_> {
    fn attempt<T, E, F>(&self, body: &mut F) -> Result<T, AttemptError<E>>
    where
        F: FnMut(&mut dyn CounterTransaction) -> Result<T, E>,
        E: From<CounterStoreError>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(classify::<E>)?;

        let mut handle = SqliteCounterTx { conn: &tx };
        // Dropping `tx` on this path rolls the attempt back.
        let value = body(&mut handle).map_err(AttemptError::Failed)?;

        tx.commit().map_err(classify::<E>)?;
        Ok(value)
    }
}

impl CounterStore for SqliteCounterStore<'_> {
    fn transaction<T, E, F>(
        &self,
        bucket_key: &str,
        options: &TxOptions,
        mut body: F,
    ) -> Result<T, E>
    where
        F: FnMut(&mut dyn CounterTransaction) -> Result<T, E>,
        E: From<CounterStoreError>,
    {
        let max_attempts = options.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            if deadline_passed(options.deadline) {
                return Err(CounterStoreError::DeadlineExceeded {
                    bucket_key: bucket_key.to_string(),
                    attempts,
                }
                .into());
            }

            attempts += 1;
            match self.attempt(&mut body) {
                Ok(value) => {
                    debug!(
                        "event=counter_tx module=repo status=ok bucket={} attempts={}",
                        bucket_key, attempts
                    );
                    return Ok(value);
                }
                Err(AttemptError::Failed(err)) => return Err(err),
                Err(AttemptError::Conflict(err)) => {
                    warn!(
                        "event=counter_tx module=repo status=conflict bucket={} attempt={} max_attempts={} error={}",
                        bucket_key, attempts, max_attempts, err
                    );
                    if attempts >= max_attempts {
                        return Err(CounterStoreError::RetryBudgetExhausted {
                            bucket_key: bucket_key.to_string(),
                            attempts,
                        }
                        .into());
                    }
                    pause(options.backoff * attempts, options.deadline);
                }
            }
        }
    }
}

struct SqliteCounterTx<'tx> {
    conn: &'tx Connection,
}

impl CounterTransaction for SqliteCounterTx<'_> {
    fn get(&mut self, bucket_key: &str) -> CounterResult<Option<u32>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM bucket_counters WHERE bucket_key = ?1;",
                [bucket_key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        value
            .map(|raw| {
                u32::try_from(raw).map_err(|_| {
                    CounterStoreError::InvalidData(format!(
                        "counter value `{raw}` out of range for `{bucket_key}`"
                    ))
                })
            })
            .transpose()
    }

    fn set(&mut self, bucket_key: &str, value: u32) -> CounterResult<()> {
        self.conn.execute(
            "INSERT INTO bucket_counters (bucket_key, value) VALUES (?1, ?2);",
            params![bucket_key, i64::from(value)],
        )?;
        Ok(())
    }

    fn update(&mut self, bucket_key: &str, value: u32) -> CounterResult<()> {
        let changed = self.conn.execute(
            "UPDATE bucket_counters
             SET
                value = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE bucket_key = ?1;",
            params![bucket_key, i64::from(value)],
        )?;

        if changed == 0 {
            return Err(CounterStoreError::InvalidData(format!(
                "counter `{bucket_key}` vanished inside its transaction"
            )));
        }
        Ok(())
    }
}

fn classify<E: From<CounterStoreError>>(err: rusqlite::Error) -> AttemptError<E> {
    if is_busy_error(&err) {
        AttemptError::Conflict(err)
    } else {
        AttemptError::Failed(CounterStoreError::from(err).into())
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

fn pause(wanted: Duration, deadline: Option<Instant>) {
    let wait = match deadline {
        Some(deadline) => wanted.min(deadline.saturating_duration_since(Instant::now())),
        None => wanted,
    };
    if !wait.is_zero() {
        std::thread::sleep(wait);
    }
}

fn ensure_counter_table(conn: &Connection) -> CounterResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'bucket_counters'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(CounterStoreError::MissingCounterTable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CounterStore, CounterStoreError, SqliteCounterStore, TxOptions};
    use crate::db::open_db_in_memory;
    use rusqlite::Connection;
    use std::time::Instant;

    #[test]
    fn set_then_update_persists_latest_value() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteCounterStore::try_new(&conn).unwrap();

        let first: u32 = store
            .transaction(
                "CF-2025-37",
                &TxOptions::default(),
                |tx| -> Result<u32, CounterStoreError> {
                    assert_eq!(tx.get("CF-2025-37")?, None);
                    tx.set("CF-2025-37", 1)?;
                    Ok(1)
                },
            )
            .unwrap();
        assert_eq!(first, 1);

        store
            .transaction(
                "CF-2025-37",
                &TxOptions::default(),
                |tx| -> Result<(), CounterStoreError> {
                    let current = tx.get("CF-2025-37")?.unwrap_or(0);
                    tx.update("CF-2025-37", current + 1)
                },
            )
            .unwrap();

        let stored: i64 = conn
            .query_row(
                "SELECT value FROM bucket_counters WHERE bucket_key = 'CF-2025-37';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored, 2);
    }

    #[test]
    fn failing_body_rolls_back_writes() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteCounterStore::try_new(&conn).unwrap();

        let result: Result<(), CounterStoreError> =
            store.transaction("CF-2025-01", &TxOptions::default(), |tx| {
                tx.set("CF-2025-01", 1)?;
                Err(CounterStoreError::InvalidData("abort".to_string()))
            });
        assert!(matches!(result, Err(CounterStoreError::InvalidData(_))));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM bucket_counters;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn update_of_missing_counter_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteCounterStore::try_new(&conn).unwrap();

        let err = store
            .transaction("CF-2025-02", &TxOptions::default(), |tx| {
                tx.update("CF-2025-02", 5)
            })
            .unwrap_err();
        assert!(matches!(err, CounterStoreError::InvalidData(_)));
    }

    #[test]
    fn expired_deadline_fails_before_first_attempt() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteCounterStore::try_new(&conn).unwrap();
        let options = TxOptions {
            deadline: Some(Instant::now()),
            ..TxOptions::default()
        };

        let mut ran = false;
        let err = store
            .transaction("CF-2025-03", &options, |_tx| {
                ran = true;
                Ok::<_, CounterStoreError>(())
            })
            .unwrap_err();
        assert!(!ran);
        assert!(matches!(
            err,
            CounterStoreError::DeadlineExceeded { attempts: 0, .. }
        ));
    }

    #[test]
    fn unmigrated_connection_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteCounterStore::try_new(&conn).err().unwrap();
        assert!(matches!(err, CounterStoreError::MissingCounterTable));
    }
}
