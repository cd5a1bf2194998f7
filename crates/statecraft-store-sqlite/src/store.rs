// crates/statecraft-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Event and Snapshot Store
// Description: Durable EventStore and SnapshotStore backed by SQLite WAL.
// Purpose: Persist entity logs with dense sequences and optimistic appends.
// Dependencies: statecraft-core, rusqlite, serde_json, tokio
// ============================================================================

//! ## Overview
//! This module implements the core storage interfaces on `SQLite`: an
//! append-only event table keyed `(entity_id, seq)` with the optimistic
//! `expected_version` check inside one transaction, and a one-row-per-entity
//! snapshot table. The journal runs in WAL mode by default with a busy
//! timeout; the schema version is tracked in `user_version` and mismatches
//! fail closed. Rows that do not decode fail closed as corruption; the
//! durable log is never silently repaired.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

use statecraft_core::EntityId;
use statecraft_core::EntitySnapshot;
use statecraft_core::RecordedEvent;
use statecraft_core::StateTransitionEvent;
use statecraft_core::interfaces::EventStore;
use statecraft_core::interfaces::EventStoreError;
use statecraft_core::interfaces::SnapshotStore;
use statecraft_core::interfaces::SnapshotStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the pragma value.
    const fn pragma(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Journal mode.
    pub journal_mode: SqliteJournalMode,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a configuration with recommended defaults.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            journal_mode: SqliteJournalMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// SECTION: Open Errors
// ============================================================================

/// Store open/initialization errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// The database could not be opened.
    #[error("sqlite open failed: {0}")]
    Open(String),
    /// The schema could not be initialized or has the wrong version.
    #[error("sqlite schema error: {0}")]
    Schema(String),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable event log and snapshot store on one `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Shared connection; rusqlite connections are not `Sync`.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// the stored schema version does not match.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(&config.path)
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;
        conn.pragma_update(None, "journal_mode", config.journal_mode.pragma())
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;
        conn.pragma_update(None, "busy_timeout", i64::try_from(config.busy_timeout_ms).unwrap_or(i64::MAX))
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(|err| SqliteStoreError::Schema(err.to_string()))?;
        if version == 0 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS events (
                     entity_id TEXT NOT NULL,
                     seq       INTEGER NOT NULL,
                     body      TEXT NOT NULL,
                     PRIMARY KEY (entity_id, seq)
                 );
                 CREATE TABLE IF NOT EXISTS snapshots (
                     entity_id TEXT PRIMARY KEY,
                     body      TEXT NOT NULL
                 );",
            )
            .map_err(|err| SqliteStoreError::Schema(err.to_string()))?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .map_err(|err| SqliteStoreError::Schema(err.to_string()))?;
        } else if version != SCHEMA_VERSION {
            return Err(SqliteStoreError::Schema(format!(
                "unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs a blocking closure against the shared connection on the
    /// blocking pool.
    async fn with_conn<T, E, F>(&self, run: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: InfraError + Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| E::io("sqlite store mutex poisoned".to_string()))?;
            run(&mut guard)
        });
        match task.await {
            Ok(result) => result,
            // The blocking task panicked or was cancelled; the caller only
            // sees a failed operation.
            Err(_) => Err(E::io("sqlite blocking task failed".to_string())),
        }
    }
}

/// Maps infrastructure failures onto the interface error types.
trait InfraError {
    /// Builds the I/O variant from a failure detail.
    fn io(detail: String) -> Self;
}

impl InfraError for EventStoreError {
    fn io(detail: String) -> Self {
        Self::Io(detail)
    }
}

impl InfraError for SnapshotStoreError {
    fn io(detail: String) -> Self {
        Self::Io(detail)
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn append(
        &self,
        entity: &EntityId,
        events: &[StateTransitionEvent],
        expected_version: u64,
    ) -> Result<u64, EventStoreError> {
        let entity = entity.as_str().to_string();
        let bodies: Result<Vec<String>, EventStoreError> = events
            .iter()
            .map(|event| {
                serde_json::to_string(event)
                    .map_err(|err| EventStoreError::Io(err.to_string()))
            })
            .collect();
        let bodies = bodies?;

        self.with_conn(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(|err| EventStoreError::Io(err.to_string()))?;
                let found: i64 = tx
                    .query_row(
                        "SELECT COALESCE(MAX(seq), 0) FROM events WHERE entity_id = ?1",
                        params![entity],
                        |row| row.get(0),
                    )
                    .map_err(|err| EventStoreError::Io(err.to_string()))?;
                let found = u64::try_from(found).unwrap_or(0);
                if found != expected_version {
                    return Err(EventStoreError::VersionConflict {
                        expected: expected_version,
                        found,
                    });
                }
                for (offset, body) in bodies.iter().enumerate() {
                    let seq = expected_version + 1 + offset as u64;
                    tx.execute(
                        "INSERT INTO events (entity_id, seq, body) VALUES (?1, ?2, ?3)",
                        params![entity, i64::try_from(seq).unwrap_or(i64::MAX), body],
                    )
                    .map_err(|err| EventStoreError::Io(err.to_string()))?;
                }
                tx.commit().map_err(|err| EventStoreError::Io(err.to_string()))?;
                Ok(expected_version + bodies.len() as u64)
            },
        )
        .await
    }

    async fn read(
        &self,
        entity: &EntityId,
        from_seq: u64,
        to_seq: Option<u64>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let entity = entity.as_str().to_string();
        self.with_conn(move |conn| {
                let upper = to_seq.map_or(i64::MAX, |seq| i64::try_from(seq).unwrap_or(i64::MAX));
                let lower = i64::try_from(from_seq).unwrap_or(i64::MAX);
                let mut statement = conn
                    .prepare(
                        "SELECT seq, body FROM events
                         WHERE entity_id = ?1 AND seq >= ?2 AND seq <= ?3
                         ORDER BY seq ASC",
                    )
                    .map_err(|err| EventStoreError::Io(err.to_string()))?;
                let rows = statement
                    .query_map(params![entity, lower, upper], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(|err| EventStoreError::Io(err.to_string()))?;

                let mut records = Vec::new();
                for row in rows {
                    let (seq, body) =
                        row.map_err(|err| EventStoreError::Io(err.to_string()))?;
                    let event: StateTransitionEvent = serde_json::from_str(&body)
                        .map_err(|err| {
                            EventStoreError::Corrupt(format!("event seq {seq}: {err}"))
                        })?;
                    records.push(RecordedEvent {
                        seq: u64::try_from(seq).unwrap_or(0),
                        event,
                    });
                }
                Ok(records)
            },
        )
        .await
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn save(
        &self,
        entity: &EntityId,
        snapshot: &EntitySnapshot,
    ) -> Result<(), SnapshotStoreError> {
        let entity = entity.as_str().to_string();
        let body = serde_json::to_string(snapshot)
            .map_err(|err| SnapshotStoreError::Io(err.to_string()))?;
        self.with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO snapshots (entity_id, body) VALUES (?1, ?2)
                     ON CONFLICT(entity_id) DO UPDATE SET body = excluded.body",
                    params![entity, body],
                )
                .map_err(|err| SnapshotStoreError::Io(err.to_string()))?;
                Ok(())
            },
        )
        .await
    }

    async fn load(&self, entity: &EntityId) -> Result<Option<EntitySnapshot>, SnapshotStoreError> {
        let entity = entity.as_str().to_string();
        self.with_conn(move |conn| {
                let body: Option<String> = conn
                    .query_row(
                        "SELECT body FROM snapshots WHERE entity_id = ?1",
                        params![entity],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|err| SnapshotStoreError::Io(err.to_string()))?;
                body.map(|body| {
                    serde_json::from_str(&body)
                        .map_err(|err| SnapshotStoreError::Corrupt(err.to_string()))
                })
                .transpose()
            },
        )
        .await
    }
}
