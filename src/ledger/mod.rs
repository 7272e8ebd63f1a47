//! Append-only SQLite ledger of successfully dispatched vectors.
//!
//! [`Ledger::record`] is fire-and-forget: it validates, queues the row for
//! the single-writer actor, and swallows every failure after logging it.
//! Nothing here updates or deletes rows.

pub mod writer;

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use self::writer::{NewEntry, WriteOp};
use crate::vector::Vector;

/// Writer channel capacity when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Timestamp format stored in the `ts` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Schema applied by [`Ledger::init`].
const SCHEMA_SQL: &str = include_str!("../../migrations/001_ledger.sql");

/// Errors from ledger reads and setup.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The ledger directory could not be created.
    #[error("failed to create ledger directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writer channel is closed (writer actor stopped).
    #[error("ledger writer channel closed")]
    WriterClosed,
}

/// One persisted ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic row id.
    pub id: i64,
    /// UTC timestamp, `%Y-%m-%d %H:%M:%S`.
    pub ts: String,
    /// Vector entity.
    pub entity: String,
    /// Vector type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Numeric weight.
    pub opac: f64,
    /// Vector function.
    pub function: String,
    /// Vector command.
    pub command: String,
    /// Dispatch payload.
    pub payload: serde_json::Value,
}

/// Raw `cx_log` row: `(id, ts, entity, type, opac, function, command, payload)`.
type LedgerRow = (i64, String, String, String, f64, String, String, String);

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        let (id, ts, entity, kind, opac, function, command, payload) = row;
        let payload = serde_json::from_str(&payload).unwrap_or(serde_json::Value::String(payload));
        Self {
            id,
            ts,
            entity,
            kind,
            opac,
            function,
            command,
            payload,
        }
    }
}

/// Handle to the ledger store and its writer actor.
pub struct Ledger {
    /// Connection pool for reads.
    db: SqlitePool,
    /// Channel to the single-writer actor.
    writer_tx: mpsc::Sender<WriteOp>,
    /// Writer actor join handle (awaited on shutdown).
    writer_handle: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open (or create) the ledger database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or the
    /// schema cannot be applied.
    pub async fn open(path: &Path, channel_capacity: usize) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        let ledger = Self::connect(pool, channel_capacity).await?;
        info!(path = %path.display(), "ledger opened");
        Ok(ledger)
    }

    /// Private in-memory ledger, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect or the schema fails.
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        // One connection, or every new connection would see a fresh database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::connect(pool, DEFAULT_CHANNEL_CAPACITY).await
    }

    /// Wrap an existing pool, apply the schema, and spawn the writer actor.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub async fn connect(db: SqlitePool, channel_capacity: usize) -> Result<Self, LedgerError> {
        let (writer_tx, writer_rx) = mpsc::channel(channel_capacity.max(1));
        let writer_handle = tokio::spawn(writer::run_writer(db.clone(), writer_rx));
        let ledger = Self {
            db,
            writer_tx,
            writer_handle,
        };
        ledger.init().await?;
        Ok(ledger)
    }

    /// Ensure the `cx_log` table and its entity index exist. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn init(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.db).await?;
        debug!("ledger schema ensured");
        Ok(())
    }

    /// Append `vector` and `payload`. Failures are logged, never returned.
    ///
    /// A vector whose opac is not a finite decimal is not recorded.
    pub async fn record(&self, vector: &str, payload: &serde_json::Value) {
        let parsed = match Vector::parse(vector) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "ledger skipped malformed vector");
                return;
            }
        };
        let opac = match parsed.opac_value() {
            Ok(opac) => opac,
            Err(err) => {
                warn!(vector, error = %err, "ledger skipped vector");
                return;
            }
        };

        let entry = NewEntry {
            ts: chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            entity: parsed.entity,
            kind: parsed.kind,
            opac,
            function: parsed.function,
            command: parsed.command,
            payload: payload.to_string(),
        };
        if self.writer_tx.send(WriteOp::Append(entry)).await.is_err() {
            warn!(vector, "ledger writer closed, entry dropped");
            return;
        }
        debug!(vector, "ledger entry queued");
    }

    /// Wait until every previously queued entry has been written.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::WriterClosed`] if the writer actor has stopped.
    pub async fn flush(&self) -> Result<(), LedgerError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.writer_tx
            .send(WriteOp::Flush(ack_tx))
            .await
            .map_err(|_| LedgerError::WriterClosed)?;
        ack_rx.await.map_err(|_| LedgerError::WriterClosed)
    }

    /// Most recent `limit` entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<LedgerRow> = sqlx::query_as(
            "SELECT id, ts, entity, type, opac, function, command, payload \
             FROM cx_log \
             ORDER BY id DESC \
             LIMIT ?1",
        )
        .bind(limit_i64)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    /// Most recent `limit` entries for one entity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn for_entity(
        &self,
        entity: &str,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<LedgerRow> = sqlx::query_as(
            "SELECT id, ts, entity, type, opac, function, command, payload \
             FROM cx_log \
             WHERE entity = ?1 \
             ORDER BY id DESC \
             LIMIT ?2",
        )
        .bind(entity)
        .bind(limit_i64)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    /// Total number of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<u64, LedgerError> {
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM cx_log")
            .fetch_one(&self.db)
            .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    /// Newest-first listing of the last `limit` entries, one per line:
    /// `ts | entity:type:function:command`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn summarize(&self, limit: usize) -> Result<String, LedgerError> {
        let entries = self.recent(limit).await?;
        Ok(entries
            .iter()
            .map(|e| {
                format!(
                    "{} | {}:{}:{}:{}",
                    e.ts, e.entity, e.kind, e.function, e.command
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Drain queued writes and stop the writer actor.
    ///
    /// Returns whether the writer stopped cleanly. A writer that panicked or
    /// was cancelled is logged and reported as `false`.
    pub async fn shutdown(self) -> bool {
        drop(self.writer_tx);
        match self.writer_handle.await {
            Ok(()) => {
                info!("ledger shut down");
                true
            }
            Err(err) => {
                warn!(error = %err, "ledger writer did not stop cleanly");
                false
            }
        }
    }
}
