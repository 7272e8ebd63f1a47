//! Single-writer actor for serialized ledger appends.
//!
//! Every insert flows through this actor via an
//! [`mpsc`](tokio::sync::mpsc) channel, so concurrent dispatches never
//! contend for the SQLite write lock. Reads go straight to the pool.

use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace};

/// A ledger row ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    /// `%Y-%m-%d %H:%M:%S` UTC timestamp.
    pub ts: String,
    /// Vector entity.
    pub entity: String,
    /// Vector type.
    pub kind: String,
    /// Numeric weight.
    pub opac: f64,
    /// Vector function.
    pub function: String,
    /// Vector command.
    pub command: String,
    /// Serialized JSON payload.
    pub payload: String,
}

/// Operations accepted by the writer actor.
#[derive(Debug)]
pub enum WriteOp {
    /// Append one entry.
    Append(NewEntry),

    /// Acknowledge once every earlier operation has been applied.
    Flush(oneshot::Sender<()>),
}

/// Run the writer loop until every sender is dropped.
///
/// A failed insert is logged and dropped; the loop keeps going.
pub async fn run_writer(db: SqlitePool, mut rx: mpsc::Receiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Append(entry) => {
                if let Err(err) = append(&db, &entry).await {
                    error!(
                        entity = %entry.entity,
                        function = %entry.function,
                        error = %err,
                        "ledger append failed"
                    );
                }
            }
            WriteOp::Flush(ack) => {
                // The requester may have given up waiting.
                let _ = ack.send(());
            }
        }
    }
    trace!("ledger writer stopped");
}

async fn append(db: &SqlitePool, entry: &NewEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO cx_log (ts, entity, type, opac, function, command, payload) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&entry.ts)
    .bind(&entry.entity)
    .bind(&entry.kind)
    .bind(entry.opac)
    .bind(&entry.function)
    .bind(&entry.command)
    .bind(&entry.payload)
    .execute(db)
    .await?;
    trace!(entity = %entry.entity, function = %entry.function, "ledger entry appended");
    Ok(())
}
