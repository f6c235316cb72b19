//! # Unit of work
//!
//! One authoring request = one transaction. The unit starts OPEN and ends
//! COMMITTED or ABORTED through [`UnitOfWork::finish`]. If it is dropped
//! while still open (early return, panic, cancelled request) the wrapped
//! `sqlx::Transaction` rolls back on drop.
//!
//! Authoring units start with `BEGIN IMMEDIATE`: the write lock is taken up
//! front, so two writers queue on the busy timeout instead of deadlocking on
//! a SHARED to RESERVED upgrade. Read units use a plain deferred `BEGIN` and
//! only pin a snapshot.

use rf_core::error::Result;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::OrBusy;

pub(crate) struct UnitOfWork<'c> {
    tx: Transaction<'c, Sqlite>,
    operation: &'static str,
    entity_id: Option<i64>,
}

impl<'c> UnitOfWork<'c> {
    /// Opens a unit that will write.
    pub(crate) async fn begin(
        pool: &'c SqlitePool,
        operation: &'static str,
        entity_id: Option<i64>,
    ) -> Result<Self> {
        let tx = pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .or_busy(operation, entity_id)?;
        Ok(Self {
            tx,
            operation,
            entity_id,
        })
    }

    /// Opens a read-only unit so several statements see one snapshot.
    pub(crate) async fn begin_read(
        pool: &'c SqlitePool,
        operation: &'static str,
        entity_id: Option<i64>,
    ) -> Result<Self> {
        let tx = pool.begin().await.or_busy(operation, entity_id)?;
        Ok(Self {
            tx,
            operation,
            entity_id,
        })
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commits on `Ok`, rolls back on `Err`. The caller's error wins over a
    /// rollback failure; a commit failure becomes `ServerBusy`.
    pub(crate) async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        let Self {
            tx,
            operation,
            entity_id,
        } = self;

        match outcome {
            Ok(value) => {
                tx.commit().await.or_busy(operation, entity_id)?;
                tracing::debug!(operation, entity_id = ?entity_id, "unit committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(operation, entity_id = ?entity_id, error = %rollback_err, "rollback failed");
                }
                tracing::debug!(operation, entity_id = ?entity_id, reason = %err, "unit aborted");
                Err(err)
            }
        }
    }
}
