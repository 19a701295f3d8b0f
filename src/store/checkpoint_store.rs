use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use alloy::primitives::BlockNumber;

use crate::{
    store::{
        Checkpoint, StoreError,
        client::Client,
        model::{CheckpointRow, EventRow},
    },
    types::EventRecord,
};

/// Checkpoint and event history of one sync scope.
///
/// Stores for different scopes may share a database. A scope must have a single writer.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    client: Client,
    scope: String,
    event_tables: Arc<Mutex<HashSet<String>>>,
}

impl CheckpointStore {
    /// Opens (or creates) the database at `database_url` and binds the store to `scope`.
    pub async fn connect(database_url: &str, scope: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::connect(database_url).await?;
        Ok(Self { client, scope: scope.into(), event_tables: Arc::default() })
    }

    /// A store for another scope on the same database.
    #[must_use]
    pub fn for_scope(&self, scope: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            scope: scope.into(),
            event_tables: Arc::clone(&self.event_tables),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    // ---------------------------
    // CHECKPOINT
    // ---------------------------

    /// The stored checkpoint, `None` for a scope that has made no progress yet.
    pub async fn checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        let query = r#"
            SELECT last_processed_block, last_log_index, scan_cursor
            FROM sync_checkpoints
            WHERE scope = ?
            "#;

        let row: Option<CheckpointRow> =
            sqlx::query_as(query).bind(&self.scope).fetch_optional(self.client.pool()).await?;

        row.map(Checkpoint::try_from).transpose()
    }

    /// Block of the last committed event, `0` for a fresh scope.
    pub async fn last_processed_block(&self) -> Result<BlockNumber, StoreError> {
        Ok(self.checkpoint().await?.map_or(0, |checkpoint| checkpoint.last_processed_block))
    }

    /// Last block known to be fully scanned, `0` for a fresh scope.
    pub async fn scan_cursor(&self) -> Result<BlockNumber, StoreError> {
        Ok(self.checkpoint().await?.map_or(0, |checkpoint| checkpoint.scan_cursor()))
    }

    /// Stores `record` and moves the checkpoint to its position, atomically.
    ///
    /// Re-inserting an event that is already in the history is a no-op, so replaying after a
    /// reset does not duplicate it.
    ///
    /// # Errors
    ///
    /// [`StoreError::CheckpointRegression`] if `record` is not after the committed position. On
    /// any error neither the event nor the checkpoint is written.
    pub async fn commit_event(&self, record: &EventRecord) -> Result<(), StoreError> {
        let table = self.ensure_event_table(&record.event_name).await?;
        let fields = serde_json::to_string(&record.fields)?;
        let position = record.position();

        let mut tx = self.client.pool().begin().await?;

        let query = r#"
            SELECT last_processed_block, last_log_index, scan_cursor
            FROM sync_checkpoints
            WHERE scope = ?
            "#;
        let current: Option<CheckpointRow> =
            sqlx::query_as(query).bind(&self.scope).fetch_optional(&mut *tx).await?;
        let committed =
            current.map(Checkpoint::try_from).transpose()?.and_then(|c| c.committed_position());

        if let Some(committed) = committed.filter(|committed| position <= *committed) {
            return Err(StoreError::CheckpointRegression { committed, attempted: position });
        }

        let query = r#"
            INSERT INTO sync_checkpoints (scope, last_processed_block, last_log_index, scan_cursor)
            VALUES (?, ?, ?, NULL)
            ON CONFLICT (scope) DO UPDATE SET
                last_processed_block = excluded.last_processed_block,
                last_log_index = excluded.last_log_index
            "#;
        sqlx::query(query)
            .bind(&self.scope)
            .bind(sql_int(record.block_number)?)
            .bind(sql_int(record.log_index)?)
            .execute(&mut *tx)
            .await?;

        let query = format!(
            r#"
            INSERT INTO "{table}"
                (scope, block_number, block_hash, transaction_hash, log_index, fields)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (scope, block_number, log_index) DO NOTHING
            "#
        );
        sqlx::query(&query)
            .bind(&self.scope)
            .bind(sql_int(record.block_number)?)
            .bind(&record.block_hash[..])
            .bind(&record.transaction_hash[..])
            .bind(sql_int(record.log_index)?)
            .bind(&fields)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        trace!(
            scope = %self.scope,
            position = %position,
            event = %record.event_name,
            "Committed event"
        );
        Ok(())
    }

    /// Records that every block up to `breakpoint` was scanned. The stored cursor never moves
    /// backwards.
    pub async fn advance_scan_cursor(&self, breakpoint: BlockNumber) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO sync_checkpoints (scope, last_processed_block, last_log_index, scan_cursor)
            VALUES (?, 0, NULL, ?)
            ON CONFLICT (scope) DO UPDATE SET
                scan_cursor = MAX(COALESCE(scan_cursor, 0), excluded.scan_cursor)
            "#;

        sqlx::query(query)
            .bind(&self.scope)
            .bind(sql_int(breakpoint)?)
            .execute(self.client.pool())
            .await?;

        trace!(scope = %self.scope, breakpoint = breakpoint, "Advanced scan cursor");
        Ok(())
    }

    /// Forgets all progress of this scope. Stored events are kept.
    pub async fn reset_checkpoint(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sync_checkpoints WHERE scope = ?")
            .bind(&self.scope)
            .execute(self.client.pool())
            .await?;

        info!(scope = %self.scope, "Checkpoint reset");
        Ok(())
    }

    // ---------------------------
    // EVENT HISTORY
    // ---------------------------

    /// All stored `event_name` events of this scope, in chain order.
    pub async fn events(&self, event_name: &str) -> Result<Vec<EventRecord>, StoreError> {
        self.events_between(event_name, 0, BlockNumber::MAX).await
    }

    /// Stored `event_name` events with `from <= block_number <= to`, in chain order.
    pub async fn events_between(
        &self,
        event_name: &str,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let table = self.ensure_event_table(event_name).await?;
        let query = format!(
            r#"
            SELECT block_number, block_hash, transaction_hash, log_index, fields
            FROM "{table}"
            WHERE scope = ? AND block_number BETWEEN ? AND ?
            ORDER BY block_number ASC, log_index ASC
            "#
        );

        let rows: Vec<EventRow> = sqlx::query_as(&query)
            .bind(&self.scope)
            .bind(clamp_int(from_block))
            .bind(clamp_int(to_block))
            .fetch_all(self.client.pool())
            .await?;

        rows.into_iter().map(|row| row.into_record(event_name, &table)).collect()
    }

    /// Creates the table for `event_name` on first use and returns its name.
    async fn ensure_event_table(&self, event_name: &str) -> Result<String, StoreError> {
        if !is_solidity_identifier(event_name) {
            return Err(StoreError::InvalidEventName(event_name.to_owned()));
        }
        let table = format!("events_{event_name}");

        let known =
            self.event_tables.lock().unwrap_or_else(PoisonError::into_inner).contains(&table);
        if known {
            return Ok(table);
        }

        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                scope TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash BLOB NOT NULL,
                transaction_hash BLOB NOT NULL,
                log_index INTEGER NOT NULL,
                fields TEXT NOT NULL,
                PRIMARY KEY (scope, block_number, log_index)
            )
            "#
        );
        sqlx::query(&query).execute(self.client.pool()).await?;
        debug!(table = %table, "Event table ready");

        self.event_tables.lock().unwrap_or_else(PoisonError::into_inner).insert(table.clone());
        Ok(table)
    }
}

fn sql_int(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange(value))
}

fn clamp_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_solidity_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
