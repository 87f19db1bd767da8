//! Queue table operations via direct SQLx.
//!
//! The queue table needs an `id` column and a text `query` column. Ids are
//! read as text and bound back as text, so any id type the store can cast
//! works.

use super::Db;
use crate::config::QueueTable;
use crate::engine::{QueueSession, QueueStore};
use crate::error::{Result, StoreError};
use crate::model::{WorkItem, WorkItemId};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use sqlx::Connection;
use sqlx::mysql::MySqlConnection;

/// The queue table of one schema, as seen by the drain loop.
#[derive(Clone)]
pub struct MySqlQueue {
    db: Db,
    table: QueueTable,
}

/// One cycle's connection to the queue table.
pub struct MySqlQueueSession {
    conn: MySqlConnection,
    table: QueueTable,
}

impl MySqlQueue {
    pub fn new(db: Db, table: QueueTable) -> Self {
        Self { db, table }
    }

    /// Insert a new row. Returns the id the store assigned.
    pub async fn submit(&self, query: &str) -> Result<WorkItemId> {
        let mut conn = self.db.connect().await?;
        let sql = format!("INSERT INTO {} (`query`) VALUES (?)", self.table.quoted());
        let result = sqlx::query(&sql).bind(query).execute(&mut conn).await?;
        conn.close().await?;
        record_operation("submit", "ok");
        Ok(WorkItemId(result.last_insert_id().to_string()))
    }

    /// All pending rows, without executing them.
    pub async fn pending(&self) -> Result<Vec<WorkItem>> {
        let mut session = self.open().await?;
        let items = session.fetch_pending().await?;
        session.close().await?;
        Ok(items)
    }
}

impl QueueStore for MySqlQueue {
    type Session = MySqlQueueSession;

    async fn open(&self) -> Result<MySqlQueueSession> {
        let conn = self.db.connect().await?;
        Ok(MySqlQueueSession {
            conn,
            table: self.table.clone(),
        })
    }
}

impl QueueSession for MySqlQueueSession {
    async fn fetch_pending(&mut self) -> Result<Vec<WorkItem>> {
        let sql = format!(
            "SELECT CAST(id AS CHAR), `query` FROM {}",
            self.table.quoted()
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .fetch_all(&mut self.conn)
            .await
            .inspect_err(|_| record_operation("fetch", "error"))?;
        record_operation("fetch", "ok");
        metrics::items_fetched().add(rows.len() as u64, &[]);

        Ok(rows
            .into_iter()
            .map(|(id, query)| WorkItem::new(WorkItemId(id), query))
            .collect())
    }

    /// Runs over the text protocol so the statement goes to the server
    /// exactly as stored, terminator included.
    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StoreError> {
        match sqlx::raw_sql(statement).execute(&mut self.conn).await {
            Ok(_) => {
                record_operation("execute", "ok");
                Ok(())
            }
            Err(e) => {
                record_operation("execute", "error");
                Err(StoreError::from(e))
            }
        }
    }

    async fn delete(&mut self, id: &WorkItemId) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table.quoted());
        sqlx::query(&sql)
            .bind(id.0.as_str())
            .execute(&mut self.conn)
            .await
            .inspect_err(|_| record_operation("delete", "error"))?;
        record_operation("delete", "ok");
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

fn record_operation(operation: &'static str, result: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", result),
        ],
    );
}
