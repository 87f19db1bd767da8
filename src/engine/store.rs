//! The seam between the drain loop and the store.

use crate::error::{Result, StoreError};
use crate::model::{WorkItem, WorkItemId};

/// Something that can hand out a fresh session to the queue table.
///
/// The drain loop opens one session per cycle and closes it before the
/// pause.
#[allow(async_fn_in_trait)]
pub trait QueueStore {
    type Session: QueueSession;

    /// Connect and select the schema. Failure here is fatal to the loop.
    async fn open(&self) -> Result<Self::Session>;
}

/// A live connection to the queue table.
#[allow(async_fn_in_trait)]
pub trait QueueSession {
    /// Every row currently in the table, in the store's scan order.
    async fn fetch_pending(&mut self) -> Result<Vec<WorkItem>>;

    /// Run one statement verbatim. Errors are the store's own diagnostics;
    /// the caller decides whether they are fatal.
    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StoreError>;

    async fn delete(&mut self, id: &WorkItemId) -> Result<()>;

    async fn close(self) -> Result<()>;
}
