//! Core data model.
//!
//! A work item is one row of the queue table: an opaque store-assigned id
//! and the SQL text to run. Producers insert rows; the drain loop executes
//! and deletes them.

/// Statement terminator appended to every queued query before execution.
pub const STATEMENT_TERMINATOR: char = ';';

/// Opaque row identifier, read from the store as text and bound back as
/// text when the row is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItemId(pub String);

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for WorkItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for WorkItemId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// A pending row in the queue table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: WorkItemId,
    /// Statement text as stored, without terminator.
    pub query: String,
}

impl WorkItem {
    pub fn new(id: impl Into<WorkItemId>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
        }
    }

    /// The statement actually sent to the store: the stored text verbatim
    /// plus a terminator.
    pub fn statement(&self) -> String {
        let mut sql = String::with_capacity(self.query.len() + 1);
        sql.push_str(&self.query);
        sql.push(STATEMENT_TERMINATOR);
        sql
    }
}
