//! Drain loop behavior against an in-memory queue store.

use queryd::engine::{CycleReport, DrainConfig, QueueDrain, QueueSession, QueueStore};
use queryd::error::{Error, Result, StoreError};
use queryd::model::{WorkItem, WorkItemId};
use queryd::telemetry::logfile;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::instrument::WithSubscriber as _;
use tracing_subscriber::layer::SubscriberExt as _;

#[derive(Default)]
struct FakeState {
    rows: Vec<WorkItem>,
    failing: HashSet<String>,
    executed: Vec<String>,
    deleted: Vec<WorkItemId>,
    opens: usize,
    closes: usize,
    /// Opens beyond this count fail like an unreachable server.
    max_opens: Option<usize>,
    /// Deleting this id fails.
    undeletable: Option<WorkItemId>,
    /// Executing this statement fails without server diagnostics.
    client_failure: Option<String>,
}

#[derive(Clone, Default)]
struct FakeStore {
    state: Arc<Mutex<FakeState>>,
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

impl FakeStore {
    fn with_rows(rows: &[(i64, &str)]) -> Self {
        let store = Self::default();
        for &(id, query) in rows {
            store.push(id, query);
        }
        store
    }

    fn push(&self, id: i64, query: &str) {
        self.state.lock().unwrap().rows.push(WorkItem::new(id, query));
    }

    fn fail_statement(&self, statement: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(statement.to_string());
    }

    fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    fn deleted(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .deleted
            .iter()
            .map(|id| id.0.clone())
            .collect()
    }

    fn remaining(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }
}

impl QueueStore for FakeStore {
    type Session = FakeSession;

    async fn open(&self) -> Result<FakeSession> {
        let mut state = self.state.lock().unwrap();
        if state.max_opens.is_some_and(|max| state.opens >= max) {
            return Err(StoreError::new("Can't connect to MySQL server")
                .with_code(2003, "HY000")
                .into());
        }
        state.opens += 1;
        Ok(FakeSession {
            state: Arc::clone(&self.state),
        })
    }
}

impl QueueSession for FakeSession {
    async fn fetch_pending(&mut self) -> Result<Vec<WorkItem>> {
        Ok(self.state.lock().unwrap().rows.clone())
    }

    async fn execute(&mut self, statement: &str) -> std::result::Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(statement.to_string());
        if state.client_failure.as_deref() == Some(statement) {
            return Err(StoreError::new("Lost connection to MySQL server during query"));
        }
        if state.failing.contains(statement) {
            return Err(
                StoreError::new("You have an error in your SQL syntax").with_code(1064, "42000")
            );
        }
        Ok(())
    }

    async fn delete(&mut self, id: &WorkItemId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.undeletable.as_ref() == Some(id) {
            return Err(StoreError::new("Lock wait timeout exceeded")
                .with_code(1205, "HY000")
                .into());
        }
        state.rows.retain(|row| &row.id != id);
        state.deleted.push(id.clone());
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

fn drain(store: &FakeStore) -> QueueDrain<FakeStore> {
    QueueDrain::new(
        store.clone(),
        DrainConfig {
            poll_interval: Duration::from_secs(10),
            ..DrainConfig::default()
        },
    )
}

/// Subscriber writing the daemon's log format to `path`, unbuffered.
fn log_to(path: &Path) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(logfile::layer(logfile::appender(path).unwrap()))
}

fn log_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Single cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_statement_is_logged_and_row_still_deleted() {
    let store = FakeStore::with_rows(&[(1, "UPDATE t SET x=1"), (2, "INVALID SYNTAX")]);
    store.fail_statement("INVALID SYNTAX;");

    let report = drain(&store).run_cycle().await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            fetched: 2,
            succeeded: 1,
            failed: 1,
            deleted: 2,
        }
    );
    assert_eq!(store.executed(), vec!["UPDATE t SET x=1;", "INVALID SYNTAX;"]);
    assert_eq!(store.deleted(), vec!["1", "2"]);
    assert_eq!(store.remaining(), 0);
}

#[tokio::test]
async fn failure_does_not_block_later_rows() {
    let store = FakeStore::with_rows(&[
        (10, "DROP TABLE missing"),
        (11, "INSERT INTO log VALUES (1)"),
        (12, "INSERT INTO log VALUES (2)"),
    ]);
    store.fail_statement("DROP TABLE missing;");

    let report = drain(&store).run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 2);
    assert_eq!(
        store.executed(),
        vec![
            "DROP TABLE missing;",
            "INSERT INTO log VALUES (1);",
            "INSERT INTO log VALUES (2);",
        ]
    );
    assert_eq!(store.deleted(), vec!["10", "11", "12"]);
}

#[tokio::test]
async fn empty_queue_executes_and_deletes_nothing() {
    let store = FakeStore::default();

    let report = drain(&store).run_cycle().await.unwrap();

    assert_eq!(report, CycleReport::default());
    assert!(store.executed().is_empty());
    assert!(store.deleted().is_empty());
    let state = store.state.lock().unwrap();
    assert_eq!(state.opens, 1);
    assert_eq!(state.closes, 1);
}

#[tokio::test]
async fn duplicate_statements_run_independently() {
    let store = FakeStore::with_rows(&[(3, "UPDATE c SET n=n+1"), (4, "UPDATE c SET n=n+1")]);

    let report = drain(&store).run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(store.executed().len(), 2);
    assert_eq!(store.deleted(), vec!["3", "4"]);
}

#[tokio::test]
async fn rows_run_in_fetch_order() {
    let store = FakeStore::with_rows(&[(9, "SELECT 9"), (2, "SELECT 2"), (5, "SELECT 5")]);

    drain(&store).run_cycle().await.unwrap();

    assert_eq!(store.executed(), vec!["SELECT 9;", "SELECT 2;", "SELECT 5;"]);
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_failure_is_fatal() {
    let store = FakeStore::with_rows(&[(1, "SELECT 1")]);
    store.state.lock().unwrap().max_opens = Some(0);

    let err = drain(&store).run_cycle().await.unwrap_err();

    match err {
        Error::Store(e) => {
            assert_eq!(e.code, Some(2003));
            assert_eq!(e.sql_state.as_deref(), Some("HY000"));
        }
        other => panic!("expected store error, got {other:?}"),
    }
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn delete_failure_is_fatal_and_stops_the_cycle() {
    let store = FakeStore::with_rows(&[(1, "SELECT 1"), (2, "SELECT 2")]);
    store.state.lock().unwrap().undeletable = Some(WorkItemId::from(1));

    let result = drain(&store).run_cycle().await;

    assert!(matches!(result, Err(Error::Store(_))));
    assert_eq!(store.executed(), vec!["SELECT 1;"]);
    assert_eq!(store.remaining(), 2);
}

// ---------------------------------------------------------------------------
// Log output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_statement_is_written_to_log_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queryd.log");
    let store = FakeStore::with_rows(&[(1, "UPDATE t SET x=1"), (2, "INVALID SYNTAX")]);
    store.fail_statement("INVALID SYNTAX;");

    drain(&store)
        .run_cycle()
        .with_subscriber(log_to(&path))
        .await
        .unwrap();

    let lines = log_lines(&path);
    let failures: Vec<&String> = lines.iter().filter(|l| l.contains("ERROR")).collect();
    assert_eq!(failures.len(), 1, "log: {lines:#?}");
    let line = failures[0];
    assert!(line.starts_with('['), "line: {line}");
    assert!(
        line.contains("]>ERROR query failed: You have an error in your SQL syntax"),
        "line: {line}"
    );
    assert!(line.contains("id=2"), "line: {line}");
    assert!(line.contains("code=1064"), "line: {line}");
    assert!(line.contains("sql_state=42000"), "line: {line}");

    // Both statements are logged as they are issued, terminator included.
    assert!(lines.iter().any(|l| l.contains("executing: UPDATE t SET x=1; id=1")));
    assert!(lines.iter().any(|l| l.contains("executing: INVALID SYNTAX; id=2")));
}

#[tokio::test]
async fn client_side_failure_logs_placeholder_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queryd.log");
    let store = FakeStore::with_rows(&[(7, "SELECT 7")]);
    store.state.lock().unwrap().client_failure = Some("SELECT 7;".to_string());

    drain(&store)
        .run_cycle()
        .with_subscriber(log_to(&path))
        .await
        .unwrap();

    let lines = log_lines(&path);
    let line = lines
        .iter()
        .find(|l| l.contains("ERROR query failed"))
        .expect("failure logged");
    assert!(line.contains("id=7 code=- sql_state=-"), "line: {line}");
    assert_eq!(store.deleted(), vec!["7"]);
}

#[tokio::test]
async fn oversized_log_file_triggers_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queryd.log");
    std::fs::write(&path, "x".repeat(64)).unwrap();
    let store = FakeStore::with_rows(&[(1, "SELECT 1")]);
    store.state.lock().unwrap().max_opens = Some(1);

    let drain = QueueDrain::new(
        store.clone(),
        DrainConfig {
            poll_interval: Duration::from_millis(1),
            log_size_warn_bytes: 16,
        },
    )
    .with_log_file(&path);
    let result = drain.run().with_subscriber(log_to(&path)).await;

    assert!(matches!(result, Err(Error::Store(_))));
    let lines = log_lines(&path);
    assert!(
        lines
            .iter()
            .any(|l| l.contains("WARN log file over size limit") && l.contains("limit=16")),
        "log: {lines:#?}"
    );
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rows_added_between_cycles_are_picked_up_next_cycle() {
    let store = FakeStore::with_rows(&[(1, "SELECT 1")]);
    let drain = drain(&store);

    assert_eq!(drain.run_cycle().await.unwrap().fetched, 1);
    store.push(2, "SELECT 2");
    assert_eq!(drain.run_cycle().await.unwrap().fetched, 1);
    assert_eq!(drain.run_cycle().await.unwrap().fetched, 0);

    assert_eq!(store.deleted(), vec!["1", "2"]);
    assert_eq!(store.state.lock().unwrap().opens, 3);
}

#[tokio::test(start_paused = true)]
async fn run_pauses_between_cycles_and_stops_on_connect_failure() {
    let store = FakeStore::with_rows(&[(1, "SELECT 1")]);
    store.state.lock().unwrap().max_opens = Some(3);

    let started = tokio::time::Instant::now();
    let result = drain(&store).run().await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(Error::Store(_))));
    // Three good cycles, a pause after each, then the failing fourth open.
    assert_eq!(store.state.lock().unwrap().opens, 3);
    assert!(elapsed >= Duration::from_secs(30), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(31), "elapsed {elapsed:?}");
    assert_eq!(store.executed(), vec!["SELECT 1;"]);
}
