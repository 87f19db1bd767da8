//! Queue drain loop: fetch every pending row, execute it, delete it, sleep.
//!
//! Delivery is at-least-once. A row is deleted after its statement has been
//! issued whether or not the statement succeeded, so a statement that always
//! fails is dropped after one attempt and never retried. A crash between the
//! execute and the delete re-runs the statement after restart.

use super::store::{QueueSession, QueueStore};
use crate::error::{Result, display_code, display_state};
use crate::model::WorkItem;
use crate::telemetry::{logfile, metrics};
use crate::telemetry::work::{record_outcome, start_cycle_span, start_work_span};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, info, warn};

/// Configuration for the drain loop.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Pause between the end of one cycle and the next fetch.
    pub poll_interval: Duration,
    /// Log file size that triggers a warning after a cycle.
    pub log_size_warn_bytes: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval: crate::config::DEFAULT_POLL_INTERVAL,
            log_size_warn_bytes: crate::config::DEFAULT_LOG_SIZE_WARN_BYTES,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deleted: usize,
}

/// The drain loop over a [`QueueStore`].
pub struct QueueDrain<S> {
    store: S,
    config: DrainConfig,
    log_file: Option<PathBuf>,
}

impl<S: QueueStore> QueueDrain<S> {
    pub fn new(store: S, config: DrainConfig) -> Self {
        Self {
            store,
            config,
            log_file: None,
        }
    }

    /// Check the size of the log file at `path` after each cycle.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Run cycles forever. Returns only when a cycle fails outside the
    /// per-row scope (connect, fetch or delete).
    pub async fn run(&self) -> Result<()> {
        info!(
            interval_secs = self.config.poll_interval.as_secs_f64(),
            "drain loop started"
        );
        loop {
            self.run_cycle().await?;
            self.check_log_size();
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One pass: open a session, drain everything fetched, close it.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let span = start_cycle_span();
        let started = Instant::now();

        let report = async {
            let mut session = self.store.open().await?;
            let items = session.fetch_pending().await?;

            let mut report = CycleReport {
                fetched: items.len(),
                ..CycleReport::default()
            };
            if items.is_empty() {
                debug!("queue empty");
            }

            for item in &items {
                self.process_item(&mut session, item, &mut report).await?;
            }

            if let Err(e) = session.close().await {
                warn!("closing store session: {e}");
            }
            Ok::<_, crate::error::Error>(report)
        }
        .instrument(span)
        .await?;

        metrics::cycle_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        if report.fetched > 0 {
            info!(
                fetched = report.fetched,
                succeeded = report.succeeded,
                failed = report.failed,
                "cycle complete"
            );
        }
        Ok(report)
    }

    async fn process_item(
        &self,
        session: &mut S::Session,
        item: &WorkItem,
        report: &mut CycleReport,
    ) -> Result<()> {
        let span = start_work_span(&item.id);
        async {
            let statement = item.statement();
            info!(id = %item.id, "executing: {statement}");

            match session.execute(&statement).await {
                Ok(()) => {
                    report.succeeded += 1;
                    record_outcome(&span, "ok");
                }
                Err(e) => {
                    report.failed += 1;
                    record_outcome(&span, "error");
                    error!(
                        id = %item.id,
                        code = %display_code(&e.code),
                        sql_state = %display_state(&e.sql_state),
                        "query failed: {}",
                        e.message
                    );
                }
            }

            session.delete(&item.id).await?;
            report.deleted += 1;
            Ok::<(), crate::error::Error>(())
        }
        .instrument(span.clone())
        .await
    }

    fn check_log_size(&self) {
        let Some(ref path) = self.log_file else {
            return;
        };
        match logfile::exceeds(path, self.config.log_size_warn_bytes) {
            Ok(true) => warn!(
                path = %path.display(),
                limit = self.config.log_size_warn_bytes,
                "log file over size limit; it is not rotated"
            ),
            Ok(false) => {}
            Err(e) => warn!("checking log file size: {e}"),
        }
    }
}
