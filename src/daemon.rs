//! Process lifecycle for `queryd run`: working directory, single-instance
//! lock and stop signals.
//!
//! The process stays in the foreground; detaching, restarting and output
//! capture are the service manager's job (see `deploy/queryd.service`).

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Exclusive advisory lock on the lock file, holding our pid.
///
/// Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    /// The lock lives as long as this descriptor stays open.
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Try to become the only instance for `path`.
    ///
    /// Returns `Ok(None)` if another process already holds the lock. On
    /// success the file is truncated and rewritten with this process's pid.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o640)
            .open(&path)
            .map_err(|e| Error::Lock(format!("cannot open {}: {e}", path.display())))?;

        // SAFETY: the fd is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Ok(None);
            }
            return Err(Error::Lock(format!("cannot lock {}: {err}", path.display())));
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Some(Self { _file: file, path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Change into the daemon's working directory. Relative lock and log paths
/// resolve against it afterwards.
pub fn enter_work_dir(dir: &Path) -> Result<()> {
    std::env::set_current_dir(dir).map_err(|e| {
        Error::Other(format!(
            "cannot change to working directory {}: {e}",
            dir.display()
        ))
    })
}

/// Why [`supervise`] returned without the work finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Terminate,
    Interrupt,
}

/// Drive `work` until it finishes or a stop signal arrives.
///
/// SIGHUP is logged and otherwise ignored. SIGTERM and SIGINT are logged
/// and end supervision at once; `work` is dropped mid-flight, so nothing
/// after the current await point runs.
pub async fn supervise<F>(work: F) -> Result<Option<Stop>>
where
    F: Future<Output = Result<()>>,
{
    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::pin!(work);

    loop {
        tokio::select! {
            result = &mut work => return result.map(|()| None),
            _ = hangup.recv() => info!("hangup signal caught"),
            _ = terminate.recv() => {
                warn!("terminate signal caught");
                return Ok(Some(Stop::Terminate));
            }
            _ = interrupt.recv() => {
                warn!("interrupt signal caught");
                return Ok(Some(Stop::Interrupt));
            }
        }
    }
}

/// How [`run_exclusive`] ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Another process holds the lock; the work was never started.
    AlreadyRunning,
    /// The work returned on its own.
    Finished,
    /// A stop signal ended the work.
    Stopped(Stop),
}

/// Take the instance lock at `lock_path`, then [`supervise`] `work` while
/// holding it.
///
/// A lock held elsewhere is not an error: `work` is dropped unpolled and
/// nothing is logged. Lock failures and errors from `work` are logged
/// before they are returned.
pub async fn run_exclusive<F>(lock_path: &Path, work: F) -> Result<Outcome>
where
    F: Future<Output = Result<()>>,
{
    let _lock = match InstanceLock::acquire(lock_path) {
        Ok(Some(lock)) => lock,
        Ok(None) => return Ok(Outcome::AlreadyRunning),
        Err(e) => {
            error!("{e}");
            return Err(e);
        }
    };

    match supervise(work).await {
        Ok(Some(stop)) => {
            info!(?stop, "daemon exiting");
            Ok(Outcome::Stopped(stop))
        }
        Ok(None) => Ok(Outcome::Finished),
        Err(e) => {
            error!("fatal: {e}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queryd.lock");
        std::fs::write(&path, "stale contents that are longer than a pid\n").unwrap();

        let lock = InstanceLock::acquire(&path).unwrap().expect("lock acquired");
        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));
    }

    #[test]
    fn second_acquire_reports_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queryd.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(InstanceLock::acquire(&path).unwrap().is_none());

        // The losing attempt must not clobber the holder's pid.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        drop(first);
        assert!(InstanceLock::acquire(&path).unwrap().is_some());
    }

    #[test]
    fn lock_in_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("queryd.lock");
        assert!(matches!(InstanceLock::acquire(&path), Err(Error::Lock(_))));
    }
}
