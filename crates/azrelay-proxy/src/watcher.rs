//! Domain file change detection.
//!
//! A poll loop compares the file's mtime against the last value seen and
//! fires the callback on change. The recorded mtime is updated before the
//! callback runs, so a failing callback is not retried on the next tick;
//! the next actual edit triggers it again.

use crate::error::Result;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ChangeWatcher {
    handle: Option<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Watch `path`, invoking `on_change` whenever its mtime moves.
    ///
    /// A file that does not exist when watching begins is logged and
    /// ignored; the returned watcher then does nothing.
    pub fn start<F, Fut>(path: PathBuf, on_change: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::start_with_interval(path, POLL_INTERVAL, on_change)
    }

    fn start_with_interval<F, Fut>(path: PathBuf, interval: Duration, mut on_change: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let Some(mut last_seen) = mtime(&path) else {
            warn!(path = %path.display(), "domain file does not exist, not watching it");
            return Self { handle: None };
        };

        info!(path = %path.display(), "watching domain file for changes");
        let handle = tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let Some(current) = mtime(&path) else {
                    warn!(path = %path.display(), "domain file unreadable, skipping poll");
                    continue;
                };
                if current == last_seen {
                    continue;
                }
                last_seen = current;
                info!(path = %path.display(), "domain file changed");
                if let Err(e) = on_change().await {
                    warn!(error = %e, "domain file change handler failed");
                }
            }
        });
        Self { handle: Some(handle) }
    }

    /// Cancel the poll loop and wait for it to wind down.
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

fn mtime(path: &PathBuf) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
