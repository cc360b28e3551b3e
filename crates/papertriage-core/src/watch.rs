//! Inbox watching: the startup scan, filesystem notifications and the
//! sequential processing loop.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Pipeline, ProcessOutcome};

/// Give up waiting for a file to stop growing after this many intervals and
/// process it as it is.
const MAX_SETTLE_CHECKS: u32 = 60;

const EVENT_BUFFER: usize = 256;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to prepare directories: {0}")]
    Directories(#[source] std::io::Error),
    #[error("failed to scan inbox {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("filesystem watcher stopped unexpectedly")]
    WatcherClosed,
}

/// Case-insensitive `.pdf` extension check.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// PDFs currently in `inbox`, sorted by file name.
pub fn scan_inbox(inbox: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(inbox)? {
        let path = entry?.path();
        if path.is_file() && is_pdf(&path) {
            found.push(path);
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

/// Wait until `path` has a non-zero size that stays the same across one
/// `interval`.
///
/// Returns `false` if the file disappeared, `true` once it is stable (or after
/// [`MAX_SETTLE_CHECKS`] intervals). `None` means cancellation was requested.
pub async fn wait_until_stable(
    path: &Path,
    interval: Duration,
    cancel: &CancellationToken,
) -> Option<bool> {
    if interval.is_zero() {
        return Some(path.is_file());
    }
    let size = |p: &Path| std::fs::metadata(p).ok().map(|m| m.len());

    let Some(mut last) = size(path) else {
        return Some(false);
    };
    for _ in 0..MAX_SETTLE_CHECKS {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(interval) => {}
        }
        let Some(now) = size(path) else {
            return Some(false);
        };
        if now == last && now > 0 {
            return Some(true);
        }
        last = now;
    }
    tracing::warn!(
        file = %path.display(),
        "file never settled, processing it anyway"
    );
    Some(true)
}

/// Counts of papers handled during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &ProcessOutcome) {
        if outcome.succeeded() {
            self.processed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.failed
    }
}

/// FIFO of inbox paths waiting to be processed, without duplicates.
#[derive(Default)]
struct WorkQueue {
    order: VecDeque<PathBuf>,
    queued: HashSet<PathBuf>,
}

impl WorkQueue {
    fn push(&mut self, path: PathBuf) {
        if self.queued.insert(path.clone()) {
            self.order.push_back(path);
        }
    }

    fn pop(&mut self) -> Option<PathBuf> {
        let path = self.order.pop_front()?;
        self.queued.remove(&path);
        Some(path)
    }
}

/// Whether an event can mean "a new file is now present".
fn announces_file(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

/// Watches the inbox and drives every arriving PDF through the [`Pipeline`],
/// one file at a time.
pub struct InboxWatcher {
    pipeline: Pipeline,
    settle: Duration,
}

impl InboxWatcher {
    pub fn new(pipeline: Pipeline, settle: Duration) -> Self {
        Self { pipeline, settle }
    }

    /// Run until `cancel` fires.
    ///
    /// Subscribes to the inbox before scanning it so files arriving during
    /// startup are not missed. A file already being processed when
    /// cancellation arrives is finished first.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, WatchError> {
        let dirs = self.pipeline.directories().clone();
        dirs.ensure().map_err(WatchError::Directories)?;

        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(EVENT_BUFFER);
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            if tx.blocking_send(res).is_err() {
                tracing::debug!("watch event dropped, receiver closed");
            }
        })
        .map_err(|source| WatchError::Notify {
            path: dirs.inbox.clone(),
            source,
        })?;
        watcher
            .watch(&dirs.inbox, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: dirs.inbox.clone(),
                source,
            })?;

        let mut queue = WorkQueue::default();
        let existing = scan_inbox(&dirs.inbox).map_err(|source| WatchError::Scan {
            path: dirs.inbox.clone(),
            source,
        })?;
        if !existing.is_empty() {
            tracing::info!(count = existing.len(), "found papers already in the inbox");
        }
        for path in existing {
            queue.push(path);
        }

        tracing::info!(inbox = %dirs.inbox.display(), "watching for new papers");
        let mut summary = RunSummary::default();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Pick up anything that arrived while the last file was processed.
            while let Ok(res) = rx.try_recv() {
                self.enqueue_event(res, &mut queue);
            }

            if let Some(path) = queue.pop() {
                if !path.is_file() {
                    tracing::debug!(file = %path.display(), "skipping path that no longer exists");
                    continue;
                }
                match wait_until_stable(&path, self.settle, &cancel).await {
                    None => break,
                    Some(false) => {
                        tracing::debug!(file = %path.display(), "file vanished before it settled");
                        continue;
                    }
                    Some(true) => {}
                }
                let outcome = self.pipeline.process(&path).await;
                summary.record(&outcome);
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                res = rx.recv() => match res {
                    Some(res) => self.enqueue_event(res, &mut queue),
                    None => return Err(WatchError::WatcherClosed),
                },
            }
        }

        drop(watcher);
        tracing::info!(
            processed = summary.processed,
            failed = summary.failed,
            "watcher stopped"
        );
        Ok(summary)
    }

    fn enqueue_event(&self, res: notify::Result<Event>, queue: &mut WorkQueue) {
        match res {
            Ok(event) if announces_file(&event.kind) => {
                for path in event.paths {
                    if is_pdf(&path) && path.is_file() {
                        queue.push(path);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "watch error"),
        }
    }
}
