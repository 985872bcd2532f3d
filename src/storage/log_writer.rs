//! Bounded queue with a single background consumer writing JSON lines.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::LogWriterConfig;
use crate::observability::metrics;

/// One persisted line: `{"ts", "uri", "value", "user_id"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub uri: String,
    pub value: Number,
    pub user_id: String,
}

#[derive(Debug, Error)]
pub enum LogWriterError {
    #[error("log writer is shutting down")]
    Closed,

    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File name for the given UTC day.
pub fn log_file_name(date: NaiveDate) -> String {
    format!("metrics-{}.jsonl", date.format("%Y%m%d"))
}

/// State shared between producers, the consumer and the shutdown path.
#[derive(Debug, Default)]
struct Shared {
    accepting: AtomicBool,
    pending: AtomicUsize,
    drained: Notify,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn finish_one(&self) {
        let left = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_queue_depth(left);
        if left == 0 {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            // Registered before the check so a concurrent notify is not lost.
            let notified = self.drained.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Producer side. Cheap to clone; one per connection handler.
#[derive(Debug, Clone)]
pub struct LogWriter {
    tx: mpsc::Sender<LogEntry>,
    shared: Arc<Shared>,
}

impl LogWriter {
    /// Create the log directory and start the consumer task.
    pub fn spawn(
        config: &LogWriterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(LogWriter, LogWriterHandle), LogWriterError> {
        std::fs::create_dir_all(&config.directory).map_err(|source| LogWriterError::CreateDir {
            path: config.directory.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            accepting: AtomicBool::new(true),
            ..Shared::default()
        });

        let consumer = Consumer {
            directory: config.directory.clone(),
            clock,
            shared: Arc::clone(&shared),
            file: None,
        };
        let task = tokio::spawn(consumer.run(rx, cancel_rx));

        tracing::info!(
            directory = %config.directory.display(),
            capacity = config.queue_capacity,
            "Log writer started"
        );

        Ok((
            LogWriter {
                tx,
                shared: Arc::clone(&shared),
            },
            LogWriterHandle {
                shared,
                cancel: cancel_tx,
                task,
                drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            },
        ))
    }

    /// Queue an entry for the consumer. Waits only for queue space.
    pub async fn append(&self, entry: LogEntry) -> Result<(), LogWriterError> {
        // Counted before the flag check: a drain that starts after this point
        // waits for the entry, one that started before is seen here.
        let depth = self.shared.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.shared.accepting.load(Ordering::SeqCst) {
            self.shared.finish_one();
            return Err(LogWriterError::Closed);
        }

        if self.tx.send(entry).await.is_err() {
            self.shared.finish_one();
            return Err(LogWriterError::Closed);
        }
        metrics::record_queue_depth(depth);
        Ok(())
    }

    /// Entries queued but not yet written or dropped.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> u64 {
        self.shared.written.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::SeqCst)
    }
}

/// Outcome of [`LogWriterHandle::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// The queue emptied before the timeout.
    pub drained: bool,
    /// Entries still queued when the consumer was cancelled.
    pub abandoned: usize,
}

/// Owner side: stops the writer.
#[derive(Debug)]
pub struct LogWriterHandle {
    shared: Arc<Shared>,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
    drain_timeout: Duration,
}

impl LogWriterHandle {
    /// Stop accepting, wait for the queue to drain (bounded), then cancel the
    /// consumer and wait for it to exit.
    pub async fn shutdown(self) -> DrainReport {
        self.shared.accepting.store(false, Ordering::SeqCst);

        let drained = tokio::time::timeout(self.drain_timeout, self.shared.wait_drained())
            .await
            .is_ok();
        // Once drained, any count left is a rejected append backing out.
        let abandoned = if drained {
            0
        } else {
            self.shared.pending.load(Ordering::SeqCst)
        };
        if !drained {
            tracing::warn!(
                pending = abandoned,
                timeout_secs = self.drain_timeout.as_secs_f64(),
                "Log queue did not drain before timeout, abandoning remaining entries"
            );
        }

        let _ = self.cancel.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Log writer task failed");
        }

        tracing::info!(
            written = self.shared.written.load(Ordering::SeqCst),
            dropped = self.shared.dropped.load(Ordering::SeqCst),
            "Log writer stopped"
        );
        DrainReport { drained, abandoned }
    }
}

struct Consumer {
    directory: PathBuf,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    file: Option<(NaiveDate, File)>,
}

impl Consumer {
    async fn run(mut self, mut rx: mpsc::Receiver<LogEntry>, mut cancel: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => break,
                next = rx.recv() => match next {
                    Some(entry) => {
                        // Not a select branch: cancellation only lands between entries.
                        self.write(&entry).await;
                        self.shared.finish_one();
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("Log writer consumer exited");
    }

    async fn write(&mut self, entry: &LogEntry) {
        match self.try_write(entry).await {
            Ok(()) => {
                self.shared.written.fetch_add(1, Ordering::SeqCst);
                metrics::record_log_entry("written");
            }
            Err(e) => {
                // Reopen on the next entry.
                self.file = None;
                self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                metrics::record_log_entry("dropped");
                tracing::warn!(uri = %entry.uri, error = %e, "Failed to persist metric, entry dropped");
            }
        }
    }

    async fn try_write(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let today = self.clock.now().date_naive();
        if !matches!(&self.file, Some((date, _)) if *date == today) {
            let path = self.directory.join(log_file_name(today));
            let file = open_append(&path).await?;
            tracing::debug!(path = %path.display(), "Opened metric log");
            self.file = Some((today, file));
        }

        if let Some((_, file)) = self.file.as_mut() {
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}
