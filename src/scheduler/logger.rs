//! Per-task event log.
//!
//! Workers and the monitor push one-line events through a bounded channel; a
//! single writer task appends them to `logs/<task>_<YYYYMMDD_HH_MM_SS>.log`.
//! Logging never blocks the crawl: when the channel is full the event is
//! dropped.

use std::path::Path;

use chrono::Local;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const LOG_CHANNEL_CAPACITY: usize = 100_000;

/// Cloneable producer handle for task-log events.
#[derive(Clone)]
pub struct TaskLog {
    tx: mpsc::Sender<String>,
}

impl TaskLog {
    /// Record one event line.
    pub fn event(&self, line: impl Into<String>) {
        let _ = self.tx.try_send(line.into());
    }

    /// A handle whose events go nowhere. For tests.
    #[must_use]
    pub fn sink() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

/// Open the task log file and spawn the writer task.
///
/// The writer exits after the last `TaskLog` clone is dropped and the
/// channel drains.
pub async fn spawn_log_writer(
    task_name: &str,
    dir: impl AsRef<Path>,
) -> std::io::Result<(TaskLog, tokio::task::JoinHandle<()>)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).await?;
    let stamp = Local::now().format("%Y%m%d_%H_%M_%S");
    let path = dir.join(format!("{task_name}_{stamp}.log"));
    let mut file = fs::File::create(&path).await?;

    let (tx, mut rx) = mpsc::channel::<String>(LOG_CHANNEL_CAPACITY);
    let task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let stamped = format!("{} | {line}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
            if file.write_all(stamped.as_bytes()).await.is_err() {
                break;
            }
            let _ = file.flush().await;
        }
        let _ = file.flush().await;
    });

    Ok((TaskLog { tx }, task))
}
