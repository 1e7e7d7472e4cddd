// File-backed ErrorLog
//
// One append-only file per queue, `<dir>/<queue>.errors`, one record per
// line: `<RFC 3339 UTC timestamp>\t<JSON event>`.

use async_trait::async_trait;
use courier_core::domain::{Event, QueueName};
use courier_core::error::{AppError, Result};
use courier_core::port::{ErrorLog, TimeProvider};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct FileErrorLog {
    dir: PathBuf,
    time_provider: Arc<dyn TimeProvider>,
}

impl FileErrorLog {
    pub fn new(dir: impl Into<PathBuf>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            dir: dir.into(),
            time_provider,
        }
    }

    pub fn path_for(&self, queue: &QueueName) -> PathBuf {
        self.dir.join(format!("{}.errors", queue))
    }

    /// Parse a queue's error file back into events, oldest first.
    /// A queue that never failed has no file and yields no events.
    pub async fn read_events(&self, queue: &QueueName) -> Result<Vec<Event>> {
        let path = self.path_for(queue);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| -> Result<Event> {
                let (_, json) = line.split_once('\t').ok_or_else(|| {
                    AppError::Internal(format!(
                        "Malformed record at {}:{}",
                        path.display(),
                        index + 1
                    ))
                })?;
                Ok(serde_json::from_str::<Event>(json)?)
            })
            .collect()
    }

    /// Move a queue's error file aside (`<queue>.errors.<millis>`) so new
    /// failures start a fresh file. Returns the archived path, if any.
    pub async fn archive(&self, queue: &QueueName) -> Result<Option<PathBuf>> {
        let path = self.path_for(queue);
        let archived = self.dir.join(format!(
            "{}.errors.{}",
            queue,
            self.time_provider.now_millis()
        ));

        match tokio::fs::rename(&path, &archived).await {
            Ok(()) => Ok(Some(archived)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ErrorLog for FileErrorLog {
    async fn append(&self, queue: &QueueName, event: &Event) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(queue);
        let line = format!("{}\t{}\n", self.time_provider.now_rfc3339(), event.to_json());

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(queue = %queue, path = %path.display(), "Appended failed event");
        Ok(())
    }
}
