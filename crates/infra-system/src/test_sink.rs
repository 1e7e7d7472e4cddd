// JSON-lines TestSink: one event per line, appended

use async_trait::async_trait;
use courier_core::domain::{ConsumeError, Event};
use courier_core::port::TestSink;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub struct JsonLinesTestSink {
    path: PathBuf,
}

impl JsonLinesTestSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl TestSink for JsonLinesTestSink {
    async fn write(&self, event: &Event) -> Result<(), ConsumeError> {
        let line = format!("{}\n", event.to_json());
        self.append_line(&line).await.map_err(|e| {
            ConsumeError::Downstream(format!("write to {}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_one_line_per_event() {
        let dir = TempDir::new().unwrap();
        let sink = JsonLinesTestSink::new(dir.path().join("sink").join("test_worker.jsonl"));

        sink.write(&Event::new().with("n", 1)).await.unwrap();
        sink.write(&Event::new().with("n", 2)).await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "{\"n\":1}\n{\"n\":2}\n");
    }
}
