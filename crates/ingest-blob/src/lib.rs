//! ingest-blob
//!
//! Watermark Store : one object per feed at
//! `watermarks/{feed}.json`. The trait is storage-agnostic; the
//! reference implementation here is filesystem-backed, standing in for
//! an object store (S3/GCS).

use async_trait::async_trait;
use ingest_schemas::{IngestError, IngestResult, Watermark};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait WatermarkStore: Send + Sync {
 async fn read(&self, feed: &str) -> IngestResult<Option<Watermark>>;
 async fn write(&self, feed: &str, watermark: &Watermark) -> IngestResult<()>;
}

/// Filesystem-backed watermark store rooted at a base directory, one file
/// per feed (`{base}/watermarks/{feed}.json`). Writes go through a
/// temp-file-then-rename so a reader never observes a half-written file.
pub struct FsWatermarkStore {
 base_dir: PathBuf,
}

impl FsWatermarkStore {
 pub fn new(base_dir: impl Into<PathBuf>) -> Self {
 Self {
 base_dir: base_dir.into(),
 }
 }

 fn path_for(&self, feed: &str) -> PathBuf {
 self.base_dir.join("watermarks").join(format!("{feed}.json"))
 }
}

#[async_trait]
impl WatermarkStore for FsWatermarkStore {
 async fn read(&self, feed: &str) -> IngestResult<Option<Watermark>> {
 let path = self.path_for(feed);
 match tokio::fs::read(&path).await {
 Ok(bytes) => {
 let watermark = serde_json::from_slice(&bytes)
 .map_err(|e| IngestError::Fatal(format!("corrupt watermark at {}: {e}", path.display())))?;
 Ok(Some(watermark))
 }
 Err(e) if e.kind == std::io::ErrorKind::NotFound => Ok(None),
 Err(e) => Err(IngestError::Transient(e.to_string())),
 }
 }

 async fn write(&self, feed: &str, watermark: &Watermark) -> IngestResult<()> {
 let path = self.path_for(feed);
 let dir = path.parent().unwrap_or_else(|| Path::new("."));
 tokio::fs::create_dir_all(dir)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;

 let tmp_path = path.with_extension("json.tmp");
 let body = serde_json::to_vec_pretty(watermark)
 .map_err(|e| IngestError::Fatal(format!("watermark serialize failed: {e}")))?;

 let mut file = tokio::fs::File::create(&tmp_path)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 file.write_all(&body)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 file.flush().await.map_err(|e| IngestError::Transient(e.to_string()))?;
 drop(file);

 tokio::fs::rename(&tmp_path, &path)
 .await
 .map_err(|e| IngestError::Transient(e.to_string()))?;
 Ok(())
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[tokio::test]
 async fn read_missing_feed_returns_none() {
 let dir = tempfile::tempdir().unwrap();
 let store = FsWatermarkStore::new(dir.path());
 assert!(store.read("demo").await.unwrap().is_none());
 }

 #[tokio::test]
 async fn write_then_read_round_trips() {
 let dir = tempfile::tempdir().unwrap();
 let store = FsWatermarkStore::new(dir.path());

 let watermark = Watermark {
 last_updated_at: chrono::Utc::now(),
 last_run_id: Some(uuid::Uuid::new_v4()),
 last_run_completed_at: Some(chrono::Utc::now()),
 };

 store.write("demo", &watermark).await.unwrap();
 let read_back = store.read("demo").await.unwrap().unwrap();
 assert_eq!(read_back, watermark);
 }

 #[tokio::test]
 async fn write_is_single_writer_and_overwrites_in_full() {
 let dir = tempfile::tempdir().unwrap();
 let store = FsWatermarkStore::new(dir.path());

 let first = Watermark {
 last_updated_at: chrono::Utc::now(),
 last_run_id: Some(uuid::Uuid::new_v4()),
 last_run_completed_at: None,
 };
 store.write("demo", &first).await.unwrap();

 let second = Watermark {
 last_updated_at: chrono::Utc::now() + chrono::Duration::seconds(1),
 last_run_id: Some(uuid::Uuid::new_v4()),
 last_run_completed_at: Some(chrono::Utc::now()),
 };
 store.write("demo", &second).await.unwrap();

 let read_back = store.read("demo").await.unwrap().unwrap();
 assert_eq!(read_back, second);
 }
}
