use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;

use crate::storage::buffer::Sample;

/// A single durable slot holding the serialized buffer.
pub trait SnapshotStore {
    /// Read the slot. A missing slot is an empty snapshot, not an error.
    fn load(&self) -> impl Future<Output = anyhow::Result<Vec<Sample>>> + Send;

    /// Replace the slot contents with `samples`.
    fn save(&self, samples: &[Sample]) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Snapshot slot backed by one JSON file under the data directory.
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    /// Slot `<data_dir>/<slot>.json`.
    pub fn new(data_dir: &Path, slot: &str) -> Self {
        Self {
            path: data_dir.join(format!("{slot}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshot {
    async fn load(&self) -> anyhow::Result<Vec<Sample>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading snapshot {}", self.path.display()))
            }
        };
        let values: Vec<serde_json::Value> = serde_json::from_slice(&data)
            .with_context(|| format!("decoding snapshot {}", self.path.display()))?;
        let (samples, skipped) = Sample::decode_lenient(values);
        if skipped > 0 {
            tracing::warn!(skipped, path = %self.path.display(), "dropped malformed snapshot entries");
        }
        Ok(samples)
    }

    async fn save(&self, samples: &[Sample]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(samples)?;

        // write next to the slot, then rename over it so readers never see a torn file
        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .await
            .with_context(|| format!("opening {}", tmp.display()))?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing snapshot {}", self.path.display()))?;
        Ok(())
    }
}
