//! JSON-file session holder.
//!
//! The whole key/value map lives in one JSON object. Every write rewrites
//! the map to a sibling temp file and renames it over the original, so a
//! crash mid-write leaves either the old or the new map. On Unix the file
//! is created owner-read/write only.

use super::SessionHolder;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct FileSessionHolder {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileSessionHolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> anyhow::Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file {}", self.path.display())
                })
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                tracing::warn!(path = %self.path.display(), "Session file is corrupt, starting empty");
                Ok(Map::new())
            }
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(map)?;

        // A leftover temp file would keep its old mode; start from scratch.
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove stale {}", tmp.display()))
            }
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionHolder for FileSessionHolder {
    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value);
        self.write_map(&map).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
