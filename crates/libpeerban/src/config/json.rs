use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use super::{AdapterConfig, ConfigStore};

pub const DEFAULT_CONFIG_FILENAME: &str = "peerban_adapter.conf";

/// Keeps the document in a single JSON file.
pub struct JsonConfigStore {
    filename: PathBuf,
}

impl std::fmt::Debug for JsonConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON config: {:?}", self.filename)
    }
}

impl JsonConfigStore {
    pub async fn new(filename: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("couldn't create directory {parent:?} for config"))?;
        }
        Ok(Self { filename })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn load(&self) -> anyhow::Result<AdapterConfig> {
        match tokio::fs::read(&self.filename).await {
            Ok(buf) => serde_json::from_slice(&buf)
                .with_context(|| format!("error deserializing {:?}", self.filename)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(filename=?self.filename, "no config file yet, using defaults");
                Ok(Default::default())
            }
            Err(e) => Err(e).with_context(|| format!("error opening {:?}", self.filename)),
        }
    }

    async fn save(&self, config: &AdapterConfig) -> anyhow::Result<()> {
        let mut tmp_filename = self.filename.clone().into_os_string();
        tmp_filename.push(".tmp");
        let tmp_filename = PathBuf::from(tmp_filename);

        let buf = serde_json::to_vec_pretty(config).context("error serializing")?;
        let mut tmp = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp_filename)
            .await
            .with_context(|| format!("error opening {tmp_filename:?}"))?;
        tmp.write_all(&buf)
            .await
            .with_context(|| format!("error writing {tmp_filename:?}"))?;
        tmp.flush().await?;
        drop(tmp);

        tokio::fs::rename(&tmp_filename, &self.filename)
            .await
            .context("error renaming config file")?;
        trace!(filename=?self.filename, "wrote config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::PersistenceStatus;

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("nested").join(DEFAULT_CONFIG_FILENAME))
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap(), AdapterConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join(DEFAULT_CONFIG_FILENAME);
        let store = JsonConfigStore::new(filename.clone()).await.unwrap();

        let cfg = AdapterConfig {
            blocklist: vec!["192.168.1.1".into(), "::1".into()],
            history_status: PersistenceStatus {
                total_download: 1500,
                ..Default::default()
            },
            ..Default::default()
        };
        store.save(&cfg).await.unwrap();
        assert!(!dir.path().join("peerban_adapter.conf.tmp").exists());

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&filename).unwrap()).unwrap();
        assert_eq!(raw["session_status"], serde_json::json!({}));
        assert_eq!(raw["history_status"]["total_download"], 1500);

        let reopened = JsonConfigStore::new(filename).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), cfg);
    }

    #[tokio::test]
    async fn test_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join(DEFAULT_CONFIG_FILENAME);
        std::fs::write(&filename, b"{not json").unwrap();
        let store = JsonConfigStore::new(filename).await.unwrap();
        assert!(store.load().await.is_err());
    }
}
