use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AdapterConfig, ConfigStore};

/// A store that forgets everything when the process exits.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    doc: Mutex<AdapterConfig>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn new(initial: AdapterConfig) -> Self {
        Self {
            doc: Mutex::new(initial),
            ..Default::default()
        }
    }

    /// Make subsequent saves fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn stored(&self) -> AdapterConfig {
        self.doc.lock().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> anyhow::Result<AdapterConfig> {
        Ok(self.doc.lock().clone())
    }

    async fn save(&self, config: &AdapterConfig) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            bail!("writes disabled");
        }
        *self.doc.lock() = config.clone();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
