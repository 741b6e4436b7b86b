mod json;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::{Error, Result, stats::PersistenceStatus};

pub use json::{DEFAULT_CONFIG_FILENAME, JsonConfigStore};
pub use memory::MemoryConfigStore;

/// The persisted adapter document.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    pub blocklist: Vec<String>,
    pub history_status: PersistenceStatus,
    /// Last checkpoint of a session that hasn't been merged into history yet.
    /// Written as `{}` when there is none.
    #[serde(with = "session_status_serde")]
    pub session_status: Option<PersistenceStatus>,
    /// Keys set through `set_config` that the adapter itself doesn't use.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AdapterConfig {
    /// Merge top level keys from `patch`. Known keys must have the right
    /// shape, otherwise nothing is changed.
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<()> {
        let mut doc = serde_json::to_value(&*self).map_err(Error::InvalidConfig)?;
        if let Value::Object(map) = &mut doc {
            map.extend(patch);
        }
        *self = serde_json::from_value(doc).map_err(Error::InvalidConfig)?;
        Ok(())
    }
}

mod session_status_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
    use serde_json::{Map, Value};

    use crate::stats::PersistenceStatus;

    pub fn serialize<S: Serializer>(
        v: &Option<PersistenceStatus>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match v {
            Some(status) => status.serialize(serializer),
            None => Map::new().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PersistenceStatus>, D::Error> {
        match Option::<Map<String, Value>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(m) if m.is_empty() => Ok(None),
            Some(m) => PersistenceStatus::deserialize(Value::Object(m))
                .map(Some)
                .map_err(D::Error::custom),
        }
    }
}

#[async_trait]
pub trait ConfigStore: std::fmt::Debug + Send + Sync {
    async fn load(&self) -> anyhow::Result<AdapterConfig>;
    async fn save(&self, config: &AdapterConfig) -> anyhow::Result<()>;
}

/// The live document and the store it is saved to. Every mutation is saved
/// before it becomes visible.
pub struct PersistentConfig {
    store: Arc<dyn ConfigStore>,
    doc: tokio::sync::Mutex<AdapterConfig>,
}

impl PersistentConfig {
    pub async fn load(store: Arc<dyn ConfigStore>) -> Result<Self> {
        let doc = store.load().await.map_err(Error::Persistence)?;
        trace!(?store, blocklist = doc.blocklist.len(), "loaded config");
        Ok(Self {
            store,
            doc: tokio::sync::Mutex::new(doc),
        })
    }

    pub async fn read<R>(&self, f: impl FnOnce(&AdapterConfig) -> R) -> R {
        f(&*self.doc.lock().await)
    }

    /// Apply `f` to a copy of the document and save it. The copy replaces the
    /// document only if both `f` and the save succeed.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut AdapterConfig) -> Result<R>,
    ) -> Result<R> {
        let mut g = self.doc.lock().await;
        let mut next = g.clone();
        let r = f(&mut next)?;
        self.store.save(&next).await.map_err(Error::Persistence)?;
        *g = next;
        Ok(r)
    }
}
