use crate::storage::{Durability, StorageBackend, StoreDocument};
use tokio::sync::Mutex;

/// Process-local store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<StoreDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: StoreDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn durability(&self) -> Durability {
        Durability::Ephemeral
    }

    async fn load(&self) -> anyhow::Result<Option<StoreDocument>> {
        Ok(self.document.lock().await.clone())
    }

    async fn save(&self, document: &StoreDocument) -> anyhow::Result<()> {
        *self.document.lock().await = Some(document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_in_process() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        let mut doc = StoreDocument::empty();
        doc.stamp(chrono::Utc::now());
        store.save(&doc).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(doc));
        assert_eq!(store.durability(), Durability::Ephemeral);
    }
}
