use crate::storage::{Durability, StorageBackend, StoreDocument};
use anyhow::Context;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// JSON document on local disk. Saves write a sibling temp file and rename
/// it over the target, so readers never see a partial document.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn durability(&self) -> Durability {
        Durability::Durable
    }

    async fn load(&self) -> anyhow::Result<Option<StoreDocument>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let document = serde_json::from_str(&text)
            .with_context(|| format!("store file {} is not a valid document", self.path.display()))?;
        Ok(Some(document))
    }

    async fn save(&self, document: &StoreDocument) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let json = serde_json::to_vec_pretty(document).context("failed to serialize store document")?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to move {} into place", tmp.display()))?;

        tracing::debug!(path = %self.path.display(), snapshots = document.data.len(), "store saved");
        Ok(())
    }
}
