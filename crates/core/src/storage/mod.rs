use crate::domain::readings::ReadingHistory;
use crate::domain::snapshot::MonthlySnapshot;
use crate::time::month::MonthKey;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod file;
pub mod lock;
pub mod memory;
pub mod postgres;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Whether a backend's contents survive the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    Ephemeral,
    Durable,
}

/// Load/save of the whole store document. Callers serialize access; backends
/// only need each `save` to replace the previous document atomically.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn durability(&self) -> Durability;

    /// `None` when nothing has been saved yet.
    async fn load(&self) -> anyhow::Result<Option<StoreDocument>>;

    async fn save(&self, document: &StoreDocument) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("snapshot for {month} rejected: {later} is already recorded and earlier months are final")]
pub struct FinalizedMonth {
    pub month: MonthKey,
    pub later: MonthKey,
}

/// The persisted document: snapshots in ascending `observed_at` order, at
/// most one per month, plus the raw per-source reading log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    pub data: Vec<MonthlySnapshot>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_update_due: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "ReadingHistory::is_empty")]
    pub readings: ReadingHistory,
}

impl StoreDocument {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            last_updated: None,
            next_update_due: None,
            readings: ReadingHistory::default(),
        }
    }

    pub fn has_month(&self, month: MonthKey) -> bool {
        self.data.iter().any(|s| s.month == month)
    }

    pub fn get(&self, month: MonthKey) -> Option<&MonthlySnapshot> {
        self.data.iter().find(|s| s.month == month)
    }

    pub fn latest(&self) -> Option<&MonthlySnapshot> {
        self.data.iter().max_by_key(|s| (s.month, s.observed_at))
    }

    pub fn latest_month(&self) -> Option<MonthKey> {
        self.data.iter().map(|s| s.month).max()
    }

    /// Replaces the snapshot for its month, or appends it. Months older than
    /// the newest recorded month are final and rejected.
    pub fn upsert(&mut self, snapshot: MonthlySnapshot) -> Result<(), FinalizedMonth> {
        if let Some(later) = self.latest_month().filter(|&m| m > snapshot.month) {
            return Err(FinalizedMonth {
                month: snapshot.month,
                later,
            });
        }
        self.data.retain(|s| s.month != snapshot.month);
        self.data.push(snapshot);
        self.sort();
        Ok(())
    }

    /// Inserts only when the month has no snapshot yet. Returns whether it did.
    pub fn insert_if_absent(&mut self, snapshot: MonthlySnapshot) -> bool {
        if self.has_month(snapshot.month) {
            return false;
        }
        self.data.push(snapshot);
        self.sort();
        true
    }

    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
        self.next_update_due = Some(crate::time::month::next_refresh_due(now));
    }

    fn sort(&mut self) {
        self.data.sort_by_key(|s| s.observed_at);
    }
}
