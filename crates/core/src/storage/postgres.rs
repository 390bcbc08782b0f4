use crate::storage::{Durability, StorageBackend, StoreDocument};
use anyhow::Context;
use sqlx::types::Json;

const DEFAULT_STORE_ID: &str = "monthly-bet-data";

/// Whole store document in one JSONB row of `tracker_store`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
    store_id: String,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            store_id: DEFAULT_STORE_ID.to_string(),
        }
    }

    pub fn with_store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = store_id.into();
        self
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl StorageBackend for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn durability(&self) -> Durability {
        Durability::Durable
    }

    async fn load(&self) -> anyhow::Result<Option<StoreDocument>> {
        let row: Option<(Json<StoreDocument>,)> =
            sqlx::query_as("SELECT document FROM tracker_store WHERE store_id = $1")
                .persistent(false)
                .bind(&self.store_id)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("select tracker_store failed (store_id={})", self.store_id))?;
        Ok(row.map(|(Json(document),)| document))
    }

    async fn save(&self, document: &StoreDocument) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO tracker_store (store_id, document, updated_at) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (store_id) DO UPDATE SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(&self.store_id)
        .bind(Json(document))
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert tracker_store failed (store_id={})", self.store_id))?;
        Ok(())
    }
}
