use anyhow::Context;
use codepocalypse_core::config::Settings;
use codepocalypse_core::storage::{self, FileStore, MemoryStore, PgStore, StorageBackend};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Memory,
    File,
    Postgres,
}

pub struct Opened {
    pub store: Arc<dyn StorageBackend>,
    /// Present for the Postgres backend, for session locks.
    pub pool: Option<sqlx::PgPool>,
}

pub async fn open(backend: Backend, settings: &Settings) -> anyhow::Result<Opened> {
    match backend {
        Backend::Memory => Ok(Opened {
            store: Arc::new(MemoryStore::new()),
            pool: None,
        }),
        Backend::File => Ok(Opened {
            store: Arc::new(FileStore::new(&settings.store_path)),
            pool: None,
        }),
        Backend::Postgres => {
            let db_url = settings.require_database_url()?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .context("connect DATABASE_URL failed")?;
            storage::migrate(&pool).await?;
            Ok(Opened {
                store: Arc::new(PgStore::new(pool.clone())),
                pool: Some(pool),
            })
        }
    }
}
