use crate::time::month::MonthKey;
use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks belong to the Postgres session, so the guard pins one pooled
// connection for its whole lifetime.
const LOCK_NAMESPACE: i64 = 0x434F_4445_5041; // "CODEPA"

pub fn lock_key_for_month(month: MonthKey) -> i64 {
    LOCK_NAMESPACE ^ (month.year() as i64 * 12 + month.month() as i64)
}

/// Held session lock for one month's refresh.
pub struct MonthLock {
    conn: PoolConnection<Postgres>,
    key: i64,
    month: MonthKey,
}

impl MonthLock {
    /// `None` when another session already holds the month.
    pub async fn try_acquire(pool: &sqlx::PgPool, month: MonthKey) -> anyhow::Result<Option<Self>> {
        let key = lock_key_for_month(month);
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for advisory lock")?;
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

        if !acquired.0 {
            return Ok(None);
        }
        tracing::debug!(%month, key, "advisory lock acquired");
        Ok(Some(Self { conn, key, month }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(self.key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={})", self.key))?;
        tracing::debug!(month = %self.month, key = self.key, "advisory lock released");
        Ok(())
    }
}
