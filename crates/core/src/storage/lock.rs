use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the lock keeps its own pooled
// connection for as long as it is held. This is what stops an API timer run and a worker
// CLI run from reviewing at the same time.
const REVIEW_LOCK_KEY: i64 = 0x4341_5254_4549; // "CARTEI"

pub struct ReviewLock {
    conn: Option<PoolConnection<Postgres>>,
}

impl ReviewLock {
    /// `Ok(None)` when another session already holds the lock.
    pub async fn try_acquire(pool: &sqlx::PgPool) -> anyhow::Result<Option<Self>> {
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for review lock")?;
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(REVIEW_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={REVIEW_LOCK_KEY})"))?;

        Ok(acquired.0.then(|| Self { conn: Some(conn) }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let res = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(REVIEW_LOCK_KEY)
            .execute(&mut *conn)
            .await;
        if res.is_err() {
            drop(conn.detach());
        }
        res.with_context(|| format!("failed to release advisory lock (key={REVIEW_LOCK_KEY})"))?;
        Ok(())
    }
}

impl Drop for ReviewLock {
    fn drop(&mut self) {
        // Not released explicitly (panic or early return): close the session instead of
        // handing a lock-holding connection back to the pool.
        if let Some(conn) = self.conn.take() {
            tracing::warn!("review lock dropped without release; closing its connection");
            drop(conn.detach());
        }
    }
}
