pub mod analyses;
pub mod lock;
pub mod memory;

use crate::domain::analysis::{AssetAnalysis, Recommendation};
use anyhow::Context;
use chrono::{DateTime, Utc};

pub use analyses::PgAnalysisStore;
pub use memory::InMemoryAnalysisStore;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Versioned, append-only store of asset analyses.
///
/// For every ticker at most one record is active. This is kept procedurally (there is no unique
/// constraint): a new record is only ever written through `supersede`, which flips the previous
/// active records off before inserting, serialised per ticker. No other component touches
/// `is_active`. Calling `deactivate` and `save` separately gives no such guarantee.
#[async_trait::async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Marks every active record of `ticker` inactive. Returns how many were flipped.
    async fn deactivate(&self, ticker: &str) -> anyhow::Result<u64>;

    /// Appends a record as-is.
    async fn save(&self, analysis: &AssetAnalysis) -> anyhow::Result<()>;

    /// `deactivate` followed by `save`, as one unit.
    async fn supersede(&self, analysis: &AssetAnalysis) -> anyhow::Result<()>;

    async fn get_active(&self, ticker: &str) -> anyhow::Result<Option<AssetAnalysis>>;

    /// Active records of one portfolio, newest first.
    async fn list_by_portfolio(&self, portfolio_name: &str) -> anyhow::Result<Vec<AssetAnalysis>>;

    /// Every version for a ticker, newest first.
    async fn list_history(&self, ticker: &str) -> anyhow::Result<Vec<AssetAnalysis>>;

    /// Active records whose `next_review_date <= as_of`, most overdue first.
    async fn list_pending_review(&self, as_of: DateTime<Utc>) -> anyhow::Result<Vec<AssetAnalysis>>;

    /// Active records with the given recommendation, newest first.
    async fn list_by_recommendation(&self, recommendation: Recommendation)
        -> anyhow::Result<Vec<AssetAnalysis>>;
}
