use crate::domain::analysis::{AssetAnalysis, Recommendation};
use crate::storage::AnalysisStore;
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

const SELECT_COLUMNS: &str = "SELECT id, portfolio_name, ticker, asset_name, asset_type, current_price, ceiling_price, \
     recommendation, analysis_text, substitution_suggestion, confidence_score, source, \
     analysis_date, next_review_date, is_active \
     FROM asset_analyses";

const TICKER_XACT_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";

type RowQuery<'q> =
    sqlx::query::QueryAs<'q, sqlx::Postgres, AnalysisRow, sqlx::postgres::PgArguments>;

#[derive(Debug, Clone)]
pub struct PgAnalysisStore {
    pool: sqlx::PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, query: RowQuery<'_>) -> anyhow::Result<Vec<AssetAnalysis>> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("select asset_analyses failed")?;
        rows.into_iter().map(AssetAnalysis::try_from).collect()
    }
}

async fn deactivate_on(conn: &mut PgConnection, ticker: &str) -> anyhow::Result<u64> {
    let res = sqlx::query(
        "UPDATE asset_analyses SET is_active = FALSE WHERE ticker = $1 AND is_active",
    )
    .bind(ticker)
    .execute(conn)
    .await
    .context("deactivate asset_analyses failed")?;
    Ok(res.rows_affected())
}

async fn insert_on(conn: &mut PgConnection, a: &AssetAnalysis) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO asset_analyses (id, portfolio_name, ticker, asset_name, asset_type, current_price, \
         ceiling_price, recommendation, analysis_text, substitution_suggestion, confidence_score, source, \
         analysis_date, next_review_date, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(a.id)
    .bind(&a.portfolio_name)
    .bind(&a.ticker)
    .bind(&a.asset_name)
    .bind(a.asset_type.as_str())
    .bind(a.current_price)
    .bind(a.ceiling_price)
    .bind(a.recommendation.as_str())
    .bind(&a.analysis_text)
    .bind(&a.substitution_suggestion)
    .bind(a.confidence_score)
    .bind(a.source.as_str())
    .bind(a.analysis_date)
    .bind(a.next_review_date)
    .bind(a.is_active)
    .execute(conn)
    .await
    .context("insert asset_analyses failed")?;
    Ok(())
}

#[async_trait::async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn deactivate(&self, ticker: &str) -> anyhow::Result<u64> {
        let mut conn = self.pool.acquire().await.context("acquire connection failed")?;
        deactivate_on(&mut conn, ticker).await
    }

    async fn save(&self, analysis: &AssetAnalysis) -> anyhow::Result<()> {
        let mut conn = self.pool.acquire().await.context("acquire connection failed")?;
        insert_on(&mut conn, analysis).await
    }

    async fn supersede(&self, analysis: &AssetAnalysis) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        // Serialises writers of one ticker until commit; READ COMMITTED alone would let two
        // concurrent transactions each miss the other's insert.
        sqlx::query(TICKER_XACT_LOCK_SQL)
            .bind(&analysis.ticker)
            .execute(&mut *tx)
            .await
            .context("ticker lock failed")?;

        let deactivated = deactivate_on(&mut tx, &analysis.ticker).await?;
        insert_on(&mut tx, analysis).await?;

        tx.commit().await.context("commit transaction failed")?;
        tracing::debug!(ticker = %analysis.ticker, deactivated, "analysis superseded");
        Ok(())
    }

    async fn get_active(&self, ticker: &str) -> anyhow::Result<Option<AssetAnalysis>> {
        let sql = format!("{SELECT_COLUMNS} WHERE ticker = $1 AND is_active ORDER BY analysis_date DESC, seq DESC LIMIT 1");
        let row = sqlx::query_as::<_, AnalysisRow>(&sql)
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await
            .context("select active asset_analyses failed")?;
        row.map(AssetAnalysis::try_from).transpose()
    }

    async fn list_by_portfolio(&self, portfolio_name: &str) -> anyhow::Result<Vec<AssetAnalysis>> {
        let sql = format!("{SELECT_COLUMNS} WHERE portfolio_name = $1 AND is_active ORDER BY analysis_date DESC, seq DESC");
        self.fetch_many(sqlx::query_as(&sql).bind(portfolio_name)).await
    }

    async fn list_history(&self, ticker: &str) -> anyhow::Result<Vec<AssetAnalysis>> {
        let sql = format!("{SELECT_COLUMNS} WHERE ticker = $1 ORDER BY analysis_date DESC, seq DESC");
        self.fetch_many(sqlx::query_as(&sql).bind(ticker)).await
    }

    async fn list_pending_review(&self, as_of: DateTime<Utc>) -> anyhow::Result<Vec<AssetAnalysis>> {
        let sql = format!("{SELECT_COLUMNS} WHERE is_active AND next_review_date <= $1 ORDER BY next_review_date ASC, seq ASC");
        self.fetch_many(sqlx::query_as(&sql).bind(as_of)).await
    }

    async fn list_by_recommendation(
        &self,
        recommendation: Recommendation,
    ) -> anyhow::Result<Vec<AssetAnalysis>> {
        let sql = format!("{SELECT_COLUMNS} WHERE recommendation = $1 AND is_active ORDER BY analysis_date DESC, seq DESC");
        self.fetch_many(sqlx::query_as(&sql).bind(recommendation.as_str())).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AnalysisRow {
    id: uuid::Uuid,
    portfolio_name: String,
    ticker: String,
    asset_name: String,
    asset_type: String,
    current_price: Option<f64>,
    ceiling_price: Option<f64>,
    recommendation: String,
    analysis_text: String,
    substitution_suggestion: Option<String>,
    confidence_score: i32,
    source: String,
    analysis_date: DateTime<Utc>,
    next_review_date: DateTime<Utc>,
    is_active: bool,
}

impl TryFrom<AnalysisRow> for AssetAnalysis {
    type Error = anyhow::Error;

    fn try_from(row: AnalysisRow) -> anyhow::Result<Self> {
        Ok(AssetAnalysis {
            id: row.id,
            portfolio_name: row.portfolio_name,
            asset_type: row
                .asset_type
                .parse()
                .with_context(|| format!("invalid asset_type in DB for ticker={}", row.ticker))?,
            recommendation: row
                .recommendation
                .parse()
                .with_context(|| format!("invalid recommendation in DB for ticker={}", row.ticker))?,
            source: row
                .source
                .parse()
                .with_context(|| format!("invalid source in DB for ticker={}", row.ticker))?,
            ticker: row.ticker,
            asset_name: row.asset_name,
            current_price: row.current_price,
            ceiling_price: row.ceiling_price,
            analysis_text: row.analysis_text,
            substitution_suggestion: row.substitution_suggestion,
            confidence_score: row.confidence_score,
            analysis_date: row.analysis_date,
            next_review_date: row.next_review_date,
            is_active: row.is_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::ReviewSource;
    use crate::domain::catalog::AssetType;
    use chrono::TimeZone;

    fn row(recommendation: &str) -> AnalysisRow {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        AnalysisRow {
            id: uuid::Uuid::new_v4(),
            portfolio_name: "Dividendos".to_string(),
            ticker: "BBSE3".to_string(),
            asset_name: "BB Seguridade".to_string(),
            asset_type: "stock".to_string(),
            current_price: Some(34.0),
            ceiling_price: Some(36.0),
            recommendation: recommendation.to_string(),
            analysis_text: "ok".to_string(),
            substitution_suggestion: None,
            confidence_score: 60,
            source: "deterministic".to_string(),
            analysis_date: at,
            next_review_date: AssetAnalysis::next_review_after(at),
            is_active: true,
        }
    }

    #[test]
    fn converts_row_into_analysis() {
        let a = AssetAnalysis::try_from(row("KEEP")).unwrap();
        assert_eq!(a.recommendation, Recommendation::Keep);
        assert_eq!(a.asset_type, AssetType::Stock);
        assert_eq!(a.source, ReviewSource::Deterministic);
    }

    #[test]
    fn rejects_unknown_recommendation_in_row() {
        assert!(AssetAnalysis::try_from(row("HOLD")).is_err());
    }

    /// Needs a disposable database in `TEST_DATABASE_URL`; a no-op otherwise.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_supersedes_leave_one_active_row() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .unwrap();
        crate::storage::migrate(&pool).await.unwrap();
        let store = std::sync::Arc::new(PgAnalysisStore::new(pool));

        let ticker = format!("T{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).to_uppercase();
        let writes = (0..8).map(|_| {
            let store = store.clone();
            let mut a = AssetAnalysis::try_from(row("KEEP")).unwrap();
            a.id = uuid::Uuid::new_v4();
            a.ticker = ticker.clone();
            a.analysis_date = Utc::now();
            tokio::spawn(async move { store.supersede(&a).await })
        });
        for handle in writes.collect::<Vec<_>>() {
            handle.await.unwrap().unwrap();
        }

        let history = store.list_history(&ticker).await.unwrap();
        assert_eq!(history.len(), 8);
        assert_eq!(history.iter().filter(|a| a.is_active).count(), 1);
    }
}
