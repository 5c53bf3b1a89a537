use crate::domain::analysis::{AssetAnalysis, Recommendation};
use crate::storage::AnalysisStore;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-local store. Backs tests and the API when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryAnalysisStore {
    rows: Mutex<Vec<AssetAnalysis>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> MutexGuard<'_, Vec<AssetAnalysis>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newest first; later inserts win ties on `analysis_date`.
    fn select(&self, pred: impl Fn(&AssetAnalysis) -> bool) -> Vec<AssetAnalysis> {
        let mut out: Vec<AssetAnalysis> = self.rows().iter().rev().filter(|a| pred(a)).cloned().collect();
        out.sort_by(|a, b| b.analysis_date.cmp(&a.analysis_date));
        out
    }

    fn deactivate_locked(rows: &mut [AssetAnalysis], ticker: &str) -> u64 {
        let mut flipped = 0;
        for row in rows.iter_mut().filter(|r| r.is_active && r.ticker == ticker) {
            row.is_active = false;
            flipped += 1;
        }
        flipped
    }
}

#[async_trait::async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn deactivate(&self, ticker: &str) -> anyhow::Result<u64> {
        Ok(Self::deactivate_locked(&mut self.rows(), ticker))
    }

    async fn save(&self, analysis: &AssetAnalysis) -> anyhow::Result<()> {
        self.rows().push(analysis.clone());
        Ok(())
    }

    async fn supersede(&self, analysis: &AssetAnalysis) -> anyhow::Result<()> {
        let mut rows = self.rows();
        Self::deactivate_locked(&mut rows, &analysis.ticker);
        rows.push(analysis.clone());
        Ok(())
    }

    async fn get_active(&self, ticker: &str) -> anyhow::Result<Option<AssetAnalysis>> {
        Ok(self
            .select(|a| a.is_active && a.ticker == ticker)
            .into_iter()
            .next())
    }

    async fn list_by_portfolio(&self, portfolio_name: &str) -> anyhow::Result<Vec<AssetAnalysis>> {
        Ok(self.select(|a| a.is_active && a.portfolio_name == portfolio_name))
    }

    async fn list_history(&self, ticker: &str) -> anyhow::Result<Vec<AssetAnalysis>> {
        Ok(self.select(|a| a.ticker == ticker))
    }

    async fn list_pending_review(&self, as_of: DateTime<Utc>) -> anyhow::Result<Vec<AssetAnalysis>> {
        let mut out = self.select(|a| a.is_active && a.next_review_date <= as_of);
        out.reverse();
        out.sort_by(|a, b| a.next_review_date.cmp(&b.next_review_date));
        Ok(out)
    }

    async fn list_by_recommendation(
        &self,
        recommendation: Recommendation,
    ) -> anyhow::Result<Vec<AssetAnalysis>> {
        Ok(self.select(|a| a.is_active && a.recommendation == recommendation))
    }
}
