//! Periodic review of recommended assets: per-asset reviewers and the batch orchestrator.

pub mod deterministic;
pub mod oracle;
pub mod orchestrator;
pub mod reviewer;

#[cfg(test)]
pub(crate) mod testing;

use crate::domain::analysis::ReviewVerdict;
use crate::domain::catalog::Asset;
use crate::market::MacroContext;

pub use deterministic::DeterministicReviewer;
pub use oracle::OracleReviewer;
pub use orchestrator::{spawn_review_timer, ReviewOrchestrator, RunOutcome, RunStatus};
pub use reviewer::AssetReviewer;

/// Everything a strategy may look at when judging one asset.
#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub portfolio_name: String,
    pub asset: Asset,
    pub current_price: Option<f64>,
    pub macro_context: MacroContext,
}

#[async_trait::async_trait]
pub trait ReviewStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can be attempted at all (e.g. credentials present).
    fn is_available(&self) -> bool {
        true
    }

    async fn review(&self, input: &ReviewInput) -> anyhow::Result<ReviewVerdict>;
}

/// Wires the production collaborators around `store`.
pub fn build_orchestrator(
    settings: &crate::config::Settings,
    store: std::sync::Arc<dyn crate::storage::AnalysisStore>,
    lock_pool: Option<sqlx::PgPool>,
) -> anyhow::Result<ReviewOrchestrator> {
    use crate::catalog::JsonFileCatalog;
    use crate::llm::anthropic::AnthropicOracle;
    use crate::llm::AdvisoryOracle;
    use crate::market::bcb::BcbEconomicContext;
    use crate::market::brapi::HttpPriceOracle;
    use std::sync::Arc;

    let catalog = Arc::new(JsonFileCatalog::new(settings.require_catalog_path()?));
    let prices = Arc::new(HttpPriceOracle::from_settings(settings)?);
    let economy = Arc::new(BcbEconomicContext::from_settings(settings)?);

    let oracle = Arc::new(AnthropicOracle::from_settings(settings)?);
    if !oracle.is_configured() {
        tracing::warn!("ANTHROPIC_API_KEY not set; reviews will use the deterministic heuristic");
    }
    let primary: Arc<dyn ReviewStrategy> = Arc::new(OracleReviewer::new(oracle));

    let reviewer = AssetReviewer::new(prices, economy, Some(primary), store);
    let pacing = std::time::Duration::from_millis(crate::config::env_or(
        "REVIEW_PACING_MS",
        orchestrator::DEFAULT_PACING.as_millis() as u64,
    ));

    let mut orchestrator = ReviewOrchestrator::new(catalog, reviewer).with_pacing(pacing);
    if let Some(pool) = lock_pool {
        orchestrator = orchestrator.with_distributed_lock(pool);
    }
    Ok(orchestrator)
}
