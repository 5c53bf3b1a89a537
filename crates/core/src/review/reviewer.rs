use crate::domain::analysis::{AssetAnalysis, ReviewVerdict};
use crate::domain::catalog::Asset;
use crate::llm::error::LlmDiagnosticsError;
use crate::market::{EconomicContextProvider, MacroContext, PriceOracle};
use crate::review::{DeterministicReviewer, ReviewInput, ReviewStrategy};
use crate::storage::AnalysisStore;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Reviews one asset: advisory strategy first, deterministic heuristic on any failure.
///
/// A verdict is always produced. The only errors returned are a hard price-oracle failure and a
/// failed write, both of which the orchestrator isolates per asset.
#[derive(Clone)]
pub struct AssetReviewer {
    prices: Arc<dyn PriceOracle>,
    economy: Arc<dyn EconomicContextProvider>,
    primary: Option<Arc<dyn ReviewStrategy>>,
    fallback: DeterministicReviewer,
    store: Arc<dyn AnalysisStore>,
}

impl AssetReviewer {
    pub fn new(
        prices: Arc<dyn PriceOracle>,
        economy: Arc<dyn EconomicContextProvider>,
        primary: Option<Arc<dyn ReviewStrategy>>,
        store: Arc<dyn AnalysisStore>,
    ) -> Self {
        Self {
            prices,
            economy,
            primary,
            fallback: DeterministicReviewer,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    pub async fn review(&self, portfolio_name: &str, asset: &Asset) -> anyhow::Result<AssetAnalysis> {
        let ticker = asset.ticker.trim().to_ascii_uppercase();

        let current_price = self
            .prices
            .get_price(&ticker, asset.asset_type)
            .await
            .with_context(|| format!("price fetch failed for {ticker}"))?;

        let primary = self.primary.as_ref().filter(|s| s.is_available());

        // Macro data only feeds the advisory prompt.
        let macro_context = match primary {
            Some(_) => self.economy.fetch().await,
            None => MacroContext::default(),
        };

        let input = ReviewInput {
            portfolio_name: portfolio_name.to_string(),
            asset: asset.clone(),
            current_price,
            macro_context,
        };

        let verdict = self.decide(primary, &input).await;
        let analysis = stamp(&input, &ticker, verdict);

        self.store
            .supersede(&analysis)
            .await
            .with_context(|| format!("failed to persist analysis for {ticker}"))?;

        tracing::info!(
            %ticker,
            portfolio = portfolio_name,
            recommendation = %analysis.recommendation,
            confidence = analysis.confidence_score,
            source = analysis.source.as_str(),
            "asset reviewed"
        );
        Ok(analysis)
    }

    async fn decide(&self, primary: Option<&Arc<dyn ReviewStrategy>>, input: &ReviewInput) -> ReviewVerdict {
        if let Some(strategy) = primary {
            match strategy.review(input).await {
                Ok(verdict) => return verdict,
                Err(err) => {
                    let stage = err
                        .downcast_ref::<LlmDiagnosticsError>()
                        .map_or("other", |diag| diag.stage);
                    tracing::warn!(
                        ticker = %input.asset.ticker,
                        strategy = strategy.name(),
                        stage,
                        error = %format!("{err:#}"),
                        "review strategy failed; falling back to deterministic review"
                    );
                }
            }
        }

        self.fallback.verdict(input)
    }
}

fn stamp(input: &ReviewInput, ticker: &str, verdict: ReviewVerdict) -> AssetAnalysis {
    let analysis_date = Utc::now();
    AssetAnalysis {
        id: uuid::Uuid::new_v4(),
        portfolio_name: input.portfolio_name.clone(),
        ticker: ticker.to_string(),
        asset_name: input.asset.name.clone(),
        asset_type: input.asset.asset_type,
        current_price: input.current_price,
        ceiling_price: input.asset.ceiling_price,
        recommendation: verdict.recommendation,
        analysis_text: verdict.analysis_text,
        substitution_suggestion: verdict.substitution_suggestion,
        confidence_score: verdict.confidence_score,
        source: verdict.source,
        analysis_date,
        next_review_date: AssetAnalysis::next_review_after(analysis_date),
        is_active: true,
    }
}
