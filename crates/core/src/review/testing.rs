//! In-memory collaborators for review tests.

use crate::catalog::{AssetCatalog, StaticCatalog};
use crate::domain::analysis::{AssetAnalysis, Recommendation};
use crate::domain::catalog::{Asset, AssetType, Portfolio};
use crate::llm::{AdvisoryOracle, Provider};
use crate::market::{EconomicContextProvider, MacroContext, PriceOracle};
use crate::review::{AssetReviewer, OracleReviewer, ReviewOrchestrator, ReviewStrategy};
use crate::storage::{AnalysisStore, InMemoryAnalysisStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn asset(ticker: &str, asset_type: AssetType, ceiling: Option<f64>) -> Asset {
    Asset {
        ticker: ticker.to_string(),
        name: format!("{ticker} S.A."),
        asset_type,
        ceiling_price: ceiling,
        rationale: "Solid cash generation".to_string(),
        expected_yield: Some(8.0),
    }
}

pub fn portfolio(name: &str, assets: Vec<Asset>) -> Portfolio {
    Portfolio {
        name: name.to_string(),
        assets,
    }
}

#[derive(Debug, Clone)]
pub enum Quote {
    Price(f64),
    Unavailable,
    Fail,
}

#[derive(Default)]
pub struct FakePrices {
    quotes: HashMap<String, Quote>,
    pub calls: Mutex<Vec<String>>,
}

impl FakePrices {
    pub fn new(quotes: &[(&str, Quote)]) -> Self {
        Self {
            quotes: quotes
                .iter()
                .map(|(t, q)| (t.to_string(), q.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn called(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PriceOracle for FakePrices {
    async fn get_price(&self, ticker: &str, _asset_type: AssetType) -> anyhow::Result<Option<f64>> {
        self.calls.lock().unwrap().push(ticker.to_string());
        match self.quotes.get(ticker) {
            Some(Quote::Price(p)) => Ok(Some(*p)),
            Some(Quote::Unavailable) | None => Ok(None),
            Some(Quote::Fail) => anyhow::bail!("quote service rejected {ticker}"),
        }
    }
}

/// Blocks every quote until released, signalling when a fetch is in flight.
#[derive(Default)]
pub struct GatedPrices {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait::async_trait]
impl PriceOracle for GatedPrices {
    async fn get_price(&self, _ticker: &str, _asset_type: AssetType) -> anyhow::Result<Option<f64>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Some(10.0))
    }
}

#[derive(Default)]
pub struct FakeEconomy {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl EconomicContextProvider for FakeEconomy {
    async fn fetch(&self) -> MacroContext {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MacroContext {
            policy_rate: Some(15.0),
            inflation_12m: Some(4.8),
        }
    }
}

pub struct FakeOracle {
    configured: bool,
    response: Result<String, String>,
    pub calls: AtomicUsize,
}

impl FakeOracle {
    pub fn answering(text: &str) -> Self {
        Self {
            configured: true,
            response: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            configured: true,
            response: Err(error.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            response: Err("no api key".to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl AdvisoryOracle for FakeOracle {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn evaluate(&self, _prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map_err(anyhow::Error::msg)
    }
}

/// Store whose writes fail for one ticker.
pub struct FailingStore {
    pub inner: InMemoryAnalysisStore,
    pub failing_ticker: String,
}

#[async_trait::async_trait]
impl AnalysisStore for FailingStore {
    async fn deactivate(&self, ticker: &str) -> anyhow::Result<u64> {
        self.inner.deactivate(ticker).await
    }

    async fn save(&self, analysis: &AssetAnalysis) -> anyhow::Result<()> {
        self.inner.save(analysis).await
    }

    async fn supersede(&self, analysis: &AssetAnalysis) -> anyhow::Result<()> {
        anyhow::ensure!(analysis.ticker != self.failing_ticker, "connection reset");
        self.inner.supersede(analysis).await
    }

    async fn get_active(&self, ticker: &str) -> anyhow::Result<Option<AssetAnalysis>> {
        self.inner.get_active(ticker).await
    }

    async fn list_by_portfolio(&self, portfolio_name: &str) -> anyhow::Result<Vec<AssetAnalysis>> {
        self.inner.list_by_portfolio(portfolio_name).await
    }

    async fn list_history(&self, ticker: &str) -> anyhow::Result<Vec<AssetAnalysis>> {
        self.inner.list_history(ticker).await
    }

    async fn list_pending_review(&self, as_of: DateTime<Utc>) -> anyhow::Result<Vec<AssetAnalysis>> {
        self.inner.list_pending_review(as_of).await
    }

    async fn list_by_recommendation(
        &self,
        recommendation: Recommendation,
    ) -> anyhow::Result<Vec<AssetAnalysis>> {
        self.inner.list_by_recommendation(recommendation).await
    }
}

pub struct BrokenCatalog;

#[async_trait::async_trait]
impl AssetCatalog for BrokenCatalog {
    async fn list_portfolios(&self) -> anyhow::Result<Vec<Portfolio>> {
        anyhow::bail!("catalog file is missing")
    }
}

pub fn reviewer(
    prices: Arc<dyn PriceOracle>,
    oracle: Option<Arc<dyn AdvisoryOracle>>,
    store: Arc<dyn AnalysisStore>,
) -> AssetReviewer {
    let primary = oracle.map(|o| Arc::new(OracleReviewer::new(o)) as Arc<dyn ReviewStrategy>);
    AssetReviewer::new(prices, Arc::new(FakeEconomy::default()), primary, store)
}

pub fn orchestrator(
    portfolios: Vec<Portfolio>,
    prices: Arc<dyn PriceOracle>,
    store: Arc<dyn AnalysisStore>,
) -> ReviewOrchestrator {
    ReviewOrchestrator::new(
        Arc::new(StaticCatalog::new(portfolios)),
        reviewer(prices, None, store),
    )
    .with_pacing(Duration::ZERO)
}
