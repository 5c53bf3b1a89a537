//! Best-effort market data consumed by the asset reviewer.

pub mod bcb;
pub mod brapi;

use crate::domain::catalog::AssetType;
use serde::{Deserialize, Serialize};

#[async_trait::async_trait]
pub trait PriceOracle: Send + Sync {
    /// `Ok(None)` means the price is unavailable right now (transient failure or no quote).
    /// `Err` is reserved for failures that should drop the asset from the current run.
    async fn get_price(&self, ticker: &str, asset_type: AssetType) -> anyhow::Result<Option<f64>>;
}

/// Macro indicators, in percent. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroContext {
    pub policy_rate: Option<f64>,
    pub inflation_12m: Option<f64>,
}

impl MacroContext {
    pub fn is_empty(&self) -> bool {
        self.policy_rate.is_none() && self.inflation_12m.is_none()
    }
}

#[async_trait::async_trait]
pub trait EconomicContextProvider: Send + Sync {
    /// Never fails; missing indicators are `None`.
    async fn fetch(&self) -> MacroContext;
}
