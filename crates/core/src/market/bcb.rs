use crate::config::{env_or, Settings};
use crate::market::{EconomicContextProvider, MacroContext};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.bcb.gov.br";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

// SGS series codes.
const SERIES_SELIC_TARGET: u32 = 432;
const SERIES_IPCA_12M: u32 = 13522;

/// Central Bank of Brazil time-series (SGS) client.
#[derive(Debug, Clone)]
pub struct BcbEconomicContext {
    http: reqwest::Client,
    base_url: String,
}

impl BcbEconomicContext {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .economic_data_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = env_or("ECONOMIC_DATA_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build economic data http client")?;

        Ok(Self { http, base_url })
    }

    fn series_url(&self, code: u32) -> String {
        format!(
            "{}/dados/serie/bcdata.sgs.{code}/dados/ultimos/1",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn latest_value(&self, code: u32) -> Result<f64> {
        let res = self
            .http
            .get(self.series_url(code))
            .query(&[("formato", "json")])
            .send()
            .await
            .with_context(|| format!("SGS request failed (series={code})"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read SGS response (series={code})"))?;
        anyhow::ensure!(status.is_success(), "SGS HTTP {status} (series={code}): {text}");

        parse_latest(&text).with_context(|| format!("unexpected SGS payload (series={code})"))
    }
}

#[async_trait::async_trait]
impl EconomicContextProvider for BcbEconomicContext {
    async fn fetch(&self) -> MacroContext {
        let (policy_rate, inflation) = tokio::join!(
            self.latest_value(SERIES_SELIC_TARGET),
            self.latest_value(SERIES_IPCA_12M)
        );

        let policy_rate = policy_rate
            .map_err(|err| tracing::warn!(error = %err, "policy rate unavailable"))
            .ok();
        let inflation_12m = inflation
            .map_err(|err| tracing::warn!(error = %err, "inflation unavailable"))
            .ok();

        MacroContext {
            policy_rate,
            inflation_12m,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SgsPoint {
    valor: String,
}

fn parse_latest(text: &str) -> Result<f64> {
    let points = serde_json::from_str::<Vec<SgsPoint>>(text).context("not a SGS series array")?;
    let last = points.last().context("SGS series is empty")?;
    let value = last
        .valor
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .with_context(|| format!("SGS value is not numeric: {}", last.valor))?;
    Ok(value)
}
