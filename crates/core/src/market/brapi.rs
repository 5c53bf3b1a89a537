use crate::config::{env_or, Settings};
use crate::domain::catalog::AssetType;
use crate::market::PriceOracle;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://brapi.dev";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 2;

/// Quote API client (brapi.dev compatible).
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retries: u32,
}

#[derive(Debug)]
enum QuoteFetch {
    Price(f64),
    NoQuote,
    Transient(String),
}

impl HttpPriceOracle {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .price_provider_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = env_or("PRICE_PROVIDER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let retries = env_or("PRICE_PROVIDER_RETRIES", DEFAULT_RETRIES).max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build price provider http client")?;

        Ok(Self {
            http,
            base_url,
            token: settings.price_provider_token.clone(),
            retries,
        })
    }

    fn url(&self, ticker: &str) -> String {
        format!(
            "{}/api/quote/{}",
            self.base_url.trim_end_matches('/'),
            ticker.trim()
        )
    }

    async fn fetch_once(&self, ticker: &str) -> Result<QuoteFetch> {
        let mut req = self.http.get(self.url(ticker));
        if let Some(token) = &self.token {
            req = req.query(&[("token", token.as_str())]);
        }

        let res = match req.send().await {
            Ok(res) => res,
            Err(err) => return Ok(QuoteFetch::Transient(format!("request failed: {err}"))),
        };

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(QuoteFetch::NoQuote);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(QuoteFetch::Transient(format!("HTTP {status}")));
        }

        let text = match res.text().await {
            Ok(text) => text,
            Err(err) => return Ok(QuoteFetch::Transient(format!("body read failed: {err}"))),
        };
        if !status.is_success() {
            anyhow::bail!("price provider HTTP {status} for {ticker}: {text}");
        }

        let parsed = serde_json::from_str::<QuoteResponse>(&text)
            .with_context(|| format!("price provider response is not a quote for {ticker}: {text}"))?;
        Ok(match parsed.regular_market_price() {
            Some(price) => QuoteFetch::Price(price),
            None => QuoteFetch::NoQuote,
        })
    }
}

#[async_trait::async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn get_price(&self, ticker: &str, asset_type: AssetType) -> Result<Option<f64>> {
        if !asset_type.is_reviewable() {
            return Ok(None);
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(ticker).await? {
                QuoteFetch::Price(price) => return Ok(Some(price)),
                QuoteFetch::NoQuote => {
                    tracing::warn!(ticker, "no quote available");
                    return Ok(None);
                }
                QuoteFetch::Transient(reason) => {
                    if attempt >= self.retries {
                        tracing::warn!(ticker, attempt, %reason, "price fetch failed; treating as unavailable");
                        return Ok(None);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(ticker, attempt, ?backoff, %reason, "price fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    results: Vec<QuoteResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResult {
    #[serde(default)]
    regular_market_price: Option<f64>,
}

impl QuoteResponse {
    fn regular_market_price(&self) -> Option<f64> {
        self.results
            .first()
            .and_then(|r| r.regular_market_price)
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_first_result_price() {
        let v = json!({
            "results": [{"symbol": "TAEE11", "regularMarketPrice": 35.12, "currency": "BRL"}],
            "requestedAt": "2026-10-19T12:00:00.000Z"
        });
        let parsed: QuoteResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.regular_market_price(), Some(35.12));
    }

    #[test]
    fn treats_missing_or_zero_price_as_no_quote() {
        let parsed: QuoteResponse = serde_json::from_value(json!({"results": []})).unwrap();
        assert_eq!(parsed.regular_market_price(), None);

        let parsed: QuoteResponse =
            serde_json::from_value(json!({"results": [{"regularMarketPrice": 0.0}]})).unwrap();
        assert_eq!(parsed.regular_market_price(), None);
    }

    #[test]
    fn builds_quote_url_without_double_slash() {
        let settings = Settings {
            database_url: None,
            anthropic_api_key: None,
            sentry_dsn: None,
            price_provider_base_url: Some("https://quotes.example/".to_string()),
            price_provider_token: None,
            economic_data_base_url: None,
            catalog_path: None,
        };
        let oracle = HttpPriceOracle::from_settings(&settings).unwrap();
        assert_eq!(oracle.url("HGLG11"), "https://quotes.example/api/quote/HGLG11");
    }

    #[tokio::test]
    async fn fixed_income_is_never_quoted() {
        let settings = Settings {
            database_url: None,
            anthropic_api_key: None,
            sentry_dsn: None,
            // Unroutable on purpose: a request would fail rather than return None.
            price_provider_base_url: Some("http://127.0.0.1:9".to_string()),
            price_provider_token: None,
            economic_data_base_url: None,
            catalog_path: None,
        };
        let oracle = HttpPriceOracle::from_settings(&settings).unwrap();
        let price = oracle
            .get_price("TESOURO-IPCA-2035", AssetType::FixedIncome)
            .await
            .unwrap();
        assert_eq!(price, None);
    }
}
