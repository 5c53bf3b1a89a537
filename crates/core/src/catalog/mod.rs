use crate::domain::catalog::{Asset, AssetType, Portfolio};
use anyhow::Context;
use std::path::PathBuf;

/// Source of the recommended assets per portfolio. The review engine re-reads it on every run.
#[async_trait::async_trait]
pub trait AssetCatalog: Send + Sync {
    async fn list_portfolios(&self) -> anyhow::Result<Vec<Portfolio>>;
}

/// Catalog backed by a JSON file (`[{"name": .., "assets": [..]}]`).
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl AssetCatalog for JsonFileCatalog {
    async fn list_portfolios(&self) -> anyhow::Result<Vec<Portfolio>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read catalog {}", self.path.display()))?;
        parse_catalog(&text)
            .with_context(|| format!("invalid catalog {}", self.path.display()))
    }
}

/// Catalog held in memory; used by tests and for embedding a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    portfolios: Vec<Portfolio>,
}

impl StaticCatalog {
    pub fn new(portfolios: Vec<Portfolio>) -> Self {
        Self { portfolios }
    }
}

#[async_trait::async_trait]
impl AssetCatalog for StaticCatalog {
    async fn list_portfolios(&self) -> anyhow::Result<Vec<Portfolio>> {
        Ok(self.portfolios.clone())
    }
}

#[derive(serde::Deserialize)]
struct RawPortfolio {
    name: String,
    #[serde(default)]
    assets: Vec<serde_json::Value>,
}

/// Parses the catalog file. Only a file that is not a JSON list of portfolios is an error; a bad
/// entry is logged and skipped so the rest of the catalog is still reviewed.
pub fn parse_catalog(text: &str) -> anyhow::Result<Vec<Portfolio>> {
    let raw = serde_json::from_str::<Vec<RawPortfolio>>(text)
        .context("catalog is not valid JSON for the portfolio schema")?;

    let mut portfolios = Vec::with_capacity(raw.len());
    for portfolio in raw {
        if portfolio.name.trim().is_empty() {
            tracing::warn!(assets = portfolio.assets.len(), "skipping portfolio without a name");
            continue;
        }

        let mut assets = Vec::with_capacity(portfolio.assets.len());
        for (idx, value) in portfolio.assets.into_iter().enumerate() {
            match parse_asset(value) {
                Ok(asset) => assets.push(asset),
                Err(err) => tracing::warn!(
                    portfolio = %portfolio.name,
                    idx,
                    error = %format!("{err:#}"),
                    "skipping invalid catalog entry"
                ),
            }
        }

        portfolios.push(Portfolio {
            name: portfolio.name,
            assets,
        });
    }

    Ok(portfolios)
}

fn parse_asset(value: serde_json::Value) -> anyhow::Result<Asset> {
    let mut asset: Asset = serde_json::from_value(value).context("asset does not match the schema")?;
    anyhow::ensure!(!asset.ticker.trim().is_empty(), "ticker must be non-empty");

    if asset.asset_type == AssetType::Unsupported {
        tracing::warn!(ticker = %asset.ticker, "unsupported asset type; asset will not be reviewed");
    }
    if let Some(ceiling) = asset.ceiling_price {
        if ceiling.is_nan() || ceiling <= 0.0 {
            tracing::warn!(ticker = %asset.ticker, ceiling, "ignoring non-positive ceiling price");
            asset.ceiling_price = None;
        }
    }
    Ok(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_catalog_with_optional_fields() {
        let text = json!([
            {
                "name": "Dividendos",
                "assets": [
                    {
                        "ticker": "TAEE11",
                        "name": "Taesa",
                        "type": "stock",
                        "ceiling_price": 38.5,
                        "rationale": "Regulated transmission revenue",
                        "expected_yield": 9.1
                    },
                    {"ticker": "TESOURO-IPCA-2035", "name": "Tesouro IPCA+ 2035", "type": "fixed_income"}
                ]
            }
        ])
        .to_string();

        let portfolios = parse_catalog(&text).unwrap();
        assert_eq!(portfolios.len(), 1);
        assert_eq!(portfolios[0].assets[0].ceiling_price, Some(38.5));
        assert_eq!(portfolios[0].assets[1].asset_type, AssetType::FixedIncome);
        assert_eq!(portfolios[0].assets[1].ceiling_price, None);
    }

    #[test]
    fn bad_entries_are_skipped_or_neutralised() {
        let text = json!([
            {
                "name": "Dividendos",
                "assets": [
                    {"ticker": "TAEE11", "name": "Taesa", "type": "stock", "ceiling_price": 38.5},
                    {"ticker": "ABCD3", "name": "Zero", "type": "stock", "ceiling_price": 0.0},
                    {"ticker": "", "name": "Blank", "type": "stock"},
                    {"name": "No ticker", "type": "stock"}
                ]
            },
            {
                "name": "FII",
                "assets": [
                    {"ticker": "HGLG11", "name": "CSHG Log", "type": "real_estate_fund", "ceiling_price": 170.0},
                    {"ticker": "BTC", "name": "Bitcoin", "type": "crypto", "ceiling_price": 300000.0}
                ]
            },
            {"name": " ", "assets": [{"ticker": "X", "name": "X", "type": "stock"}]}
        ])
        .to_string();

        let portfolios = parse_catalog(&text).unwrap();
        assert_eq!(portfolios.len(), 2);

        let tickers: Vec<_> = portfolios[0].assets.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(tickers, ["TAEE11", "ABCD3"]);
        assert_eq!(portfolios[0].assets[1].ceiling_price, None);

        assert_eq!(portfolios[1].assets[1].asset_type, AssetType::Unsupported);
    }

    #[test]
    fn rejects_a_file_that_is_not_a_portfolio_list() {
        assert!(parse_catalog("{\"name\": \"X\"}").is_err());
        assert!(parse_catalog("not json").is_err());
    }
}
