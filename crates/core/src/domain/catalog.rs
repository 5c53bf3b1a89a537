use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Stock,
    RealEstateFund,
    Etf,
    Bdr,
    FixedIncome,
    /// Any type this engine does not know; listed but never reviewed.
    #[serde(other)]
    Unsupported,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Stock => "stock",
            AssetType::RealEstateFund => "real_estate_fund",
            AssetType::Etf => "etf",
            AssetType::Bdr => "bdr",
            AssetType::FixedIncome => "fixed_income",
            AssetType::Unsupported => "unsupported",
        }
    }

    /// Fixed income carries no market quote and is never reviewed by the batch engine.
    pub fn is_reviewable(self) -> bool {
        !matches!(self, AssetType::FixedIncome | AssetType::Unsupported)
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "stock" => Ok(AssetType::Stock),
            "real_estate_fund" => Ok(AssetType::RealEstateFund),
            "etf" => Ok(AssetType::Etf),
            "bdr" => Ok(AssetType::Bdr),
            "fixed_income" => Ok(AssetType::FixedIncome),
            other => bail!("unknown asset type: {other}"),
        }
    }
}

/// A recommended asset as listed in the static catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default)]
    pub ceiling_price: Option<f64>,
    #[serde(default)]
    pub rationale: String,
    /// Expected dividend yield, in percent.
    #[serde(default)]
    pub expected_yield: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub name: String,
    pub assets: Vec<Asset>,
}
