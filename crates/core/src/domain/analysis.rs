use anyhow::bail;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Days between an analysis and the next suggested review of the same asset.
pub const REVIEW_INTERVAL_DAYS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Keep,
    Watch,
    Replace,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Keep => "KEEP",
            Recommendation::Watch => "WATCH",
            Recommendation::Replace => "REPLACE",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = anyhow::Error;

    // Portuguese labels are accepted since the catalog and advisory prompts use them.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KEEP" | "MANTER" => Ok(Recommendation::Keep),
            "WATCH" | "OBSERVAR" => Ok(Recommendation::Watch),
            "REPLACE" | "SUBSTITUIR" => Ok(Recommendation::Replace),
            other => bail!("unknown recommendation: {other}"),
        }
    }
}

/// Which reviewer produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSource {
    Oracle,
    Deterministic,
}

impl ReviewSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewSource::Oracle => "oracle",
            ReviewSource::Deterministic => "deterministic",
        }
    }
}

impl FromStr for ReviewSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "oracle" => Ok(ReviewSource::Oracle),
            "deterministic" => Ok(ReviewSource::Deterministic),
            other => bail!("unknown review source: {other}"),
        }
    }
}

/// Judgment produced by a reviewer before it is stamped and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub recommendation: Recommendation,
    pub confidence_score: i32,
    pub analysis_text: String,
    pub substitution_suggestion: Option<String>,
    pub source: ReviewSource,
}

/// Persisted review record. Append-only: after creation only `is_active` changes, and only
/// through an `AnalysisStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAnalysis {
    pub id: uuid::Uuid,
    pub portfolio_name: String,
    pub ticker: String,
    pub asset_name: String,
    pub asset_type: super::catalog::AssetType,
    pub current_price: Option<f64>,
    pub ceiling_price: Option<f64>,
    pub recommendation: Recommendation,
    pub analysis_text: String,
    pub substitution_suggestion: Option<String>,
    pub confidence_score: i32,
    pub source: ReviewSource,
    pub analysis_date: DateTime<Utc>,
    pub next_review_date: DateTime<Utc>,
    pub is_active: bool,
}

impl AssetAnalysis {
    pub fn next_review_after(analysis_date: DateTime<Utc>) -> DateTime<Utc> {
        analysis_date + Duration::days(REVIEW_INTERVAL_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_english_and_portuguese_labels() {
        assert_eq!("keep".parse::<Recommendation>().unwrap(), Recommendation::Keep);
        assert_eq!("MANTER".parse::<Recommendation>().unwrap(), Recommendation::Keep);
        assert_eq!(" observar ".parse::<Recommendation>().unwrap(), Recommendation::Watch);
        assert_eq!("SUBSTITUIR".parse::<Recommendation>().unwrap(), Recommendation::Replace);
        assert!("SELL".parse::<Recommendation>().is_err());
    }

    #[test]
    fn serializes_recommendation_as_upper_case() {
        let v = serde_json::to_value(Recommendation::Replace).unwrap();
        assert_eq!(v, serde_json::json!("REPLACE"));
    }

    #[test]
    fn next_review_is_ten_days_later() {
        let at = Utc.with_ymd_and_hms(2026, 2, 25, 9, 30, 0).unwrap();
        let next = AssetAnalysis::next_review_after(at);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 7, 9, 30, 0).unwrap());
    }
}
