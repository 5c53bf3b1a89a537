use crate::domain::analysis::{Recommendation, ReviewSource, ReviewVerdict};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Wire shape the advisory model is asked to emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAssetReview {
    pub recommendation: String,
    pub confidence: i64,
    pub analysis: String,
    #[serde(default)]
    pub substitution: Option<String>,
}

impl LlmAssetReview {
    pub fn validate_and_into_verdict(self) -> anyhow::Result<ReviewVerdict> {
        let recommendation = self.recommendation.parse::<Recommendation>()?;

        ensure!(
            (0..=100).contains(&self.confidence),
            "confidence must be between 0 and 100 (got {})",
            self.confidence
        );

        let analysis_text = self.analysis.trim().to_string();
        ensure!(!analysis_text.is_empty(), "analysis must be non-empty");

        // Suggestions only make sense when the model tells us to swap the asset.
        let substitution_suggestion = match recommendation {
            Recommendation::Replace => self
                .substitution
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            Recommendation::Keep | Recommendation::Watch => None,
        };

        Ok(ReviewVerdict {
            recommendation,
            confidence_score: self.confidence as i32,
            analysis_text,
            substitution_suggestion,
            source: ReviewSource::Oracle,
        })
    }
}
