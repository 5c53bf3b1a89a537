use crate::domain::analysis::{Recommendation, ReviewSource, ReviewVerdict};
use crate::review::{ReviewInput, ReviewStrategy};

/// Confidence reported by the heuristic, regardless of outcome.
pub const DETERMINISTIC_CONFIDENCE: i32 = 60;

const REPLACE_ABOVE_PCT: f64 = 30.0;
const WATCH_ABOVE_PCT: f64 = 15.0;

/// How far `current` is above `ceiling`, in percent. `None` for a non-positive ceiling.
pub fn percent_above_ceiling(current: f64, ceiling: f64) -> Option<f64> {
    if ceiling.is_nan() || ceiling <= 0.0 || !current.is_finite() {
        return None;
    }
    // Multiply before dividing so round figures stay exact (130 vs 100 is 30, not 30.000000000000004).
    Some((current - ceiling) * 100.0 / ceiling)
}

/// Price-vs-ceiling heuristic used whenever the advisory model is not available.
pub fn deterministic_review(current_price: Option<f64>, ceiling_price: Option<f64>) -> ReviewVerdict {
    let percent_above = current_price
        .zip(ceiling_price)
        .and_then(|(current, ceiling)| percent_above_ceiling(current, ceiling).map(|p| (current, ceiling, p)));

    let Some((current, ceiling, pct)) = percent_above else {
        return ReviewVerdict {
            recommendation: Recommendation::Watch,
            confidence_score: DETERMINISTIC_CONFIDENCE,
            analysis_text: "Current or ceiling price unavailable; keeping the asset under watch until \
                            a price comparison is possible."
                .to_string(),
            substitution_suggestion: None,
            source: ReviewSource::Deterministic,
        };
    };

    let (recommendation, text) = if pct > REPLACE_ABOVE_PCT {
        (
            Recommendation::Replace,
            format!(
                "Price {current:.2} is {pct:.1}% above the ceiling of {ceiling:.2}; \
                 consider replacing it with a better-valued asset."
            ),
        )
    } else if pct > WATCH_ABOVE_PCT {
        (
            Recommendation::Watch,
            format!(
                "Price {current:.2} is {pct:.1}% above the ceiling of {ceiling:.2}; \
                 hold off on new purchases and watch."
            ),
        )
    } else if pct > 0.0 {
        (
            Recommendation::Keep,
            format!(
                "Price {current:.2} is {pct:.1}% above the ceiling of {ceiling:.2}, \
                 within tolerance; keep."
            ),
        )
    } else {
        (
            Recommendation::Keep,
            format!(
                "Price {current:.2} is at or below the ceiling of {ceiling:.2} ({:.1}% below); keep.",
                -pct
            ),
        )
    };

    ReviewVerdict {
        recommendation,
        confidence_score: DETERMINISTIC_CONFIDENCE,
        analysis_text: text,
        substitution_suggestion: None,
        source: ReviewSource::Deterministic,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicReviewer;

impl DeterministicReviewer {
    pub fn verdict(&self, input: &ReviewInput) -> ReviewVerdict {
        deterministic_review(input.current_price, input.asset.ceiling_price)
    }
}

#[async_trait::async_trait]
impl ReviewStrategy for DeterministicReviewer {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    async fn review(&self, input: &ReviewInput) -> anyhow::Result<ReviewVerdict> {
        Ok(self.verdict(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_thirty_percent_is_watch() {
        let v = deterministic_review(Some(130.0), Some(100.0));
        assert_eq!(v.recommendation, Recommendation::Watch);
    }

    #[test]
    fn above_thirty_percent_is_replace() {
        let v = deterministic_review(Some(140.0), Some(100.0));
        assert_eq!(v.recommendation, Recommendation::Replace);
        assert_eq!(v.substitution_suggestion, None);
    }

    #[test]
    fn up_to_fifteen_percent_is_keep() {
        assert_eq!(deterministic_review(Some(110.0), Some(100.0)).recommendation, Recommendation::Keep);
        assert_eq!(deterministic_review(Some(115.0), Some(100.0)).recommendation, Recommendation::Keep);
        assert_eq!(deterministic_review(Some(80.0), Some(100.0)).recommendation, Recommendation::Keep);
    }

    #[test]
    fn just_above_fifteen_percent_is_watch() {
        let v = deterministic_review(Some(115.5), Some(100.0));
        assert_eq!(v.recommendation, Recommendation::Watch);
    }

    #[test]
    fn missing_price_is_watch_without_substitution() {
        let v = deterministic_review(None, Some(100.0));
        assert_eq!(v.recommendation, Recommendation::Watch);
        assert_eq!(v.substitution_suggestion, None);
        assert!(v.analysis_text.contains("unavailable"));

        let v = deterministic_review(Some(100.0), None);
        assert_eq!(v.recommendation, Recommendation::Watch);
    }

    #[test]
    fn zero_ceiling_is_treated_as_missing() {
        let v = deterministic_review(Some(10.0), Some(0.0));
        assert_eq!(v.recommendation, Recommendation::Watch);
    }

    #[tokio::test]
    async fn strategy_reads_price_and_ceiling_from_input() {
        use crate::domain::catalog::{Asset, AssetType};
        use crate::market::MacroContext;

        let input = ReviewInput {
            portfolio_name: "FII".to_string(),
            asset: Asset {
                ticker: "HGLG11".to_string(),
                name: "CSHG Logistica".to_string(),
                asset_type: AssetType::RealEstateFund,
                ceiling_price: Some(170.0),
                rationale: String::new(),
                expected_yield: None,
            },
            current_price: Some(230.0),
            macro_context: MacroContext::default(),
        };
        let v = DeterministicReviewer.review(&input).await.unwrap();
        assert_eq!(v.recommendation, Recommendation::Replace);
    }

    #[test]
    fn confidence_is_fixed_for_every_outcome() {
        for price in [None, Some(50.0), Some(120.0), Some(200.0)] {
            let v = deterministic_review(price, Some(100.0));
            assert_eq!(v.confidence_score, DETERMINISTIC_CONFIDENCE);
            assert_eq!(v.source, ReviewSource::Deterministic);
        }
    }
}
