use crate::domain::analysis::ReviewVerdict;
use crate::llm::json::parse_review;
use crate::llm::prompt::build_review_prompt;
use crate::llm::AdvisoryOracle;
use crate::review::{ReviewInput, ReviewStrategy};
use anyhow::Context;
use std::sync::Arc;

/// Strategy backed by the advisory model.
#[derive(Clone)]
pub struct OracleReviewer {
    oracle: Arc<dyn AdvisoryOracle>,
}

impl OracleReviewer {
    pub fn new(oracle: Arc<dyn AdvisoryOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait::async_trait]
impl ReviewStrategy for OracleReviewer {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn is_available(&self) -> bool {
        self.oracle.is_configured()
    }

    async fn review(&self, input: &ReviewInput) -> anyhow::Result<ReviewVerdict> {
        anyhow::ensure!(self.oracle.is_configured(), "advisory oracle is not configured");

        let prompt = build_review_prompt(input);
        let text = self
            .oracle
            .evaluate(&prompt)
            .await
            .with_context(|| format!("advisory oracle failed (provider={:?})", self.oracle.provider()))?;
        parse_review(&text)
    }
}
