pub mod anthropic;
pub mod error;
pub mod json;
pub mod prompt;

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}

/// Natural-language model used for qualitative judgment. Unreliable and optional.
#[async_trait::async_trait]
pub trait AdvisoryOracle: Send + Sync {
    fn provider(&self) -> Provider;

    fn is_configured(&self) -> bool;

    async fn evaluate(&self, prompt: &str) -> anyhow::Result<String>;
}
