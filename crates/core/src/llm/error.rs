use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Advisory call failure with enough of the raw exchange attached to debug it from logs.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn http(provider: Provider, status: reqwest::StatusCode, body: String) -> Self {
        Self {
            provider,
            stage: "http",
            detail: format!("status={status}"),
            raw_response_json: serde_json::from_str::<Value>(&body).ok(),
            raw_output: Some(body),
        }
    }

    pub fn empty_output(provider: Provider) -> Self {
        Self {
            provider,
            stage: "empty_output",
            detail: "response had no text content".to_string(),
            raw_output: None,
            raw_response_json: None,
        }
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "advisory oracle error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_keeps_json_body() {
        let err = LlmDiagnosticsError::http(
            Provider::Anthropic,
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"type":"error","error":{"type":"rate_limit_error"}}"#.to_string(),
        );
        assert_eq!(err.stage, "http");
        assert!(err.raw_response_json.is_some());
        assert!(err.to_string().contains("429"));

        let wrapped: anyhow::Error = err.into();
        assert!(wrapped.downcast_ref::<LlmDiagnosticsError>().is_some());
    }
}
