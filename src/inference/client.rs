//! HTTP client for the remote inference proxy
//!
//! One network round trip per prompt; no retries here. Retry policy, if
//! any, belongs to the caller. The proxy speaks the generation service's
//! native payload shape: the reply text is the first candidate's first
//! content part, and error bodies carry a human-readable `message` field
//! that is surfaced verbatim.

use crate::{KaiwaError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the inference round trip
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Proxy endpoint receiving `POST {"prompt": ...}`
    pub endpoint: String,

    /// Bearer credential forwarded to the proxy
    pub api_key: Option<String>,

    /// Round-trip timeout
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/generate".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl InferenceConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Single-prompt client for the remote service
#[derive(Clone)]
pub struct InferenceClient {
    config: InferenceConfig,
    client: reqwest::Client,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KaiwaError::ConfigError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Send one prompt and return the generated text
    ///
    /// Empty prompts are rejected before any network traffic.
    pub async fn send(&self, prompt: &str) -> Result<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(KaiwaError::InferenceInvalidInput);
        }

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&GenerateRequest { prompt });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KaiwaError::InferenceNetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| KaiwaError::InferenceNetworkError(e.to_string()))?;

        extract_reply(&body)
    }
}

/// Map a non-2xx status and its body to a typed failure
///
/// 401/403 is a credential problem regardless of body. Anything else
/// surfaces the body's `message` field verbatim, falling back to the raw
/// body when the field is missing or the body is not JSON.
fn classify_failure(status: reqwest::StatusCode, body: &str) -> KaiwaError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return KaiwaError::InferenceUnauthorized;
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());

    KaiwaError::InferenceServiceError {
        status: status.as_u16(),
        message,
    }
}

/// Extract the first candidate's first content-part text
///
/// A 2xx payload with zero candidates or an empty part is an
/// `InferenceMalformed` failure, never a silent empty string.
fn extract_reply(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| KaiwaError::InferenceMalformed(format!("unparseable payload: {}", e)))?;

    let text = parsed
        .candidates
        .first()
        .and_then(|candidate| candidate.content.parts.first())
        .map(|part| part.text.clone())
        .ok_or_else(|| KaiwaError::InferenceMalformed("no candidates in payload".to_string()))?;

    if text.is_empty() {
        return Err(KaiwaError::InferenceMalformed(
            "empty content part".to_string(),
        ));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_reply_first_candidate_first_part() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "You're welcome!"}, {"text": "second part"}]}},
                {"content": {"parts": [{"text": "second candidate"}]}}
            ]
        }"#;
        assert_eq!(extract_reply(body).unwrap(), "You're welcome!");
    }

    #[test]
    fn test_extract_reply_zero_candidates_is_malformed() {
        let err = extract_reply(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, KaiwaError::InferenceMalformed(_)));

        let err = extract_reply(r#"{}"#).unwrap_err();
        assert!(matches!(err, KaiwaError::InferenceMalformed(_)));
    }

    #[test]
    fn test_extract_reply_empty_part_is_malformed() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": ""}]}}]}"#;
        assert!(matches!(
            extract_reply(body).unwrap_err(),
            KaiwaError::InferenceMalformed(_)
        ));
    }

    #[test]
    fn test_extract_reply_unparseable_is_malformed() {
        assert!(matches!(
            extract_reply("not json").unwrap_err(),
            KaiwaError::InferenceMalformed(_)
        ));
    }

    #[test]
    fn test_classify_failure_surfaces_message_field() {
        let err = classify_failure(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message": "quota exceeded"}"#,
        );
        match err {
            KaiwaError::InferenceServiceError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_classify_failure_falls_back_to_raw_body() {
        // Not JSON at all
        let err = classify_failure(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            KaiwaError::InferenceServiceError { status: 502, ref message } if message == "upstream down"
        ));

        // JSON without the message field
        let err = classify_failure(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"code": 13}"#,
        );
        assert!(matches!(
            err,
            KaiwaError::InferenceServiceError { ref message, .. } if message == r#"{"code": 13}"#
        ));
    }

    #[test]
    fn test_classify_failure_credential_rejection() {
        for status in [
            reqwest::StatusCode::UNAUTHORIZED,
            reqwest::StatusCode::FORBIDDEN,
        ] {
            assert!(matches!(
                classify_failure(status, r#"{"message": "bad key"}"#),
                KaiwaError::InferenceUnauthorized
            ));
        }
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_network() {
        // Unroutable endpoint: the guard must fire before any connection
        let config = InferenceConfig::default().with_endpoint("http://0.0.0.0:1/api");
        let client = InferenceClient::new(config).unwrap();

        assert!(matches!(
            client.send("   ").await.unwrap_err(),
            KaiwaError::InferenceInvalidInput
        ));
    }
}
