//! OpenAI-compatible embedding provider.
//!
//! Talks to any endpoint exposing the `/embeddings` request shape. Retries
//! rate limits and server errors with exponential backoff; timeouts are
//! delegated to the HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EmbedError, EmbedResult, Embedder};
use crate::config::EmbeddingConfig;

/// Embeddings client for OpenAI-compatible endpoints.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_retries: usize,
}

impl OpenAiEmbedder {
    /// Build a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &EmbeddingConfig) -> EmbedResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EmbedError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            &api_key,
            &config.base_url,
            &config.model,
            config.dimension,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    /// Build a client with explicit parameters.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
        max_retries: usize,
    ) -> EmbedResult<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbedError::Config("empty API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(EmbedError::Config("empty model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbedError::Config("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            max_retries,
        })
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(500 * (1 << capped))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[&str]) -> EmbedResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: Some(self.dimension),
        };

        let mut attempt = 0usize;
        loop {
            let response = self.client.post(&self.endpoint).json(&request).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().await?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != texts.len() {
                            return Err(EmbedError::CountMismatch {
                                expected: texts.len(),
                                actual: parsed.data.len(),
                            });
                        }
                        debug!(target: "embedding", batch = texts.len(), "embedded batch");
                        return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
                    }

                    let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                    if Self::should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(target: "embedding", %status, attempt, "retrying embed batch");
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbedError::Provider {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                    if retryable && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(target: "embedding", attempt, "retrying after transport error: {err}");
                        tokio::time::sleep(Self::backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            base_url: "https://api.example.com/v1".to_string(),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_rejects_empty_api_key() {
        let config = test_config();
        let result = OpenAiEmbedder::new(
            "",
            &config.base_url,
            &config.model,
            config.dimension,
            Duration::from_secs(5),
            3,
        );
        assert!(matches!(result, Err(EmbedError::Config(_))));
    }

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let embedder = OpenAiEmbedder::new(
            "key",
            "https://api.example.com/v1/",
            "text-embedding-3-small",
            1536,
            Duration::from_secs(5),
            3,
        )
        .unwrap();
        assert_eq!(embedder.endpoint, "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(OpenAiEmbedder::backoff(1), Duration::from_millis(1000));
        assert_eq!(OpenAiEmbedder::backoff(5), OpenAiEmbedder::backoff(9));
    }
}
