//! HTTP client for the `generateContent` endpoint

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::config::InferenceConfig;
use crate::error::{Error, Result};

use super::wire::{GenerateRequest, GenerateResponse};
use super::InferenceClient;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// reqwest-backed [`InferenceClient`]
pub struct HttpInferenceClient {
    http_client: reqwest::Client,
    url: String,
}

impl HttpInferenceClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        config.validate()?;

        let api_key = config.api_key.as_deref().unwrap_or_default();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key_value = HeaderValue::from_str(api_key)
            .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?;
        key_value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key_value);

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: generate_url(&config.endpoint_base_url, &config.model),
        })
    }

    /// Endpoint this client posts to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport {
                status: e.status().map(|s| s.as_u16()),
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                message: error_text,
            });
        }

        response.json().await.map_err(|e| Error::Transport {
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {}", e),
        })
    }
}

fn generate_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim().trim_end_matches('/'),
        model.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InferenceConfig {
        InferenceConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(HttpInferenceClient::new(&InferenceConfig::default()).is_err());
    }

    #[test]
    fn test_client_with_valid_config() {
        let client = HttpInferenceClient::new(&config()).unwrap();
        assert_eq!(
            client.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_generate_url_trims_trailing_slash() {
        assert_eq!(
            generate_url("http://localhost:9000/", "test-model"),
            "http://localhost:9000/v1beta/models/test-model:generateContent"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = HttpInferenceClient::new(&InferenceConfig {
            endpoint_base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..config()
        })
        .unwrap();
        let request = GenerateRequest {
            contents: vec![],
            generation_config: None,
            system_instruction: None,
        };

        let err = client.generate(&request).await.unwrap_err();
        assert!(err.is_transient());
    }
}
