//! HTTP provider client implementation
//!
//! This module implements the ProviderClient trait against the voice-agent
//! provider's REST API: `POST /runs` to place a call, `GET /runs/{id}` to poll.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode, Url};
use serde_json::{Value, json};

use crate::provider::client::{PollOutcome, ProviderClient, ProviderError, TriggerRequest, TriggeredRun};

/// Default provider API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.voice-provider.example/v1";

/// Environment variable holding the API key unless configured otherwise
pub const DEFAULT_API_KEY_ENV: &str = "DIALER_PROVIDER_API_KEY";

/// Configuration for the HTTP provider client
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    /// Voice agent that should place the calls
    pub agent_id: Option<String>,
    pub api_key_env: String,
    pub timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            agent_id: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpProviderConfig {
    /// Create a new config pointing at a specific base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Provider API client
pub struct HttpProviderClient {
    client: Client,
    api_key: String,
    config: HttpProviderConfig,
}

impl HttpProviderClient {
    /// Create a new client
    ///
    /// Reads the API key from the environment variable named in the config
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| ProviderError::MissingApiKey {
            env_var: config.api_key_env.clone(),
        })?;

        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn runs_url(&self) -> String {
        format!("{}/runs", self.config.base_url.trim_end_matches('/'))
    }

    /// URL of one run; the id is percent-encoded as a single path segment
    fn run_url(&self, run_id: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.runs_url()).map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.config.base_url.clone()))?
            .push(run_id);
        Ok(url)
    }

    /// Build the request body for a trigger call
    fn build_trigger_body(&self, request: &TriggerRequest) -> Value {
        let mut body = json!({
            "phone_number": request.phone_number,
            "metadata": request.metadata,
        });

        if let Some(agent_id) = &self.config.agent_id {
            body["agent_id"] = json!(agent_id);
        }

        body
    }

    /// Read the run id out of a trigger response
    fn parse_run_id(body: &Value) -> Result<String, ProviderError> {
        let candidates = [
            body.get("run_id"),
            body.get("id"),
            body.get("runId"),
            body.pointer("/data/run_id"),
            body.pointer("/data/id"),
        ];

        candidates
            .into_iter()
            .flatten()
            .find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or(ProviderError::MissingRunId)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn trigger(&self, request: TriggerRequest) -> Result<TriggeredRun, ProviderError> {
        let body = self.build_trigger_body(&request);

        let response = self
            .client
            .post(self.runs_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse trigger response: {}", e)))?;

        let run_id = Self::parse_run_id(&body)?;
        debug!("Provider accepted call, run {}", run_id);
        Ok(TriggeredRun { run_id })
    }

    async fn poll_status(&self, run_id: &str) -> PollOutcome {
        let url = match self.run_url(run_id) {
            Ok(url) => url,
            Err(e) => return PollOutcome::Unavailable(e.to_string()),
        };
        let response = match self.client.get(url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response,
            Err(e) => return PollOutcome::Unavailable(format!("Request failed: {}", e)),
        };

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return PollOutcome::NotFound;
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                warn!("Polling run {} returned {}: {}", run_id, status, message);
            }
            return PollOutcome::Unavailable(format!("API error {}: {}", status, message));
        }

        match response.json::<Value>().await {
            Ok(body) => PollOutcome::Response(body),
            Err(e) => PollOutcome::Unavailable(format!("Failed to parse poll response: {}", e)),
        }
    }
}

impl std::fmt::Debug for HttpProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProviderClient")
            .field("base_url", &self.config.base_url)
            .field("agent_id", &self.config.agent_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpProviderClient {
        let config = HttpProviderConfig {
            agent_id: Some("agent-7".to_string()),
            ..HttpProviderConfig::with_base_url("https://provider.test/v1/")
        };
        HttpProviderClient::with_api_key("secret-key".to_string(), config).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = HttpProviderConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.agent_id.is_none());
    }

    #[test]
    fn test_client_without_api_key() {
        let config = HttpProviderConfig {
            api_key_env: "DIALER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let result = HttpProviderClient::new(config);
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let client = client();
        assert_eq!(client.runs_url(), "https://provider.test/v1/runs");
        assert_eq!(client.run_url("r-1").unwrap().as_str(), "https://provider.test/v1/runs/r-1");
    }

    #[test]
    fn test_run_id_is_one_encoded_segment() {
        let client = client();
        let url = client.run_url("a/b?c d").unwrap();
        assert_eq!(url.as_str(), "https://provider.test/v1/runs/a%2Fb%3Fc%20d");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_run_url_rejects_bad_base() {
        let client = HttpProviderClient::with_api_key(
            "k".to_string(),
            HttpProviderConfig::with_base_url("not a url"),
        )
        .unwrap();
        assert!(matches!(client.run_url("r-1"), Err(ProviderError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_trigger_body() {
        let client = client();
        let request = TriggerRequest {
            phone_number: "+4915112345678".to_string(),
            metadata: json!({"call_id": 3}),
        };

        let body = client.build_trigger_body(&request);

        assert_eq!(body["phone_number"], "+4915112345678");
        assert_eq!(body["metadata"]["call_id"], 3);
        assert_eq!(body["agent_id"], "agent-7");
    }

    #[test]
    fn test_build_trigger_body_without_agent() {
        let client =
            HttpProviderClient::with_api_key("k".to_string(), HttpProviderConfig::default()).unwrap();
        let request = TriggerRequest {
            phone_number: "+1".to_string(),
            metadata: json!({}),
        };
        let body = client.build_trigger_body(&request);
        assert!(body.get("agent_id").is_none());
    }

    #[test]
    fn test_parse_run_id_variants() {
        assert_eq!(HttpProviderClient::parse_run_id(&json!({"run_id": "abc"})).unwrap(), "abc");
        assert_eq!(HttpProviderClient::parse_run_id(&json!({"id": 991})).unwrap(), "991");
        assert_eq!(HttpProviderClient::parse_run_id(&json!({"runId": "x-1"})).unwrap(), "x-1");
        assert_eq!(
            HttpProviderClient::parse_run_id(&json!({"data": {"run_id": "nested"}})).unwrap(),
            "nested"
        );
    }

    #[test]
    fn test_parse_run_id_missing() {
        assert!(matches!(
            HttpProviderClient::parse_run_id(&json!({"ok": true})),
            Err(ProviderError::MissingRunId)
        ));
        assert!(matches!(
            HttpProviderClient::parse_run_id(&json!({"run_id": "  "})),
            Err(ProviderError::MissingRunId)
        ));
    }

    #[test]
    fn test_debug_impl() {
        let debug_str = format!("{:?}", client());
        assert!(debug_str.contains("HttpProviderClient"));
        assert!(debug_str.contains("agent-7"));
        // Should NOT contain the API key
        assert!(!debug_str.contains("secret-key"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpProviderClient>();
    }
}
