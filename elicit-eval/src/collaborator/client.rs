//! OpenAI-compatible chat-completions client

use super::{CollaboratorError, GenerationRequest, TextGenerator};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default public endpoint
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// Which flavour of the chat-completions API to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Bearer auth with `OPENAI_API_KEY`
    OpenAi,
    /// `api-key` header with `AZURE_OPENAI_API_KEY`; the model is the deployment name
    Azure,
}

impl Provider {
    /// Environment variable holding the API key
    pub fn key_variable(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Azure => "AZURE_OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [super::ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// HTTP client for the chat-completions endpoint
pub struct ChatCompletionsClient {
    provider: Provider,
    endpoint: String,
    api_version: String,
    api_key: Option<String>,
    client: Client,
}

impl ChatCompletionsClient {
    /// Create a client; the key is read from the provider's environment variable.
    ///
    /// For Azure the endpoint falls back to `AZURE_OPENAI_ENDPOINT`.
    pub fn new(
        provider: Provider,
        endpoint: Option<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let endpoint = endpoint
            .or_else(|| match provider {
                Provider::Azure => std::env::var("AZURE_OPENAI_ENDPOINT").ok(),
                Provider::OpenAi => None,
            })
            .unwrap_or_else(|| OPENAI_ENDPOINT.to_string());
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            provider,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            api_key: std::env::var(provider.key_variable()).ok(),
            client,
        }
    }

    /// Override the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Check if an API key is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Full request URL for a model
    pub fn url_for(&self, model: &str) -> String {
        match self.provider {
            Provider::OpenAi => format!("{}/chat/completions", self.endpoint),
            Provider::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint, model, self.api_version
            ),
        }
    }
}

/// Map an HTTP status to the collaborator error taxonomy
pub fn classify_status(status: StatusCode) -> CollaboratorError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        CollaboratorError::RateLimited
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        CollaboratorError::Timeout
    } else if status.is_server_error() {
        CollaboratorError::Server(status.as_u16())
    } else {
        CollaboratorError::Http(status.as_u16())
    }
}

/// Pull the first choice's text out of a response body
pub fn extract_content(body: &str) -> Result<String, CollaboratorError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| CollaboratorError::Malformed("response has no content".to_string()))
}

impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            CollaboratorError::NotConfigured(format!("{} is not set", self.provider.key_variable()))
        })?;

        let body = ChatRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        let builder = self.client.post(self.url_for(&request.model)).json(&body);
        let builder = match self.provider {
            Provider::OpenAi => builder.bearer_auth(api_key),
            Provider::Azure => builder.header("api-key", api_key),
        };

        debug!(model = %request.model, messages = request.messages.len(), "Calling chat completions");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout
            } else if e.is_connect() {
                CollaboratorError::Network(e.to_string())
            } else {
                CollaboratorError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let text = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
        extract_content(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::ChatMessage;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), CollaboratorError::RateLimited);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), CollaboratorError::Server(502));
        assert_eq!(classify_status(StatusCode::GATEWAY_TIMEOUT), CollaboratorError::Timeout);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), CollaboratorError::Http(401));
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": " Mute microphone \n"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "Mute microphone");
    }

    #[test]
    fn test_extract_content_rejects_empty_and_garbage() {
        assert!(matches!(
            extract_content(r#"{"choices": []}"#),
            Err(CollaboratorError::Malformed(_))
        ));
        assert!(matches!(
            extract_content(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(CollaboratorError::Malformed(_))
        ));
        assert!(matches!(extract_content("<html>"), Err(CollaboratorError::Malformed(_))));
    }

    #[test]
    fn test_urls() {
        let openai = ChatCompletionsClient::new(
            Provider::OpenAi,
            Some("https://example.test/v1/".into()),
            "2024-02-01",
            Duration::from_secs(1),
        );
        assert_eq!(openai.url_for("gpt-4o"), "https://example.test/v1/chat/completions");

        let azure = ChatCompletionsClient::new(
            Provider::Azure,
            Some("https://res.openai.azure.com".into()),
            "2024-02-01",
            Duration::from_secs(1),
        );
        assert_eq!(
            azure.url_for("gpt-4o"),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_without_network() {
        let client = ChatCompletionsClient {
            provider: Provider::OpenAi,
            endpoint: "http://127.0.0.1:1".into(),
            api_version: String::new(),
            api_key: None,
            client: Client::new(),
        };
        let request = GenerationRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 5,
            temperature: 0.0,
            top_p: 0.1,
        };
        assert!(matches!(
            client.generate(&request).await,
            Err(CollaboratorError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let client = ChatCompletionsClient::new(
            Provider::OpenAi,
            Some("http://127.0.0.1:1".into()),
            "",
            Duration::from_millis(500),
        )
        .with_api_key("test-key");
        let request = GenerationRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 5,
            temperature: 0.0,
            top_p: 0.1,
        };
        let error = client.generate(&request).await.unwrap_err();
        assert!(error.is_transient(), "unexpected error: {:?}", error);
    }
}
