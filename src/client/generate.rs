//! Prompt submission from the viewer

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::{ConfigError, HoloscapeError};

/// Outcome of one prompt submission, displayed as the status line
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    /// Blank prompt; nothing was sent
    EmptyPrompt,
    Generating,
    Complete(serde_json::Value),
    Failed(String),
}

impl GenerationStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, GenerationStatus::Complete(_))
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationStatus::EmptyPrompt => write!(f, "Please enter a prompt."),
            GenerationStatus::Generating => write!(f, "Generating..."),
            GenerationStatus::Complete(_) => write!(
                f,
                "Generation complete! If new panoramas were created, refresh to see them."
            ),
            GenerationStatus::Failed(_) => write!(f, "Error generating panorama."),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitPromptResponse {
    #[serde(default)]
    result: serde_json::Value,
}

/// Client for `POST /api/submit_prompt`
#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: Client,
    url: Url,
}

impl GenerationClient {
    pub fn new(client: Client, base: &Url) -> Result<Self, HoloscapeError> {
        let url = base.join("api/submit_prompt").map_err(|e| ConfigError::InvalidValue {
            field: "viewer.api_base_url".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { client, url })
    }

    /// Submit a prompt. Never errors; failures become [`GenerationStatus::Failed`].
    pub async fn submit(&self, prompt: &str) -> GenerationStatus {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return GenerationStatus::EmptyPrompt;
        }

        tracing::info!("Submitting prompt to {}", self.url);
        let response = match self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Prompt submission failed: {}", e);
                return GenerationStatus::Failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Prompt submission rejected with HTTP {}: {}", status, body);
            return GenerationStatus::Failed(format!("HTTP {}: {}", status.as_u16(), body));
        }

        match response.json::<SubmitPromptResponse>().await {
            Ok(body) => GenerationStatus::Complete(body.result),
            Err(e) => {
                tracing::error!("Unreadable generation response: {}", e);
                GenerationStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GenerationClient {
        GenerationClient::new(Client::new(), &Url::parse(base).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_blank_prompt_sends_nothing() {
        // unroutable base: any request would fail instead of returning EmptyPrompt
        let client = client("http://127.0.0.1:9/");
        let status = client.submit("   \n").await;
        assert_eq!(status, GenerationStatus::EmptyPrompt);
        assert_eq!(status.to_string(), "Please enter a prompt.");
    }

    #[tokio::test]
    async fn test_transport_failure_status_line() {
        let client = client("http://127.0.0.1:9/");
        let status = client.submit("a canyon at dusk").await;
        assert!(matches!(status, GenerationStatus::Failed(_)));
        assert_eq!(status.to_string(), "Error generating panorama.");
    }

    #[test]
    fn test_complete_status_line() {
        let status = GenerationStatus::Complete(serde_json::Value::Null);
        assert!(status.is_complete());
        assert_eq!(
            status.to_string(),
            "Generation complete! If new panoramas were created, refresh to see them."
        );
    }
}
