//! Prompt submission to the image-generation service

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{ConfigError, GenerationError, HoloscapeError};
use crate::AppState;

/// One node of a generation workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowNode {
    pub class_type: String,
    pub inputs: Value,
}

/// Workflow graph sent to the generation service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub nodes: Vec<WorkflowNode>,
}

impl Workflow {
    /// Text-to-panorama workflow seeded with `prompt`
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            nodes: vec![WorkflowNode {
                class_type: "CLIPTextEncode".to_string(),
                inputs: serde_json::json!({ "text": prompt }),
            }],
        }
    }
}

/// Something that can run a workflow and return its JSON result
pub trait GenerationBackend: Send + Sync + 'static {
    fn run_workflow<'a>(&'a self, workflow: &'a Workflow) -> BoxFuture<'a, Result<Value, GenerationError>>;
}

/// ComfyUI HTTP client
#[derive(Debug, Clone)]
pub struct ComfyUiClient {
    client: Client,
    url: Url,
}

impl ComfyUiClient {
    /// `None` when no endpoint is configured
    pub fn from_config(config: &GenerationConfig) -> Result<Option<Self>, HoloscapeError> {
        let Some(endpoint) = config.endpoint.as_deref() else {
            return Ok(None);
        };

        let raw = format!("{}{}", endpoint.trim_end_matches('/'), config.workflow_path);
        let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
            field: "generation.endpoint".to_string(),
            message: format!("{}: {}", raw, e),
        })?;

        let mut builder = Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder.build().map_err(|e| ConfigError::InvalidValue {
            field: "generation".to_string(),
            message: format!("Failed to build HTTP client: {}", e),
        })?;

        tracing::info!("Generation service: {}", url);
        Ok(Some(Self { client, url }))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl GenerationBackend for ComfyUiClient {
    fn run_workflow<'a>(&'a self, workflow: &'a Workflow) -> BoxFuture<'a, Result<Value, GenerationError>> {
        async move {
            let response = self
                .client
                .post(self.url.clone())
                .json(workflow)
                .send()
                .await
                .map_err(|e| GenerationError::Upstream(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GenerationError::Upstream(format!("HTTP {}", status.as_u16())));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| GenerationError::Decode(e.to_string()))
        }
        .boxed()
    }
}

/// Body of `POST /api/submit_prompt`
#[derive(Debug, Deserialize)]
pub struct SubmitPromptRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Forward a prompt to the generation service
pub async fn submit_prompt(
    State(state): State<Arc<AppState>>,
    request: Option<Json<SubmitPromptRequest>>,
) -> Response {
    let prompt = request
        .and_then(|Json(request)| request.prompt)
        .filter(|prompt| !prompt.is_empty());
    let Some(prompt) = prompt else {
        return (StatusCode::BAD_REQUEST, "No prompt provided").into_response();
    };

    let Some(generator) = state.generator.as_ref() else {
        tracing::error!("Prompt received but no generation endpoint is configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, "COMFYUI_ENDPOINT not configured").into_response();
    };

    let workflow = Workflow::from_prompt(&prompt);
    match generator.run_workflow(&workflow).await {
        Ok(result) => {
            tracing::info!("Generation workflow finished");
            Json(serde_json::json!({ "status": "ok", "result": result })).into_response()
        }
        Err(e) => {
            tracing::error!("Error calling ComfyUI: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error calling ComfyUI").into_response()
        }
    }
}

pub async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ServerConfig};
    use crate::web::routes::create_router;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Counts calls; fails when `fail` is set
    #[derive(Default)]
    struct FakeGenerator {
        fail: bool,
        calls: AtomicUsize,
        last: Mutex<Option<Workflow>>,
    }

    impl GenerationBackend for FakeGenerator {
        fn run_workflow<'a>(&'a self, workflow: &'a Workflow) -> BoxFuture<'a, Result<Value, GenerationError>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                *self.last.lock().unwrap() = Some(workflow.clone());
                if self.fail {
                    return Err(GenerationError::Upstream("connection refused".to_string()));
                }
                Ok(serde_json::json!({ "prompt_id": "abc" }))
            }
            .boxed()
        }
    }

    fn app(generator: Option<Arc<FakeGenerator>>) -> axum::Router {
        let config = Config::default();
        let server = ServerConfig::default();
        let generator = generator.map(|g| g as Arc<dyn GenerationBackend>);
        create_router(AppState::with_generator(config, generator), &server)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/submit_prompt")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_workflow_carries_prompt() {
        let workflow = Workflow::from_prompt("misty forest");
        let json = serde_json::to_value(&workflow).unwrap();
        assert_eq!(json["nodes"][0]["class_type"], "CLIPTextEncode");
        assert_eq!(json["nodes"][0]["inputs"]["text"], "misty forest");
    }

    #[test]
    fn test_client_url() {
        let config = GenerationConfig {
            endpoint: Some("http://comfy.local:8188/".to_string()),
            ..Default::default()
        };
        let client = ComfyUiClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.url().as_str(), "http://comfy.local:8188/v1/run_workflow");

        assert!(ComfyUiClient::from_config(&GenerationConfig::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_prompt_never_reaches_backend() {
        let generator = Arc::new(FakeGenerator::default());
        let app = app(Some(Arc::clone(&generator)));

        let (status, body) = read(app.clone().oneshot(post(r#"{"prompt": ""}"#)).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "No prompt provided");

        let (status, _) = read(app.oneshot(post("{}")).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompt_forwarded() {
        let generator = Arc::new(FakeGenerator::default());
        let app = app(Some(Arc::clone(&generator)));

        let (status, body) = read(app.oneshot(post(r#"{"prompt": "red desert"}"#)).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["result"]["prompt_id"], "abc");
        assert_eq!(
            generator.last.lock().unwrap().clone(),
            Some(Workflow::from_prompt("red desert"))
        );
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint() {
        let (status, body) = read(app(None).oneshot(post(r#"{"prompt": "x"}"#)).await.unwrap()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "COMFYUI_ENDPOINT not configured");
    }

    #[tokio::test]
    async fn test_upstream_failure() {
        let generator = Arc::new(FakeGenerator {
            fail: true,
            ..Default::default()
        });
        let (status, body) = read(app(Some(generator)).oneshot(post(r#"{"prompt": "x"}"#)).await.unwrap()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Error calling ComfyUI");
    }

    #[tokio::test]
    async fn test_get_not_allowed() {
        let request = Request::builder()
            .uri("/api/submit_prompt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = read(app(None).oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "Method Not Allowed");
    }
}
