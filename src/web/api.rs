//! Catalog REST endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::client::UpdateConfigRequest;
use crate::error::CatalogError;
use crate::AppState;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

impl ApiResponse<()> {
    pub fn error(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        })
    }
}

fn catalog_status(error: &CatalogError) -> StatusCode {
    match error {
        CatalogError::InvalidId(_) => StatusCode::BAD_REQUEST,
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::MalformedConfig { .. } | CatalogError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn catalog_error(error: CatalogError) -> Response {
    let status = catalog_status(&error);
    if status.is_server_error() {
        tracing::error!("Catalog error: {}", error);
    } else {
        tracing::debug!("Catalog request rejected: {}", error);
    }
    (status, ApiResponse::error(&error.to_string())).into_response()
}

/// Service status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub panoramas: usize,
    pub generation_configured: bool,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let panoramas = state.catalog.list().map(|ids| ids.len()).unwrap_or(0);

    ApiResponse::success(StatusResponse {
        name: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        panoramas,
        generation_configured: state.generator.is_some(),
    })
}

/// Sorted panorama ids, as a bare JSON array
pub async fn list_panoramas(State(state): State<Arc<AppState>>) -> Response {
    match state.catalog.list() {
        Ok(ids) => Json(ids).into_response(),
        Err(e) => catalog_error(e),
    }
}

/// One metadata record, as a bare JSON object
pub async fn get_panorama(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.catalog.metadata(&id) {
        Ok(metadata) => Json(metadata).into_response(),
        Err(e) => catalog_error(e),
    }
}

/// Persist edited display settings
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    request: Result<Json<UpdateConfigRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                ApiResponse::error(&rejection.body_text()),
            )
                .into_response();
        }
    };

    if request.panorama.is_empty() {
        return (StatusCode::BAD_REQUEST, ApiResponse::error("No panorama provided")).into_response();
    }

    match state.catalog.update(&request.panorama, &request.settings) {
        Ok(metadata) => ApiResponse::success(metadata).into_response(),
        Err(e) => catalog_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::panorama::PanoramaMetadata;
    use crate::web::routes::create_router;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app() -> (TempDir, axum::Router) {
        let dir = TempDir::new().unwrap();
        let canyon = dir.path().join("canyon");
        fs::create_dir(&canyon).unwrap();
        fs::write(canyon.join("config.json"), r#"{"sphereSize": 9, "depthScale": -4, "seed": 7}"#).unwrap();
        fs::write(canyon.join("image.png"), b"png").unwrap();

        let mut config = Config::default();
        config.server.panoramas_dir = dir.path().to_path_buf();
        config.server.static_dir = dir.path().join("public");
        let server = config.server.clone();
        let router = create_router(AppState::with_generator(config, None), &server);
        (dir, router)
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list() {
        let (_dir, app) = app();
        let (status, body) = send(app, get("/api/panorama_list")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["canyon"]));
    }

    #[tokio::test]
    async fn test_metadata() {
        let (_dir, app) = app();
        let (status, body) = send(app, get("/api/panorama/canyon")).await;
        assert_eq!(status, StatusCode::OK);
        let meta: PanoramaMetadata = serde_json::from_value(body).unwrap();
        assert_eq!(meta.id, "canyon");
        assert_eq!(meta.sphere_size, Some(9.0));
        assert_eq!(meta.image_url.as_deref(), Some("/panoramas/canyon/image.png"));
    }

    #[tokio::test]
    async fn test_metadata_unknown_and_invalid() {
        let (_dir, app) = app();
        let (status, body) = send(app.clone(), get("/api/panorama/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(app, get("/api/panorama/..")).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_update_config() {
        let (dir, app) = app();
        let body = serde_json::json!({
            "panorama": "canyon",
            "sphereSize": 12.0,
            "depthScale": 3.5,
            "meshResolution": 1024
        });
        let (status, response) = send(app, post_json("/api/update_config", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["success"], true);
        assert_eq!(response["data"]["meshResolution"], 1024);

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("canyon/config.json")).unwrap()).unwrap();
        assert_eq!(raw["seed"], 7);
        assert_eq!(raw["sphereSize"], 12.0);
    }

    #[tokio::test]
    async fn test_update_config_errors() {
        let (_dir, app) = app();
        let settings = |panorama: &str| {
            serde_json::json!({
                "panorama": panorama,
                "sphereSize": 6.0,
                "depthScale": 4.0,
                "meshResolution": 256
            })
        };

        let (status, body) = send(app.clone(), post_json("/api/update_config", settings(""))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No panorama provided");

        let (status, _) = send(app.clone(), post_json("/api/update_config", settings("ghost"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            app,
            post_json("/api/update_config", serde_json::json!({ "sphereSize": 6.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_panorama_files_served() {
        let (_dir, app) = app();
        let response = app.oneshot(get("/panoramas/canyon/config.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
