//! reqwest-backed resource loader

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::ResourceLoader;
use crate::config::ViewerConfig;
use crate::error::{ConfigError, FetchError, HoloscapeError, LoadError, LoadFailure};
use crate::panorama::PanoramaMetadata;
use crate::render::{Texture, TextureSlot};

/// Loader talking to the panorama API over HTTP
#[derive(Debug, Clone)]
pub struct HttpResourceLoader {
    client: Client,
    base: Url,
    list_path: String,
    metadata_path: String,
}

impl HttpResourceLoader {
    pub fn new(config: &ViewerConfig) -> Result<Self, HoloscapeError> {
        let base = parse_base(&config.api_base_url)?;

        let mut builder = Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder.build().map_err(|e| ConfigError::InvalidValue {
            field: "viewer".to_string(),
            message: format!("Failed to build HTTP client: {}", e),
        })?;

        Ok(Self::with_client(client, base, config))
    }

    pub fn with_client(client: Client, base: Url, config: &ViewerConfig) -> Self {
        Self {
            client,
            base,
            list_path: config.list_path.clone(),
            metadata_path: config.metadata_path.clone(),
        }
    }

    /// Shared HTTP client (cheap to clone)
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a path relative to the API base. Absolute URLs pass through.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, String> {
        self.base.join(path_or_url).map_err(|e| e.to_string())
    }

    /// GET a JSON document
    pub async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self.resolve(path).map_err(|message| FetchError::InvalidUrl {
            url: path.to_string(),
            message,
        })?;
        let url_string = url.to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url_string.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url_string,
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| FetchError::Decode {
            url: url_string,
            message: e.to_string(),
        })
    }

    /// GET an image and decode it off the async threads
    pub async fn fetch_image(&self, slot: TextureSlot, path: &str) -> Result<Texture, LoadError> {
        let fail = |reason| LoadError::new(slot, path, reason);

        let url = self
            .resolve(path)
            .map_err(|e| fail(LoadFailure::InvalidUrl(e)))?;
        let source = url.to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(LoadFailure::Transport(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(LoadFailure::Status(status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fail(LoadFailure::Transport(e.to_string())))?;

        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| fail(LoadFailure::Decode(e.to_string())))?
            .map_err(|e| fail(LoadFailure::Decode(e.to_string())))?;

        tracing::debug!(
            "Decoded {} map {} ({}x{})",
            slot,
            source,
            decoded.width(),
            decoded.height()
        );
        Ok(Texture::from_image(source, decoded, slot))
    }

    fn metadata_path_for(&self, id: &str) -> String {
        self.metadata_path.replace("{id}", id)
    }
}

impl ResourceLoader for HttpResourceLoader {
    fn fetch_panorama_list(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>> {
        async move { self.fetch_json::<Vec<String>>(&self.list_path).await }.boxed()
    }

    fn fetch_metadata<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<PanoramaMetadata, FetchError>> {
        async move {
            let mut metadata: PanoramaMetadata = self.fetch_json(&self.metadata_path_for(id)).await?;
            if metadata.id.is_empty() {
                metadata.id = id.to_string();
            }
            Ok(metadata)
        }
        .boxed()
    }

    fn fetch_texture<'a>(
        &'a self,
        slot: TextureSlot,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Texture, LoadError>> {
        self.fetch_image(slot, url).boxed()
    }
}

/// Parse the API base, forcing a trailing slash so relative joins append
pub fn parse_base(raw: &str) -> Result<Url, HoloscapeError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|e| {
        ConfigError::InvalidValue {
            field: "viewer.api_base_url".to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(base: &str) -> HttpResourceLoader {
        let config = ViewerConfig {
            api_base_url: base.to_string(),
            ..Default::default()
        };
        HttpResourceLoader::new(&config).unwrap()
    }

    #[test]
    fn test_base_gets_trailing_slash() {
        let loader = loader("http://example.com/viewer");
        assert_eq!(loader.base_url().as_str(), "http://example.com/viewer/");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let loader = loader("http://example.com/app/");
        assert_eq!(
            loader.resolve("panoramas/p1/image.png").unwrap().as_str(),
            "http://example.com/app/panoramas/p1/image.png"
        );
        assert_eq!(
            loader.resolve("/panoramas/p1/depth.png").unwrap().as_str(),
            "http://example.com/panoramas/p1/depth.png"
        );
        assert_eq!(
            loader.resolve("https://cdn.example/x.png").unwrap().as_str(),
            "https://cdn.example/x.png"
        );
    }

    #[test]
    fn test_metadata_path_template() {
        let loader = loader("http://example.com/");
        assert_eq!(loader.metadata_path_for("p1"), "api/panorama/p1");
    }

    #[test]
    fn test_invalid_base_rejected() {
        assert!(parse_base("not a url").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_typed_error() {
        let loader = loader("http://127.0.0.1:9/");
        let err = loader
            .fetch_texture(TextureSlot::Displacement, "panoramas/p1/depth.png")
            .await
            .unwrap_err();
        assert_eq!(err.slot, TextureSlot::Displacement);
        assert!(err.is_ignorable());
        assert!(matches!(err.reason, LoadFailure::Transport(_)));
    }
}
