//! Pushing edited display settings back to the catalog

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::{ConfigError, HoloscapeError, SyncError};
use crate::panorama::DisplaySettings;

/// Body of `POST /api/update_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfigRequest {
    pub panorama: String,
    #[serde(flatten)]
    pub settings: DisplaySettings,
}

/// Best-effort persistence of display settings
pub trait ConfigSyncAdapter: Send + Sync + 'static {
    fn push<'a>(
        &'a self,
        panorama: &'a str,
        settings: DisplaySettings,
    ) -> BoxFuture<'a, Result<(), SyncError>>;
}

/// Push in the background. Failures are logged and never touch local state.
pub fn push_detached(
    sync: Arc<dyn ConfigSyncAdapter>,
    panorama: String,
    settings: DisplaySettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match sync.push(&panorama, settings).await {
            Ok(()) => tracing::info!("Config updated for {}", panorama),
            Err(e) => tracing::warn!("Failed to update config for {}: {}", panorama, e),
        }
    })
}

/// [`ConfigSyncAdapter`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpConfigSync {
    client: Client,
    url: Url,
}

impl HttpConfigSync {
    pub fn new(client: Client, base: &Url) -> Result<Self, HoloscapeError> {
        let url = base.join("api/update_config").map_err(|e| ConfigError::InvalidValue {
            field: "viewer.api_base_url".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ConfigSyncAdapter for HttpConfigSync {
    fn push<'a>(
        &'a self,
        panorama: &'a str,
        settings: DisplaySettings,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            let body = UpdateConfigRequest {
                panorama: panorama.to_string(),
                settings,
            };
            tracing::debug!("Pushing settings for {}: {:?}", panorama, settings);

            let response = self
                .client
                .post(self.url.clone())
                .json(&body)
                .send()
                .await
                .map_err(|e| SyncError::Transport {
                    url: self.url.to_string(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(SyncError::Rejected {
                    url: self.url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(())
        }
        .boxed()
    }
}
