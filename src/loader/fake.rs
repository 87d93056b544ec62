//! In-memory loader for tests

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::ResourceLoader;
use crate::error::{FetchError, LoadError, LoadFailure};
use crate::panorama::PanoramaMetadata;
use crate::render::{Texture, TextureSlot};

/// Serves canned metadata and 1x1 textures. A gate holds one request
/// (`meta:<id>` or a texture url) until its sender fires or drops.
#[derive(Default)]
pub struct FakeLoader {
    list: Option<Vec<String>>,
    fail_list: bool,
    metadata: HashMap<String, PanoramaMetadata>,
    images: HashSet<String>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    metadata_requests: AtomicUsize,
    texture_requests: AtomicUsize,
}

impl FakeLoader {
    pub fn with_panorama(mut self, id: &str, metadata: PanoramaMetadata) -> Self {
        self.metadata.insert(id.to_string(), metadata);
        self
    }

    pub fn with_image(mut self, url: &str) -> Self {
        self.images.insert(url.to_string());
        self
    }

    /// Serve this list instead of the sorted metadata keys
    pub fn with_list(mut self, ids: &[&str]) -> Self {
        self.list = Some(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn gate(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), rx);
        tx
    }

    pub fn metadata_requests(&self) -> usize {
        self.metadata_requests.load(Ordering::SeqCst)
    }

    pub fn texture_requests(&self) -> usize {
        self.texture_requests.load(Ordering::SeqCst)
    }

    async fn wait_gate(&self, key: &str) {
        let gate = self.gates.lock().unwrap().remove(key);
        if let Some(rx) = gate {
            let _ = rx.await;
        }
    }
}

impl ResourceLoader for FakeLoader {
    fn fetch_panorama_list(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>> {
        async move {
            if self.fail_list {
                return Err(FetchError::Transport {
                    url: "api/panorama_list".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            if let Some(ref list) = self.list {
                return Ok(list.clone());
            }
            let mut ids: Vec<String> = self.metadata.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }
        .boxed()
    }

    fn fetch_metadata<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<PanoramaMetadata, FetchError>> {
        async move {
            self.metadata_requests.fetch_add(1, Ordering::SeqCst);
            self.wait_gate(&format!("meta:{id}")).await;
            self.metadata.get(id).cloned().ok_or(FetchError::Status {
                url: format!("api/panorama/{id}"),
                status: 404,
            })
        }
        .boxed()
    }

    fn fetch_texture<'a>(
        &'a self,
        slot: TextureSlot,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Texture, LoadError>> {
        async move {
            self.texture_requests.fetch_add(1, Ordering::SeqCst);
            self.wait_gate(url).await;
            if !self.images.contains(url) {
                return Err(LoadError::new(slot, url, LoadFailure::Status(404)));
            }
            Texture::from_rgba(url, 1, 1, vec![255, 255, 255, 255], slot)
                .ok_or_else(|| LoadError::new(slot, url, LoadFailure::Decode("bad pixels".into())))
        }
        .boxed()
    }
}
