//! Resource loading
//!
//! [`ResourceLoader`] turns remote records and images into typed results.
//! Implementations never panic and never let an error escape as anything but
//! a returned `Err`; callers decide which failures matter.

#[cfg(test)]
pub(crate) mod fake;
pub mod http;

pub use http::HttpResourceLoader;

use futures::future::BoxFuture;

use crate::error::{FetchError, LoadError};
use crate::panorama::PanoramaMetadata;
use crate::render::{Texture, TextureSlot};

/// Asynchronous access to the panorama API
pub trait ResourceLoader: Send + Sync + 'static {
    /// Ordered list of panorama ids
    fn fetch_panorama_list(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>>;

    /// Metadata record for one panorama
    fn fetch_metadata<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<PanoramaMetadata, FetchError>>;

    /// Fetch and decode one image into a texture for `slot`
    fn fetch_texture<'a>(
        &'a self,
        slot: TextureSlot,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Texture, LoadError>>;
}
