//! Panorama load/render lifecycle.
//!
//! Owns the "current panorama" slot of a [`ViewerRuntime`]:
//!
//! ```text
//! Idle -> FetchingMetadata -> BuildingAsset -> Attached -> TexturesLoading -> Ready
//!              |                                                  |
//!              +-> Failed                                         +-> Degraded
//! ```
//!
//! Every selection takes a new [`Generation`]. Texture loads run as detached
//! tasks and report back over a channel tagged with the generation that
//! issued them; [`PanoramaLifecycle::pump`] applies a result only if that
//! generation installed the asset that is still attached. A selection whose
//! metadata fetch fails installs nothing, so loads for the asset left on
//! screen keep landing. Superseded loads are not aborted, their results are
//! dropped on arrival.
//!
//! [`ViewerRuntime`]: crate::render::ViewerRuntime

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

use super::builder::{build_with, AssetDescriptor, BuildDefaults};
use super::metadata::{DisplaySettings, PanoramaMetadata};
use crate::error::{LifecycleError, LoadError, LoadFailure};
use crate::loader::ResourceLoader;
use crate::render::{lock_viewer, AssetId, SharedViewer, Texture, TextureSlot};

/// Monotonic selection counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    /// Assets are keyed by the generation that created them
    pub fn asset_id(self) -> AssetId {
        AssetId(self.0)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the latest selection stands
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LifecyclePhase {
    #[default]
    Idle,
    FetchingMetadata,
    BuildingAsset,
    Attached,
    TexturesLoading,
    /// Colour map bound
    Ready,
    /// Geometry visible but the colour map failed to load
    Degraded(String),
    /// Nothing new shown; the previous panorama (if any) is untouched
    Failed(String),
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecyclePhase::Idle => write!(f, "idle"),
            LifecyclePhase::FetchingMetadata => write!(f, "fetching metadata"),
            LifecyclePhase::BuildingAsset => write!(f, "building asset"),
            LifecyclePhase::Attached => write!(f, "attached"),
            LifecyclePhase::TexturesLoading => write!(f, "loading textures"),
            LifecyclePhase::Ready => write!(f, "ready"),
            LifecyclePhase::Degraded(reason) => write!(f, "degraded ({})", reason),
            LifecyclePhase::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Snapshot published to observers (UI, logs)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LifecycleStatus {
    pub generation: Generation,
    pub panorama: Option<String>,
    pub phase: LifecyclePhase,
    /// Effective display values of the attached panorama
    pub settings: Option<DisplaySettings>,
}

/// A finished texture fetch, tagged with the generation that issued it
#[derive(Debug)]
pub struct TextureLoad {
    pub generation: Generation,
    pub slot: TextureSlot,
    pub result: Result<Texture, LoadError>,
}

/// What happened to one [`TextureLoad`]
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Written into the attached asset
    Applied(TextureSlot),
    /// Superseded; nothing was touched
    Discarded(TextureSlot),
    /// Load failed for the current asset
    Failed { slot: TextureSlot, ignorable: bool },
}

/// Result of [`PanoramaLifecycle::apply_settings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsApplied {
    /// Panorama that was rebuilt
    pub panorama: String,
    pub generation: Generation,
}

/// Metadata behind the attached asset
#[derive(Debug, Clone)]
struct Installed {
    generation: Generation,
    metadata: PanoramaMetadata,
}

/// The lifecycle manager
pub struct PanoramaLifecycle {
    loader: Arc<dyn ResourceLoader>,
    viewer: SharedViewer,
    defaults: BuildDefaults,
    generation: AtomicU64,
    status: watch::Sender<LifecycleStatus>,
    loads_tx: mpsc::UnboundedSender<TextureLoad>,
    loads_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TextureLoad>>,
    installed: Mutex<Option<Installed>>,
}

impl PanoramaLifecycle {
    pub fn new(loader: Arc<dyn ResourceLoader>, viewer: SharedViewer, defaults: BuildDefaults) -> Self {
        let (status, _) = watch::channel(LifecycleStatus::default());
        let (loads_tx, loads_rx) = mpsc::unbounded_channel();

        Self {
            loader,
            viewer,
            defaults,
            generation: AtomicU64::new(0),
            status,
            loads_tx,
            loads_rx: tokio::sync::Mutex::new(loads_rx),
            installed: Mutex::new(None),
        }
    }

    pub fn viewer(&self) -> &SharedViewer {
        &self.viewer
    }

    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    /// Observe phase changes
    pub fn subscribe(&self) -> watch::Receiver<LifecycleStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status.borrow().clone()
    }

    pub fn current_generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::SeqCst))
    }

    fn next_generation(&self) -> Generation {
        Generation(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.current_generation() == generation
    }

    /// Load a panorama and make it the attached one.
    ///
    /// Returns once the asset is attached and both texture loads are in
    /// flight. On metadata failure the previously attached asset stays.
    pub async fn select_panorama(&self, id: &str) -> Result<Generation, LifecycleError> {
        let generation = self.next_generation();
        tracing::info!("Loading panorama: {} (generation {})", id, generation);
        self.begin(generation, id);

        let mut metadata = match self.loader.fetch_metadata(id).await {
            Ok(metadata) => metadata,
            Err(source) => {
                tracing::error!("No config found for {}: {}", id, source);
                self.publish(generation, LifecyclePhase::Failed(source.to_string()), None);
                return Err(LifecycleError::Metadata {
                    panorama: id.to_string(),
                    source,
                });
            }
        };

        if !self.is_current(generation) {
            return Err(self.superseded(id, generation));
        }

        if metadata.id.is_empty() {
            metadata.id = id.to_string();
        }
        tracing::debug!("Config loaded for {}: {:?}", id, metadata);

        self.publish(generation, LifecyclePhase::BuildingAsset, None);
        let descriptor = build_with(&metadata, &self.defaults);

        self.install(generation, descriptor, metadata, false)
    }

    /// Re-apply edited display settings to the attached panorama without a
    /// network round trip. Loaded textures are carried over; slots that were
    /// still empty are requested again.
    ///
    /// The target is the installed panorama, which may differ from the most
    /// recent selection while that one is fetching or after it failed.
    pub fn apply_settings(&self, settings: DisplaySettings) -> Result<SettingsApplied, LifecycleError> {
        let metadata = self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|installed| installed.metadata.with_settings(&settings))
            .ok_or(LifecycleError::NothingLoaded)?;

        let generation = self.next_generation();
        tracing::info!(
            "Applying settings to {} (generation {}): {:?}",
            metadata.id,
            generation,
            settings
        );
        self.begin(generation, &metadata.id);

        let panorama = metadata.id.clone();
        let descriptor = build_with(&metadata, &self.defaults);
        let generation = self.install(generation, descriptor, metadata, true)?;
        Ok(SettingsApplied { panorama, generation })
    }

    /// Swap the new asset in and start its texture loads. Runs without
    /// suspending; the frame loop sees either the old or the new asset.
    fn install(
        &self,
        generation: Generation,
        descriptor: AssetDescriptor,
        metadata: PanoramaMetadata,
        carry_textures: bool,
    ) -> Result<Generation, LifecycleError> {
        let panorama = descriptor.panorama_id.clone();
        let mut asset = descriptor.instantiate(generation.asset_id());
        let mut filled = Vec::new();

        {
            let mut viewer = lock_viewer(&self.viewer);
            if !self.is_current(generation) {
                return Err(self.superseded(&panorama, generation));
            }

            if carry_textures {
                if let Some(previous) = viewer.attached() {
                    for slot in TextureSlot::ALL {
                        if let Some(texture) = previous.texture(slot) {
                            asset = asset.with_texture(slot, texture.clone());
                            filled.push(slot);
                        }
                    }
                }
            }

            if let Some(previous) = viewer.attached_id() {
                tracing::info!("Removing old sphere {} for {}", previous, panorama);
                viewer.detach(previous);
            }

            // Written under the viewer lock so it always names the attached asset
            let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(source) = viewer.attach(asset) {
                *installed = None;
                drop(installed);
                drop(viewer);
                tracing::error!("Failed to attach sphere for {}: {}", panorama, source);
                self.publish(generation, LifecyclePhase::Failed(source.to_string()), None);
                return Err(LifecycleError::Attach { panorama, source });
            }
            *installed = Some(Installed {
                generation,
                metadata,
            });
        }
        tracing::info!(
            "Sphere created and added to scene for {} (radius {}, {} segments, depth scale {})",
            panorama,
            descriptor.geometry.radius,
            descriptor.geometry.width_segments,
            descriptor.material.displacement_scale
        );
        self.publish(generation, LifecyclePhase::Attached, Some(descriptor.settings));

        for slot in TextureSlot::ALL {
            if filled.contains(&slot) {
                continue;
            }
            let source = match slot {
                TextureSlot::Color => descriptor.sources.color.clone(),
                TextureSlot::Displacement => descriptor.sources.displacement.clone(),
            };
            self.request_texture(generation, slot, source);
        }

        let phase = if filled.contains(&TextureSlot::Color) {
            LifecyclePhase::Ready
        } else {
            LifecyclePhase::TexturesLoading
        };
        self.publish(generation, phase, Some(descriptor.settings));

        Ok(generation)
    }

    /// Issue one detached texture fetch
    fn request_texture(&self, generation: Generation, slot: TextureSlot, source: Option<String>) {
        let Some(url) = source else {
            let _ = self.loads_tx.send(TextureLoad {
                generation,
                slot,
                result: Err(LoadError::new(
                    slot,
                    "",
                    LoadFailure::InvalidUrl("no source for this slot".to_string()),
                )),
            });
            return;
        };

        let loader = Arc::clone(&self.loader);
        let tx = self.loads_tx.clone();
        tokio::spawn(async move {
            let result = loader.fetch_texture(slot, &url).await;
            // Closed only once the lifecycle itself is gone
            let _ = tx.send(TextureLoad {
                generation,
                slot,
                result,
            });
        });
    }

    /// Apply every finished load without waiting. Safe to call each frame.
    pub fn pump(&self) -> Vec<LoadOutcome> {
        let Ok(mut rx) = self.loads_rx.try_lock() else {
            return Vec::new();
        };

        let mut outcomes = Vec::new();
        while let Ok(load) = rx.try_recv() {
            outcomes.push(self.apply(load));
        }
        outcomes
    }

    /// Wait for the next finished load and apply it
    pub async fn next_texture_load(&self) -> Option<LoadOutcome> {
        let load = self.loads_rx.lock().await.recv().await?;
        Some(self.apply(load))
    }

    fn apply(&self, load: TextureLoad) -> LoadOutcome {
        let TextureLoad {
            generation,
            slot,
            result,
        } = load;

        let Some(panorama) = self.installed_panorama(generation) else {
            tracing::debug!("Discarding stale {} map from generation {}", slot, generation);
            return LoadOutcome::Discarded(slot);
        };

        match result {
            Ok(texture) => {
                let source = texture.source().to_string();
                let bound = lock_viewer(&self.viewer).bind_texture(generation.asset_id(), slot, texture);
                if !bound {
                    tracing::debug!("Asset {} no longer accepts a {} map", generation, slot);
                    return LoadOutcome::Discarded(slot);
                }

                match slot {
                    TextureSlot::Color => {
                        tracing::info!("Main image loaded for {} ({})", panorama, source);
                        self.publish(generation, LifecyclePhase::Ready, None);
                    }
                    TextureSlot::Displacement => {
                        tracing::info!("Depth map loaded for {} ({})", panorama, source);
                    }
                }
                LoadOutcome::Applied(slot)
            }
            Err(e) if e.is_ignorable() => {
                tracing::info!(
                    "No depth map found for {}, proceeding without displacement ({})",
                    panorama,
                    e
                );
                LoadOutcome::Failed {
                    slot,
                    ignorable: true,
                }
            }
            Err(e) => {
                tracing::error!("Failed to load main image for {}: {}", panorama, e);
                self.publish(generation, LifecyclePhase::Degraded(e.to_string()), None);
                LoadOutcome::Failed {
                    slot,
                    ignorable: false,
                }
            }
        }
    }

    /// Detach the current panorama and invalidate outstanding loads
    pub fn teardown(&self) {
        let generation = self.next_generation();
        {
            let mut viewer = lock_viewer(&self.viewer);
            if let Some(id) = viewer.clear() {
                tracing::info!("Viewer teardown, released asset {}", id);
            }
            *self.installed.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        self.status.send_replace(LifecycleStatus {
            generation,
            ..Default::default()
        });
    }

    /// Generation of the attached asset, if any
    pub fn installed_generation(&self) -> Option<Generation> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|installed| installed.generation)
    }

    /// Panorama id of the attached asset, if `generation` installed it
    fn installed_panorama(&self, generation: Generation) -> Option<String> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|installed| installed.generation == generation)
            .map(|installed| installed.metadata.id.clone())
    }

    fn superseded(&self, panorama: &str, generation: Generation) -> LifecycleError {
        let latest = self.current_generation();
        tracing::debug!(
            "Selection of {} (generation {}) superseded by generation {}",
            panorama,
            generation,
            latest
        );
        LifecycleError::Superseded {
            panorama: panorama.to_string(),
            latest: latest.0,
        }
    }

    fn begin(&self, generation: Generation, panorama: &str) {
        self.status.send_if_modified(|status| {
            if status.generation > generation {
                return false;
            }
            *status = LifecycleStatus {
                generation,
                panorama: Some(panorama.to_string()),
                phase: LifecyclePhase::FetchingMetadata,
                settings: status.settings,
            };
            true
        });
    }

    /// Update the phase unless a newer generation already published
    fn publish(&self, generation: Generation, phase: LifecyclePhase, settings: Option<DisplaySettings>) {
        self.status.send_if_modified(|status| {
            if status.generation != generation {
                return false;
            }
            tracing::debug!("Generation {}: {} -> {}", generation, status.phase, phase);
            status.phase = phase;
            if settings.is_some() {
                status.settings = settings;
            }
            true
        });
    }
}
