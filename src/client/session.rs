//! Viewer page wiring: selector, controls and apply

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::controls::ControlPanel;
use super::sync::{push_detached, ConfigSyncAdapter};
use crate::config::DisplayConfig;
use crate::error::LifecycleError;
use crate::loader::ResourceLoader;
use crate::panorama::{Generation, LifecycleStatus, LoadOutcome, PanoramaLifecycle};

/// One viewer window's state around a [`PanoramaLifecycle`]
pub struct ViewerSession {
    lifecycle: Arc<PanoramaLifecycle>,
    sync: Arc<dyn ConfigSyncAdapter>,
    controls: ControlPanel,
    panoramas: Vec<String>,
    selected: Option<String>,
    status_rx: watch::Receiver<LifecycleStatus>,
}

impl ViewerSession {
    pub fn new(
        lifecycle: Arc<PanoramaLifecycle>,
        sync: Arc<dyn ConfigSyncAdapter>,
        display: &DisplayConfig,
    ) -> Self {
        let status_rx = lifecycle.subscribe();
        Self {
            lifecycle,
            sync,
            controls: ControlPanel::new(display),
            panoramas: Vec::new(),
            selected: None,
            status_rx,
        }
    }

    /// Fetch the panorama list and select the first entry.
    ///
    /// An unreachable list yields an empty selector, not an error.
    pub async fn start(&mut self) -> Option<Result<Generation, LifecycleError>> {
        self.refresh_list().await;
        let first = self.panoramas.first().cloned()?;
        Some(self.select(&first).await)
    }

    /// Re-fetch the panorama list, keeping the selection
    pub async fn refresh_list(&mut self) -> &[String] {
        self.panoramas = fetch_panorama_list(self.lifecycle.loader().as_ref()).await;
        &self.panoramas
    }

    pub fn set_panoramas(&mut self, panoramas: Vec<String>) {
        self.panoramas = panoramas;
    }

    pub async fn select(&mut self, id: &str) -> Result<Generation, LifecycleError> {
        self.selected = Some(id.to_string());
        let result = self.lifecycle.select_panorama(id).await;
        self.sync_controls();
        result
    }

    /// Start a selection on the runtime without awaiting it. Controls follow
    /// on the next [`pump`](Self::pump) after the asset attaches.
    pub fn select_detached(&mut self, id: &str) -> JoinHandle<Result<Generation, LifecycleError>> {
        self.selected = Some(id.to_string());
        let lifecycle = Arc::clone(&self.lifecycle);
        let id = id.to_string();
        tokio::spawn(async move { lifecycle.select_panorama(&id).await })
    }

    /// Apply the control values locally, then persist them in the background.
    ///
    /// Settings are pushed for the panorama the lifecycle rebuilt, which is
    /// the one on screen even when a newer selection is pending or failed.
    /// A failed rebuild still pushes for its target.
    pub fn apply_settings(&mut self) -> Result<Generation, LifecycleError> {
        let settings = self.controls.settings();

        let result = self.lifecycle.apply_settings(settings);
        let target = match &result {
            Ok(applied) => Some(applied.panorama.clone()),
            Err(LifecycleError::Attach { panorama, .. })
            | Err(LifecycleError::Superseded { panorama, .. }) => Some(panorama.clone()),
            Err(_) => None,
        };
        if let Some(panorama) = target {
            push_detached(Arc::clone(&self.sync), panorama, settings);
        }
        self.sync_controls();
        result.map(|applied| applied.generation)
    }

    /// Apply finished texture loads; call once per frame
    pub fn pump(&mut self) -> Vec<LoadOutcome> {
        let outcomes = self.lifecycle.pump();
        self.sync_controls();
        outcomes
    }

    /// Copy newly published settings of the selected panorama into the controls
    pub fn sync_controls(&mut self) -> bool {
        if !self.status_rx.has_changed().unwrap_or(false) {
            return false;
        }
        let status = self.status_rx.borrow_and_update().clone();
        match (status.settings, status.panorama) {
            (Some(settings), Some(panorama)) if self.selected.as_deref() == Some(panorama.as_str()) => {
                self.controls.update_from(&settings);
                true
            }
            _ => false,
        }
    }

    pub fn status(&self) -> LifecycleStatus {
        self.lifecycle.status()
    }

    pub fn panoramas(&self) -> &[String] {
        &self.panoramas
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn controls(&self) -> &ControlPanel {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut ControlPanel {
        &mut self.controls
    }

    pub fn lifecycle(&self) -> &Arc<PanoramaLifecycle> {
        &self.lifecycle
    }
}

/// Fetch the panorama list. An unreachable list is logged and yields an
/// empty one.
pub async fn fetch_panorama_list(loader: &dyn ResourceLoader) -> Vec<String> {
    match loader.fetch_panorama_list().await {
        Ok(list) => {
            tracing::info!("Panorama list received: {} entries", list.len());
            list
        }
        Err(e) => {
            tracing::error!("Error fetching panorama list: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::error::SyncError;
    use crate::loader::fake::FakeLoader;
    use crate::panorama::{BuildDefaults, DisplaySettings, PanoramaMetadata};
    use crate::render::{lock_viewer, HeadlessBackend, ViewerRuntime};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use tokio::sync::mpsc;

    /// Records pushes; optionally fails them
    struct RecordingSync {
        fail: bool,
        pushed: mpsc::UnboundedSender<(String, DisplaySettings)>,
    }

    impl ConfigSyncAdapter for RecordingSync {
        fn push<'a>(
            &'a self,
            panorama: &'a str,
            settings: DisplaySettings,
        ) -> BoxFuture<'a, Result<(), SyncError>> {
            async move {
                let _ = self.pushed.send((panorama.to_string(), settings));
                if self.fail {
                    return Err(SyncError::Rejected {
                        url: "api/update_config".to_string(),
                        status: 500,
                    });
                }
                Ok(())
            }
            .boxed()
        }
    }

    fn session(
        loader: FakeLoader,
        fail_sync: bool,
    ) -> (ViewerSession, mpsc::UnboundedReceiver<(String, DisplaySettings)>) {
        let viewer =
            ViewerRuntime::new(&ViewerConfig::default(), Box::new(HeadlessBackend::new())).into_shared();
        let lifecycle = Arc::new(PanoramaLifecycle::new(
            Arc::new(loader) as Arc<dyn ResourceLoader>,
            viewer,
            BuildDefaults::default(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = Arc::new(RecordingSync {
            fail: fail_sync,
            pushed: tx,
        });
        (
            ViewerSession::new(lifecycle, sync, &DisplayConfig::default()),
            rx,
        )
    }

    fn meta(sphere: f32, depth: f32, mesh: u32) -> PanoramaMetadata {
        PanoramaMetadata {
            sphere_size: Some(sphere),
            depth_scale: Some(depth),
            mesh_resolution: Some(mesh),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_selects_first_panorama() {
        let loader = FakeLoader::default()
            .with_list(&["canyon", "beach"])
            .with_panorama("canyon", meta(10.0, -4.0, 512))
            .with_panorama("beach", meta(6.0, 4.0, 256));
        let (mut session, _rx) = session(loader, false);

        let result = session.start().await.unwrap();
        assert!(result.is_ok());
        assert_eq!(session.panoramas(), &["canyon".to_string(), "beach".to_string()]);
        assert_eq!(session.selected(), Some("canyon"));
        assert_eq!(session.controls().sphere_size(), 10.0);
        assert_eq!(session.controls().depth_scale(), -4.0);
        assert_eq!(session.controls().mesh_resolution(), 512);
    }

    #[tokio::test]
    async fn test_list_failure_leaves_selector_empty() {
        let loader = FakeLoader::default().failing_list();
        let (mut session, _rx) = session(loader, false);

        assert!(session.start().await.is_none());
        assert!(session.panoramas().is_empty());
        assert!(session.selected().is_none());
    }

    #[tokio::test]
    async fn test_apply_rebuilds_locally_then_pushes() {
        let loader = FakeLoader::default().with_panorama("p1", meta(6.0, 4.0, 256));
        let (mut session, mut pushed) = session(loader, false);
        session.start().await.unwrap().unwrap();

        session.controls_mut().set_sphere_size(15.0);
        session.controls_mut().set_depth_scale(-2.0);
        session.controls_mut().set_mesh_resolution(1024);
        session.apply_settings().unwrap();

        {
            let viewer = lock_viewer(session.lifecycle().viewer());
            let asset = viewer.attached().unwrap();
            assert_eq!(asset.geometry().radius, 15.0);
            assert_eq!(asset.geometry().width_segments, 1024);
            assert_eq!(asset.material().displacement_scale, -2.0);
        }

        let (panorama, settings) = pushed.recv().await.unwrap();
        assert_eq!(panorama, "p1");
        assert_eq!(settings, session.controls().settings());
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_local_state() {
        let loader = FakeLoader::default().with_panorama("p1", meta(6.0, 4.0, 256));
        let (mut session, mut pushed) = session(loader, true);
        session.start().await.unwrap().unwrap();

        session.controls_mut().set_sphere_size(20.0);
        let generation = session.apply_settings().unwrap();
        pushed.recv().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(session.lifecycle().current_generation(), generation);
        assert_eq!(session.controls().sphere_size(), 20.0);
        let viewer = lock_viewer(session.lifecycle().viewer());
        assert_eq!(viewer.attached().unwrap().geometry().radius, 20.0);
    }

    #[tokio::test]
    async fn test_apply_without_selection() {
        let (mut session, _rx) = session(FakeLoader::default(), false);
        assert!(matches!(
            session.apply_settings(),
            Err(LifecycleError::NothingLoaded)
        ));
    }

    #[tokio::test]
    async fn test_failed_selection_keeps_controls() {
        let loader = FakeLoader::default().with_panorama("p1", meta(12.0, 4.0, 256));
        let (mut session, _rx) = session(loader, false);
        session.start().await.unwrap().unwrap();

        assert!(session.select("missing").await.is_err());
        assert_eq!(session.controls().sphere_size(), 12.0);
    }

    #[tokio::test]
    async fn test_apply_after_failed_selection_pushes_for_shown_panorama() {
        let loader = FakeLoader::default().with_panorama("p1", meta(6.0, 4.0, 256));
        let (mut session, mut pushed) = session(loader, false);
        session.start().await.unwrap().unwrap();

        assert!(session.select("missing").await.is_err());
        assert_eq!(session.selected(), Some("missing"));

        session.controls_mut().set_sphere_size(18.0);
        session.apply_settings().unwrap();

        let (panorama, settings) = pushed.recv().await.unwrap();
        assert_eq!(panorama, "p1");
        assert_eq!(settings.sphere_size, 18.0);
        assert_eq!(
            lock_viewer(session.lifecycle().viewer()).attached().unwrap().label(),
            "p1"
        );
    }

    #[tokio::test]
    async fn test_apply_without_selection_pushes_nothing() {
        let (mut session, mut pushed) = session(FakeLoader::default(), false);
        assert!(session.apply_settings().is_err());
        tokio::task::yield_now().await;
        assert!(pushed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_detached_select_syncs_controls_on_pump() {
        let loader = FakeLoader::default()
            .with_list(&["canyon"])
            .with_panorama("canyon", meta(9.0, -1.5, 128));
        let (mut session, _rx) = session(loader, false);

        let list = fetch_panorama_list(session.lifecycle().loader().as_ref()).await;
        session.set_panoramas(list);
        assert_eq!(session.panoramas(), &["canyon".to_string()]);

        let handle = session.select_detached("canyon");
        assert_eq!(session.selected(), Some("canyon"));
        handle.await.unwrap().unwrap();

        session.pump();
        assert_eq!(session.controls().sphere_size(), 9.0);
        assert_eq!(session.controls().mesh_resolution(), 128);
    }
}
