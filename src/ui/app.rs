//! Main egui application with the panorama viewport.

use std::sync::Arc;

use eframe::egui;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::client::{fetch_panorama_list, GenerationClient, GenerationStatus, HttpConfigSync, ViewerSession};
use crate::config::Config;
use crate::error::HoloscapeError;
use crate::loader::HttpResourceLoader;
use crate::panorama::{BuildDefaults, LifecyclePhase, PanoramaLifecycle};
use crate::render::{lock_viewer, HeadlessBackend, RenderBackend, SharedViewer, ViewerRuntime};

use super::renderer::{SphereRenderer, WgpuBackend};
use super::viewport::show_panorama;

/// The native egui application window.
pub struct HoloscapeApp {
    session: ViewerSession,
    viewer: SharedViewer,
    generator: GenerationClient,
    /// GPU renderer (None when wgpu is unavailable)
    renderer: Option<Arc<SphereRenderer>>,
    /// Panorama asked for on the command line, selected once the list arrives
    initial: Option<String>,
    list_rx: Option<oneshot::Receiver<Vec<String>>>,
    prompt: String,
    generation_status: Option<GenerationStatus>,
    generation_rx: Option<oneshot::Receiver<GenerationStatus>>,
    render_error: Option<String>,
}

impl HoloscapeApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: Config,
        panorama: Option<String>,
    ) -> Result<Self, HoloscapeError> {
        let loader = HttpResourceLoader::new(&config.viewer)?;
        let sync = HttpConfigSync::new(loader.client(), loader.base_url())?;
        let generator = GenerationClient::new(loader.client(), loader.base_url())?;
        tracing::info!("Catalog API: {}", loader.base_url());

        let (backend, renderer, render_error): (Box<dyn RenderBackend>, _, _) =
            match cc.wgpu_render_state.as_ref() {
                Some(render_state) => {
                    let renderer = Arc::new(SphereRenderer::new(
                        &render_state.device,
                        &render_state.queue,
                        render_state.target_format,
                        1280,
                        720,
                    ));
                    let backend = WgpuBackend::new(render_state, Arc::clone(&renderer));
                    (Box::new(backend), Some(renderer), None)
                }
                None => {
                    tracing::error!("wgpu render state not available, panoramas will not be drawn");
                    (
                        Box::new(HeadlessBackend::new()),
                        None,
                        Some("wgpu render state not available".to_string()),
                    )
                }
            };

        let viewer = ViewerRuntime::new(&config.viewer, backend).into_shared();
        let lifecycle = Arc::new(PanoramaLifecycle::new(
            Arc::new(loader),
            Arc::clone(&viewer),
            BuildDefaults::from(&config.display),
        ));
        let session = ViewerSession::new(lifecycle, Arc::new(sync), &config.display);

        let mut app = Self {
            session,
            viewer,
            generator,
            renderer,
            initial: panorama,
            list_rx: None,
            prompt: String::new(),
            generation_status: None,
            generation_rx: None,
            render_error,
        };
        app.refresh_list();
        Ok(app)
    }

    /// Launch the native UI window. Blocks until the window is closed.
    ///
    /// Must be called inside a tokio runtime context; loads are spawned onto it.
    pub fn run(config: Config, panorama: Option<String>) -> eframe::Result {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title("holoscape")
                .with_inner_size([1280.0, 720.0]),
            ..Default::default()
        };

        eframe::run_native(
            "holoscape",
            options,
            Box::new(move |cc| Ok(Box::new(Self::new(cc, config, panorama)?))),
        )
    }

    fn refresh_list(&mut self) {
        let loader = Arc::clone(self.session.lifecycle().loader());
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(fetch_panorama_list(loader.as_ref()).await);
        });
        self.list_rx = Some(rx);
    }

    fn select(&mut self, id: &str) {
        // Outcome arrives through the lifecycle status
        drop(self.session.select_detached(id));
    }

    fn submit_prompt(&mut self) {
        let client = self.generator.clone();
        let prompt = self.prompt.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(client.submit(&prompt).await);
        });
        self.generation_status = Some(GenerationStatus::Generating);
        self.generation_rx = Some(rx);
    }

    /// Collect results of background list fetches and prompt submissions.
    fn poll_background(&mut self) {
        if let Some(rx) = self.list_rx.as_mut() {
            match rx.try_recv() {
                Ok(list) => {
                    self.list_rx = None;
                    self.session.set_panoramas(list);
                    if self.session.selected().is_none() {
                        let first = self
                            .initial
                            .take()
                            .or_else(|| self.session.panoramas().first().cloned());
                        if let Some(id) = first {
                            self.select(&id);
                        }
                    }
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => self.list_rx = None,
            }
        }

        if let Some(rx) = self.generation_rx.as_mut() {
            match rx.try_recv() {
                Ok(status) => {
                    self.generation_rx = None;
                    let complete = status.is_complete();
                    self.generation_status = Some(status);
                    if complete {
                        self.refresh_list();
                    }
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    self.generation_rx = None;
                    self.generation_status = Some(GenerationStatus::Failed("request dropped".to_string()));
                }
            }
        }
    }

    fn panorama_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Panorama");

        let selected = self.session.selected().unwrap_or_default().to_string();
        let mut choice = selected.clone();
        egui::ComboBox::from_id_salt("panorama_select")
            .selected_text(if selected.is_empty() { "-" } else { selected.as_str() })
            .show_ui(ui, |ui| {
                for id in self.session.panoramas() {
                    ui.selectable_value(&mut choice, id.clone(), id);
                }
            });
        if choice != selected {
            self.select(&choice);
        }

        if self.list_rx.is_some() {
            ui.label("Loading panorama list...");
        } else if self.session.panoramas().is_empty() {
            ui.label("No panoramas available");
        }

        let status = self.session.status();
        ui.horizontal(|ui| {
            ui.label("Status:");
            match &status.phase {
                LifecyclePhase::Failed(_) => ui.colored_label(egui::Color32::RED, status.phase.to_string()),
                LifecyclePhase::Degraded(_) => ui.colored_label(egui::Color32::YELLOW, status.phase.to_string()),
                LifecyclePhase::Ready => ui.colored_label(egui::Color32::GREEN, status.phase.to_string()),
                phase => ui.label(phase.to_string()),
            };
        });

        let mut presenting = lock_viewer(&self.viewer).is_presenting();
        if ui.checkbox(&mut presenting, "Immersive").changed() {
            lock_viewer(&self.viewer).set_presenting(presenting);
        }
    }

    fn display_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Display");
        let controls = self.session.controls_mut();

        let range = controls.sphere_size_range();
        let mut sphere_size = controls.sphere_size();
        ui.label(controls.sphere_size_label());
        let slider = egui::Slider::new(&mut sphere_size, range.min..=range.max)
            .step_by(f64::from(range.step))
            .show_value(false);
        if ui.add(slider).changed() {
            controls.set_sphere_size(sphere_size);
        }

        let range = controls.depth_scale_range();
        let mut depth_scale = controls.depth_scale();
        ui.label(controls.depth_scale_label());
        let slider = egui::Slider::new(&mut depth_scale, range.min..=range.max)
            .step_by(f64::from(range.step))
            .show_value(false);
        if ui.add(slider).changed() {
            controls.set_depth_scale(depth_scale);
        }

        let range = controls.mesh_resolution_range();
        let mut mesh_resolution = controls.mesh_resolution();
        ui.label(controls.mesh_resolution_label());
        let slider = egui::Slider::new(&mut mesh_resolution, range.min..=range.max)
            .step_by(f64::from(range.step))
            .show_value(false);
        if ui.add(slider).changed() {
            controls.set_mesh_resolution(mesh_resolution);
        }

        if ui.button("Apply").clicked() {
            if let Err(e) = self.session.apply_settings() {
                tracing::warn!("Could not apply settings: {}", e);
            }
        }
    }

    fn generate_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Generate");
        ui.add(
            egui::TextEdit::multiline(&mut self.prompt)
                .hint_text("Describe a panorama")
                .desired_rows(3),
        );

        let busy = self.generation_rx.is_some();
        if ui.add_enabled(!busy, egui::Button::new("Generate")).clicked() {
            self.submit_prompt();
        }
        if let Some(status) = &self.generation_status {
            ui.label(status.to_string());
        }
    }
}

impl eframe::App for HoloscapeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_background();
        self.session.pump();

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.label("holoscape");
                ui.separator();
                ui.label("Depth panorama viewer");
            });
        });

        egui::SidePanel::left("controls").show(ctx, |ui| {
            self.panorama_ui(ui);
            ui.separator();
            self.display_ui(ui);
            ui.separator();
            self.generate_ui(ui);

            if let Some(ref err) = self.render_error {
                ui.separator();
                ui.colored_label(egui::Color32::RED, err);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(renderer) = &self.renderer {
                show_panorama(ui, &self.viewer, renderer);
            } else {
                ui.heading("Panorama");
                if let Some(ref err) = self.render_error {
                    ui.colored_label(egui::Color32::RED, err);
                }
            }
        });

        // Idle animation and texture loads need continuous frames
        ctx.request_repaint();
    }
}

impl Drop for HoloscapeApp {
    fn drop(&mut self) {
        self.session.lifecycle().teardown();
    }
}
