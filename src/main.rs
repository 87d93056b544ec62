//! Holoscape - panorama viewer and catalog service
//!
//! Main entry point for the CLI application.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use holoscape::{
    client::{HttpConfigSync, ViewerSession},
    config::Config,
    loader::HttpResourceLoader,
    panorama::{BuildDefaults, PanoramaLifecycle},
    render::{lock_viewer, HeadlessBackend, ViewerRuntime},
    web::WebServer,
    AppState,
};

/// Holoscape - depth panorama viewer and catalog service
#[derive(Parser, Debug)]
#[command(name = "holoscape", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the panorama catalog API (default)
    Serve {
        /// HTTP server port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Panorama directory (overrides config)
        #[arg(long)]
        panoramas: Option<PathBuf>,
    },
    /// Load panoramas from a catalog and render them
    View {
        /// Catalog API base URL (overrides config)
        #[arg(long)]
        api: Option<String>,

        /// Panorama to show instead of the first listed one
        #[arg(long)]
        panorama: Option<String>,

        /// Stop after this many frames (headless only)
        #[arg(long)]
        frames: Option<u64>,

        /// Launch native UI window
        #[cfg(feature = "native-ui")]
        #[arg(long)]
        ui: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", holoscape::NAME, holoscape::VERSION);

    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };
    config.apply_env();

    let command = args.command.unwrap_or(Command::Serve {
        port: None,
        panoramas: None,
    });

    // Built manually so the main thread stays free for the UI event loop
    let runtime = tokio::runtime::Runtime::new()?;

    match command {
        Command::Serve { port, panoramas } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = panoramas {
                config.server.panoramas_dir = dir;
            }
            config.validate()?;

            runtime.block_on(run_server(config))?;
        }
        Command::View {
            api,
            panorama,
            frames,
            #[cfg(feature = "native-ui")]
            ui,
        } => {
            if let Some(api) = api {
                config.viewer.api_base_url = api;
            }
            config.validate()?;

            #[cfg(feature = "native-ui")]
            if ui {
                info!("Launching native UI window");
                {
                    // UI callbacks spawn onto this runtime
                    let _guard = runtime.enter();

                    // eframe::run_native blocks the main thread (winit requirement)
                    if let Err(e) = holoscape::ui::HoloscapeApp::run(config, panorama) {
                        error!("UI error: {}", e);
                    }
                }

                info!("UI window closed, shutting down");
                runtime.shutdown_timeout(Duration::from_secs(3));
                return Ok(());
            }

            runtime.block_on(run_viewer(config, panorama, frames))?;
        }
    }

    info!("Holoscape stopped");
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("Panorama directory: {}", config.server.panoramas_dir.display());
    info!(
        "Generation endpoint: {}",
        config.generation.endpoint.as_deref().unwrap_or("(not configured)")
    );

    let state = AppState::new(config.clone())?;
    let server = WebServer::new(Arc::clone(&state), &config.server);

    let signal_state = Arc::clone(&state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_state.shutdown();
    });

    server.serve().await?;
    Ok(())
}

/// Headless viewer: drives the lifecycle and frame loop without a window
async fn run_viewer(config: Config, panorama: Option<String>, frames: Option<u64>) -> anyhow::Result<()> {
    let loader = HttpResourceLoader::new(&config.viewer)?;
    let sync = HttpConfigSync::new(loader.client(), loader.base_url())?;
    info!("Catalog API: {}", loader.base_url());

    let backend = HeadlessBackend::new();
    let stats = backend.stats();
    let viewer = ViewerRuntime::new(&config.viewer, Box::new(backend)).into_shared();

    let lifecycle = Arc::new(PanoramaLifecycle::new(
        Arc::new(loader),
        Arc::clone(&viewer),
        BuildDefaults::from(&config.display),
    ));
    let mut session = ViewerSession::new(Arc::clone(&lifecycle), Arc::new(sync), &config.display);
    let mut status_rx = lifecycle.subscribe();

    let started = match panorama {
        Some(id) => {
            session.refresh_list().await;
            Some(session.select(&id).await)
        }
        None => session.start().await,
    };
    match started {
        None => warn!("No panoramas available"),
        Some(Err(e)) => error!("{}", e),
        Some(Ok(generation)) => info!("Panorama attached (generation {})", generation),
    }

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(config.viewer.frame_rate)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut rendered = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                session.pump();
                lock_viewer(&viewer).render_frame();
                rendered += 1;
                if frames.is_some_and(|limit| rendered >= limit) {
                    break;
                }
            }
            Ok(()) = status_rx.changed() => {
                let status = status_rx.borrow_and_update().clone();
                info!(
                    "Panorama {}: {}",
                    status.panorama.as_deref().unwrap_or("-"),
                    status.phase
                );
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    lifecycle.teardown();
    info!(
        "Rendered {} frames ({} textured); {} uploads, {} releases",
        stats.draws(),
        stats.textured_draws(),
        stats.uploads(),
        stats.releases()
    );
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
