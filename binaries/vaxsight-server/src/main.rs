//! Vaxsight server - vision inspection service for the vaccine line.
//!
//! The server drives the station camera, runs detection and trace code
//! decoding over captured or caller-supplied frames, and answers PLC-side
//! clients over gRPC.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! vaxsight-server
//!
//! # Start with a configuration file
//! vaxsight-server --config /etc/vaxsight/vaxsight.toml
//!
//! # Override specific options
//! vaxsight-server --bind-addr 0.0.0.0:5001 --log-level debug
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::ServiceConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{RwLock, broadcast};
use tokio::time::timeout;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vaxsight_camera::CameraManager;
use vaxsight_service::{RecognitionPipeline, VisionGrpcServer};
use vaxsight_vision::{Archiver, BarcodeDecoder, DetectionModel, Detector, OnnxModel};

/// CLI arguments for the vaxsight server.
#[derive(Parser, Debug)]
#[command(
    name = "vaxsight-server",
    about = "Vision inspection service for the vaccine line",
    version,
    author
)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind the gRPC server to.
    #[arg(short, long, value_name = "ADDR")]
    bind_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long)]
    json_logs: bool,

    /// Print the default configuration and exit.
    #[arg(long)]
    print_config: bool,
}

/// Application state for the server.
struct StationApp {
    config: ServiceConfig,
    shutdown_tx: broadcast::Sender<()>,
    state: Arc<RwLock<AppState>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl StationApp {
    fn new(config: ServiceConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            shutdown_tx,
            state: Arc::new(RwLock::new(AppState::Starting)),
        }
    }

    async fn run(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            *state = AppState::Running;
        }

        // Camera comes up first; a failed open degrades to offline frames
        // instead of refusing to start.
        let camera = CameraManager::new(self.config.camera.clone());
        if !camera.initialize().await {
            warn!("camera unavailable, serving degraded captures");
        }

        let detector = Detector::new(
            load_detection_model(&self.config),
            self.config.detection.confidence_threshold,
        );
        let archiver = Archiver::new(&self.config.archive);
        let pipeline = RecognitionPipeline::new(
            camera.clone(),
            detector,
            Arc::new(BarcodeDecoder::new()),
            None,
            archiver.clone(),
            self.config.barcode.clone(),
        );

        self.spawn_retention_sweep(archiver);

        let server =
            VisionGrpcServer::new(pipeline, self.config.server.max_concurrent_requests);
        let bind_addr = self.config.server.bind_addr;
        let server_rx = self.shutdown_tx.subscribe();

        info!(bind_addr = %bind_addr, "starting gRPC server");
        let mut server_handle = tokio::spawn(async move { server.serve(bind_addr, server_rx).await });

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            result = &mut server_handle => {
                match result {
                    Ok(Ok(())) => info!("gRPC server stopped"),
                    Ok(Err(e)) => {
                        error!(error = %e, "gRPC server error");
                        camera.cleanup().await;
                        return Err(e.into());
                    }
                    Err(e) => {
                        error!(error = %e, "server task panicked");
                        camera.cleanup().await;
                        return Err(anyhow::anyhow!("server task panicked: {}", e));
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("received shutdown signal, draining server");
                match timeout(self.config.server.shutdown_grace(), &mut server_handle).await {
                    Ok(Ok(Ok(()))) => info!("gRPC server drained"),
                    Ok(Ok(Err(e))) => error!(error = %e, "gRPC server error during drain"),
                    Ok(Err(e)) => error!(error = %e, "server task panicked during drain"),
                    Err(_) => {
                        warn!("grace period expired, aborting server task");
                        server_handle.abort();
                    }
                }
            }
        }

        // The camera is released only after the server has stopped taking
        // requests.
        camera.cleanup().await;

        {
            let mut state = self.state.write().await;
            *state = AppState::Stopped;
        }

        Ok(())
    }

    /// Periodic archive pruning, once at startup and then daily.
    fn spawn_retention_sweep(&self, archiver: Archiver) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60 * 60 * 24));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let removed = archiver.prune_stale().await;
                        if removed > 0 {
                            info!(removed, "archive retention sweep");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if *state == AppState::ShuttingDown || *state == AppState::Stopped {
            return;
        }

        *state = AppState::ShuttingDown;
        drop(state);

        info!("initiating graceful shutdown");
        let _ = self.shutdown_tx.send(());
    }
}

/// Loads the configured ONNX model. A missing file or a load failure
/// leaves the detector running simulated.
fn load_detection_model(config: &ServiceConfig) -> Option<Arc<dyn DetectionModel>> {
    let path = config.detection.model_path();
    if !path.exists() {
        info!(path = %path.display(), "detection model not found, running simulated");
        return None;
    }

    match OnnxModel::load(&path, config.detection.input_size) {
        Ok(model) => {
            info!(path = %path.display(), "detection model loaded");
            Some(Arc::new(model))
        }
        Err(err) => {
            warn!(error = %err, "model load failed, running simulated");
            None
        }
    }
}

/// Initialize tracing/logging.
fn init_tracing(config: &config::LoggingConfig, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    let format = if json_logs || config.format == "json" {
        "json"
    } else {
        &config.format
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    if args.print_config {
        let config = ServiceConfig::default();
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut config = if let Some(ref config_path) = args.config {
        ServiceConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        ServiceConfig::default()
    };

    config.merge_cli_args(&args);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "vaxsight server starting");

    let app = StationApp::new(config);

    let shutdown_app = app.shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_app.send(());
    });

    if let Err(e) = app.run().await {
        error!(error = %e, "server failed");
        return Err(e);
    }

    info!("vaxsight server stopped");
    Ok(())
}
