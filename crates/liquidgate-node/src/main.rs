//! # Liquidgate Node
//!
//! Liquid-handling gateway binary with HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use liquidgate_core::BatchRunner;
use liquidgate_ledger::{JsonFileStore, ResourceLedger};
use liquidgate_planner::OperationPlanner;
use liquidgate_robot::{
    Executor, HttpControllerClient, HttpInstanceStatus, InstanceStatusSource, NoCancellation,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod callback;
mod config;
mod gateway;
mod guard;
mod heartbeat;
mod liveness;
mod state;

use callback::{CompletionReporter, HttpCompletionReporter, LogOnlyReporter};
use config::{ConfigLoader, GatewayConfig};
use gateway::Gateway;
use guard::TaskGuard;
use heartbeat::HeartbeatReporter;
use liveness::LivenessMonitor;
use state::AppState;

/// Liquid-handling robot gateway
#[derive(Parser, Debug)]
#[command(name = "liquidgate-node")]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (SCREAMING_SNAKE_CASE JSON)
    #[arg(short, long, env = "LIQUIDGATE_CONFIG", default_value = "settings.json")]
    config: PathBuf,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

/// Build the gateway and its background services from `config`.
async fn build_state(config: &GatewayConfig) -> anyhow::Result<AppState> {
    let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    let ledger = ResourceLedger::open(store).await?;
    let planner = OperationPlanner::with_config(ledger.tips.clone(), config.planner.clone());

    let status: Arc<dyn InstanceStatusSource> = match config.instance_status_url() {
        Some(url) => Arc::new(HttpInstanceStatus::new(url)),
        None => Arc::new(NoCancellation),
    };
    let client = Arc::new(HttpControllerClient::new(
        config.robot_url.clone(),
        config.robot_callback_url.clone(),
    ));
    let runner: Arc<dyn BatchRunner> = Arc::new(Executor::new(
        client,
        status,
        config.robot_identity(),
        config.executor.clone(),
    ));

    let reporter: Arc<dyn CompletionReporter> = if config.http_callback_enable {
        Arc::new(HttpCompletionReporter::new(config.callback_urls()))
    } else {
        Arc::new(LogOnlyReporter)
    };

    Ok(AppState::new(
        Gateway::new(planner, ledger, runner),
        Arc::new(TaskGuard::new()),
        reporter,
    ))
}

/// Run the gateway server.
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    info!("🚀 Liquidgate node starting...");

    let state = build_state(&config).await?;

    if config.heartbeat_enable {
        let heartbeat = Arc::new(HeartbeatReporter::new(&config, state.guard.clone()));
        tokio::spawn(heartbeat.run());
    }

    if config.online_check_enable {
        match config.liveness_target() {
            Some(target) => {
                let monitor = Arc::new(LivenessMonitor::new(target, state.guard.clone()));
                tokio::spawn(monitor.run());
            }
            None => info!("Online check enabled but TARGET_IP/TARGET_PORT are not set"),
        }
    }

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("🌐 Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router.
pub(crate) fn create_router(state: AppState) -> Router {
    // CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/status", get(api::health::device_status))

        // Background tasks
        .route("/setLiquidHandlingInfo", post(api::operate::set_liquid_handling_info))
        .route("/setSolutionExchengeInfo", post(api::operate::set_solution_exchange_info))
        .route("/dischargeLiquid", post(api::operate::discharge_liquid))
        .route("/resetTipBoxs", post(api::operate::reset_tip_boxes))

        // Inline queries
        .route("/getTipsCount", post(api::operate::get_tips_count))
        .route("/getStockSolutionInfo", post(api::operate::get_stock_solution_info))
        .route("/setStockSolutionInfo", post(api::operate::set_stock_solution_info))

        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = ConfigLoader::new().with_file(args.config.clone()).load()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    info!(config = %args.config.display(), port = config.port, "Configuration loaded");

    run_server(config).await
}
