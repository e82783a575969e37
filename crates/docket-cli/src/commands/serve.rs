//! Serve command - HTTP endpoint for storage trigger events.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use console::style;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use docket_core::pipeline::parse_event_payload;
use docket_core::{Pipeline, handle_storage_event};

use super::{PipelineOptions, build_pipeline, load_config};

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "DOCKET_ADDR")]
    addr: SocketAddr,

    #[command(flatten)]
    options: PipelineOptions,
}

struct AppState {
    pipeline: Pipeline,
    production_bucket: String,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let production_bucket = config.storage.production_bucket.clone();
    let pipeline = build_pipeline(config, &args.options).await?;

    let state = Arc::new(AppState {
        pipeline,
        production_bucket,
    });

    let listener = TcpListener::bind(args.addr).await?;
    println!(
        "{} Listening for storage events on {}",
        style("ℹ").blue(),
        listener.local_addr()?
    );

    axum::serve(listener, create_router(state)).await?;
    Ok(ExitCode::SUCCESS)
}

fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(event_handler))
        .route("/healthz", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn event_handler(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let event = match parse_event_payload(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejected storage event: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "error": format!("invalid event payload: {}", e) })),
            );
        }
    };

    let response = handle_storage_event(&state.pipeline, &event, &state.production_bucket).await;
    info!("Event for {} finished with {:?}", response.file, response.status);

    let status = if response.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let body = serde_json::to_value(&response)
        .unwrap_or_else(|e| json!({ "status": "error", "error": e.to_string() }));
    (status, Json(body))
}
