//! Stand-in agent service: answers health checks and echoes `/run` payloads.
//!
//! Used for local bring-up before a real agent exists, and by the lifecycle
//! tests as a service that actually binds a port.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use log::info;
use serde_json::Value;
use service_model::{HealthReport, RunResponse};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "placeholder-agent")]
#[command(about = "Placeholder HTTP agent with /health and /run", long_about = None)]
struct Args {
    /// Agent name reported by /health and /run.
    #[arg(long)]
    name: String,

    #[arg(long, env = "PORT")]
    port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[derive(Clone)]
struct AppState {
    name: Arc<str>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Agent '{}' listening on {}", args.name, addr);

    axum::serve(listener, app(&args.name))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Agent '{}' stopped", args.name);
    Ok(())
}

fn app(name: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run))
        .with_state(AppState { name: name.into() })
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::ok(&state.name))
}

async fn run(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    if !payload.is_object() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"status": "ERROR", "msg": "payload must be a JSON object"})),
        )
            .into_response();
    }
    Json(RunResponse::placeholder(&state.name, payload)).into_response()
}

async fn shutdown_signal() {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate => {},
    }
}
