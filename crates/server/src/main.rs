//! chatdock Server
//!
//! Streams model responses to chat clients over WebSocket. Each connection
//! gets its own conversation with in-memory history.

mod conversation;
mod logging;
mod paths;
mod session_actor;
mod session_command;
mod state;
mod visualization;
mod websocket;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chatdock_connector_core::{Generator, ScriptedGenerator};
use chatdock_connector_openai::{OpenAiConfig, OpenAiGenerator, DEFAULT_BASE_URL, DEFAULT_TOP_P};
use clap::{Parser, ValueEnum};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::logging::init_logging;
use crate::state::SessionRegistry;
use crate::websocket::ws_handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Echo the prompt back word by word
    Echo,
    /// OpenAI-compatible chat completions endpoint
    Openai,
}

#[derive(Parser)]
#[command(name = "chatdock-server")]
#[command(about = "chatdock server - streaming chat sessions over WebSocket", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "CHATDOCK_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Generation backend
    #[arg(long, value_enum, env = "CHATDOCK_BACKEND", default_value = "echo")]
    backend: Backend,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "CHATDOCK_MODEL_URL", default_value = DEFAULT_BASE_URL)]
    model_url: String,

    /// Model name sent with each request
    #[arg(long, env = "CHATDOCK_MODEL", default_value = "default")]
    model: String,

    #[arg(long, default_value_t = DEFAULT_TOP_P)]
    top_p: f64,

    #[arg(long, env = "CHATDOCK_API_KEY")]
    api_key: Option<String>,

    /// System prompt prepended to every conversation
    #[arg(long)]
    system_prompt: Option<String>,

    /// Delay between echo chunks, in milliseconds
    #[arg(long, default_value_t = 40)]
    echo_delay_ms: u64,

    /// Write logs to this directory instead of stderr ("default" = ~/.chatdock/logs)
    #[arg(long, env = "CHATDOCK_LOG_DIR")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = paths::resolve_log_dir(cli.log_dir.as_deref())?;
    let logging = init_logging(log_dir.as_deref())?;
    let _log_guard = logging.guard;

    let generator = build_generator(&cli);
    info!(
        component = "server",
        event = "server.starting",
        run_id = %logging.run_id,
        backend = ?cli.backend,
        generator = generator.name(),
        "Starting chatdock server"
    );

    let state = Arc::new(SessionRegistry::new(generator));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(
        component = "server",
        event = "server.listening",
        bind = %cli.bind,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        component = "server",
        event = "server.stopped",
        "Server stopped"
    );
    Ok(())
}

fn build_generator(cli: &Cli) -> Arc<dyn Generator> {
    match cli.backend {
        Backend::Echo => Arc::new(ScriptedGenerator::echo(Duration::from_millis(
            cli.echo_delay_ms,
        ))),
        Backend::Openai => {
            let mut config = OpenAiConfig::new(cli.model.clone());
            config.base_url = cli.model_url.clone();
            config.api_key = cli.api_key.clone();
            config.top_p = cli.top_p;
            config.system_prompt = cli.system_prompt.clone();
            Arc::new(OpenAiGenerator::new(config))
        }
    }
}

fn router(state: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "name": "chatdock",
        "version": env!("CARGO_PKG_VERSION"),
        "websocket": "/ws",
    }))
}

async fn health_handler(State(state): State<Arc<SessionRegistry>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "active_sessions": state.active_sessions(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            component = "server",
            event = "server.signal_failed",
            error = %e,
            "Failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(
        component = "server",
        event = "server.shutdown_requested",
        "Shutdown requested"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_active_sessions() {
        let state = Arc::new(SessionRegistry::new(Arc::new(ScriptedGenerator::echo(
            Duration::ZERO,
        ))));
        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body, json!({"status": "healthy", "active_sessions": 0}));
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["chatdock-server"]).expect("parse");
        assert_eq!(cli.backend, Backend::Echo);
        assert_eq!(cli.model_url, DEFAULT_BASE_URL);
        assert!((cli.top_p - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn cli_selects_openai_backend() {
        let cli = Cli::try_parse_from([
            "chatdock-server",
            "--backend",
            "openai",
            "--model",
            "qwen",
            "--model-url",
            "http://10.0.0.5:8000/v1",
        ])
        .expect("parse");
        assert_eq!(cli.backend, Backend::Openai);
        assert_eq!(build_generator(&cli).name(), "openai");
    }
}
