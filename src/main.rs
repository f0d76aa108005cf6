use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{Request, Response, StatusCode};
use axum::routing::{get, post};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

mod config;
mod db;
mod error;
mod llm;
mod pipeline;
mod routes;
mod search;
mod telemetry;

use config::Config;
use search::SearchProvider;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub llm_client: Arc<llm::LlmClient>,
    pub search: Arc<dyn SearchProvider>,
}

#[derive(Clone)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let path = request.uri().path();

        tracing::info_span!(
            "HTTP request",
            http.method = %method,
            http.route = %path,
            http.target = %request.uri(),
            http.response.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();
        span.record("http.response.status_code", status as i64);

        let latency_ms = latency.as_secs_f64() * 1000.0;

        tracing::info!(
            http.response.status_code = status,
            latency_ms = latency_ms,
            "finished processing request"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    telemetry::init_tracing(&config);

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        "Starting ai-market-research"
    );

    let pool = db::create_pool(&config.database_url).await?;

    let provider: Arc<dyn llm::Provider> = match config.llm_provider.as_str() {
        "openai" => Arc::new(llm::openai::OpenAIProvider::new(
            config.openai_api_key.as_deref().unwrap_or(""),
        )),
        "anthropic" => Arc::new(llm::anthropic::AnthropicProvider::new(
            config.anthropic_api_key.as_deref().unwrap_or(""),
        )),
        _ => Arc::new(llm::openai::OpenAIProvider::new_groq(
            config.groq_api_key.as_deref().unwrap_or(""),
        )),
    };

    tracing::info!(
        provider = %config.llm_provider,
        model = %config.llm_model,
        "LLM client initialized"
    );

    let llm_client = Arc::new(llm::LlmClient {
        provider_name: provider.name().to_string(),
        provider,
    });

    let search: Arc<dyn SearchProvider> = Arc::new(search::TavilyClient::new(
        config.tavily_api_key.as_deref().unwrap_or(""),
    ));

    tracing::info!(search_provider = %search.name(), "Search client initialized");

    let state = AppState {
        pool,
        config: config.clone(),
        llm_client,
        search,
    };

    let app = Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/reports", post(routes::reports::create_report))
        .route("/api/reports", get(routes::reports::list_reports))
        .route(
            "/api/reports/{id}/download",
            get(routes::reports::download_report),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HttpMakeSpan)
                .on_response(HttpOnResponse),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(300),
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
