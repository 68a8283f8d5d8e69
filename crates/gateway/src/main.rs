//! SynthesisTalk API Gateway
//!
//! The HTTP entry point of the research assistant.
//! Handles:
//! - Session cookies and rate limiting
//! - Request routing to chat, upload, context, tool, search and export handlers
//! - Background insight tasks and session snapshot flushing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;
#[cfg(test)]
mod tests;

use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{from_fn, Next},
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use synthesis_common::{
    config::AppConfig,
    errors::Result,
    insights::TaskRegistry,
    llm::LlmGateway,
    metrics,
    store::{MemoryStore, SessionStore, SnapshotPersister},
    tools::{ToolRegistry, WebSearchService},
    Orchestrator,
};
use tokio::{signal, sync::watch};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn SessionStore>,
    pub insights: Arc<TaskRegistry>,
}

impl AppState {
    /// Wire the reasoning pipeline over the given store and backends
    pub fn build(
        config: Arc<AppConfig>,
        store: Arc<dyn SessionStore>,
        gateway: LlmGateway,
        search: Arc<WebSearchService>,
    ) -> Result<Self> {
        let tools = ToolRegistry::new(&config.tools, gateway.clone(), search)?;
        let orchestrator = Orchestrator::new(
            gateway,
            tools,
            store.clone(),
            config.reasoning.clone(),
            config.tools.document_top_k,
        )?;
        let insights = Arc::new(TaskRegistry::from_config(&config));

        Ok(Self {
            config,
            orchestrator,
            store,
            insights,
        })
    }

    pub fn gateway(&self) -> &LlmGateway {
        self.orchestrator.gateway()
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.orchestrator.tools()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config);
    info!("Starting SynthesisTalk API Gateway v{}", synthesis_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "Prometheus exporter listening");
    }
    metrics::register_metrics();

    // Session store, seeded from the last snapshot
    let persister = SnapshotPersister::new(&config.storage.data_file);
    let memory = if config.storage.persistence_enabled {
        Arc::new(MemoryStore::with_sessions(persister.load().await))
    } else {
        Arc::new(MemoryStore::new())
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = config.storage.persistence_enabled.then(|| {
        persister.spawn_flusher(
            memory.clone(),
            std::time::Duration::from_secs(config.storage.snapshot_interval_secs.max(1)),
            shutdown_rx,
        )
    });

    // LLM backends and tools
    let gateway = LlmGateway::from_config(&config)?;
    info!(backends = ?gateway.backend_names(), "LLM gateway ready");
    let search = Arc::new(WebSearchService::from_config(&config.search)?);

    let state = AppState::build(config.clone(), memory, gateway, search)?;
    info!(mode = state.orchestrator.mode().as_str(), "Reasoning pipeline ready");

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final snapshot before exit
    if let Some(handle) = flusher {
        let _ = shutdown_tx.send(true);
        match tokio::time::timeout(config.shutdown_timeout(), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Snapshot flusher panicked"),
            Err(_) => warn!("Timed out waiting for final snapshot"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Chat
        .route("/chat", post(handlers::chat::chat))
        .route("/chat/history", get(handlers::chat::history))

        // Uploads
        .route("/upload", post(handlers::upload::upload))
        .route("/upload/history", get(handlers::upload::history))
        .route("/upload/{filename}", delete(handlers::upload::remove))

        // Research contexts
        .route("/context", get(handlers::contexts::list).post(handlers::contexts::create))
        .route("/context/current", get(handlers::contexts::current))
        .route("/context/switch", post(handlers::contexts::switch))
        .route("/context/{id}", put(handlers::contexts::update).delete(handlers::contexts::remove))
        .route("/context/{id}/summary", get(handlers::contexts::summary))
        .route("/context/{id}/archive", post(handlers::contexts::archive))

        // Tools
        .route("/note", post(handlers::tools::note))
        .route("/explain", post(handlers::tools::explain))
        .route("/tools/{name}", post(handlers::tools::invoke))
        .route("/visualize", get(handlers::visualize::visualize))

        // Web search
        .route("/search", get(handlers::search::search))
        .route("/search/verify", post(handlers::search::verify))
        .route("/search/history", get(handlers::search::history))
        .route("/search/cache", delete(handlers::search::clear_cache))

        // Insights (background)
        .route("/insights", post(handlers::insights::create))
        .route("/insights/{task_id}", get(handlers::insights::status))

        // Export
        .route("/export", get(handlers::export::export))
        .layer(from_fn(middleware::session::session_cookie))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes));

    // Compose the app
    let mut app = Router::new()
        // Health endpoints (no session)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(api_routes)
        .layer(from_fn(middleware::metrics::track_metrics));

    if state.config.rate_limit.enabled {
        let limiter = create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        app = app.layer(from_fn(move |request: Request, next: Next| {
            rate_limit_middleware(request, next, limiter.clone())
        }));
    }

    app.layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
