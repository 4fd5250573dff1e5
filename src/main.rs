use addressiq_backend::{
    adapters::AdapterRegistry,
    build_info::BuildInfo,
    cache::ResponseCache,
    config::Config,
    handlers::{self, AppState},
    orchestrator::Orchestrator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections");
}

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Response cache and adapter registry.
/// - HTTP routes and middleware (CORS, Rate Limiting, Timeouts).
///
/// It then starts the Axum server and runs until a shutdown signal arrives.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "addressiq_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let build_info = BuildInfo::from_env();
    tracing::info!(
        "Build {} ({}), frontend {} ({})",
        build_info.backend.commit,
        build_info.backend.date,
        build_info.frontend.commit,
        build_info.frontend.date
    );

    // Response cache with per-entry TTL
    let cache = ResponseCache::in_memory(config.cache_max_entries);
    tracing::info!(
        "Response cache initialized ({} max entries)",
        config.cache_max_entries
    );

    let registry = AdapterRegistry::from_config(&config);
    let orchestrator = Orchestrator::new(&config, registry, cache.clone())
        .map_err(|e| anyhow::anyhow!("Failed to initialize orchestrator: {}", e))?;

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        orchestrator,
        cache,
        build_info,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Build protected routes with security layers
    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max form payload
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            // Rate limiting: 10 req/sec per IP, burst of 20
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health, descriptor and build info bypass rate limiting
    let app = handlers::public_routes()
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
