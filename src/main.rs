use std::panic;
use std::sync::Arc;

use docsync_gateway::config::Config;
use docsync_gateway::db::{FileStorage, MemStorage, Storage};
use docsync_gateway::routes::{create_app, MountTable};
use docsync_gateway::ws::OriginPolicy;
use docsync_gateway::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "docsync_gateway=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Anything wrong with the configuration is fatal: do not start serving
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let landing = match config.validate() {
        Ok(landing) => landing,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let (session_prefix, static_mounts) = match (config.session_prefix(), config.static_mounts()) {
        (Ok(prefix), Ok(mounts)) => (prefix, mounts),
        (Err(e), _) | (_, Err(e)) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Storage backend, shared by every session
    let storage: Arc<dyn Storage> = match &config.storage_dir {
        Some(dir) => match FileStorage::open(dir) {
            Ok(storage) => Arc::new(storage),
            Err(e) => {
                error!("Failed to open storage at {}: {}", dir, e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No storage directory configured - operations are kept in memory only");
            Arc::new(MemStorage::new())
        }
    };

    let origin_policy = OriginPolicy::from_config(config.cors_origins.as_deref());
    if matches!(origin_policy, OriginPolicy::AllowAll) && !config.is_development() {
        warn!("All origins are allowed; set CORS_ORIGINS to restrict upgrades");
    }

    for mount in &static_mounts {
        info!("📁 Serving {} from {}", mount.prefix, mount.root.display());
    }
    info!("🔗 Sessions mounted at {}<document-id>", session_prefix);

    let state = Arc::new(AppState::new(
        storage,
        MountTable::new(session_prefix, static_mounts),
        landing,
        origin_policy,
        config.session_settings(),
    ));
    let registry = state.registry.clone();
    let app_routes = create_app(state);

    // Start the HTTP/WebSocket server
    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    let result = axum::serve(listener, app_routes)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown requested");
            registry.shutdown();
        })
        .await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
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
}
