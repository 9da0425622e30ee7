use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use promptpix::server::{create_app, AppState};
use promptpix::{Config, ImageBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptpix=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; chat and Gemini image requests will fail");
    }
    info!(
        backend = %config.image_backend,
        image_model = %config.image_model,
        chat_model = %config.chat_model,
        "Configuration loaded"
    );
    if config.image_backend == ImageBackend::Mock {
        info!("Image backend is mock: prompts are ignored");
    }

    let state = AppState::from_config(&config)?;
    state.generator.store().ensure_root().await.map_err(|e| {
        error!(
            "Failed to create public directory {}: {}",
            config.public_dir.display(),
            e
        );
        anyhow::anyhow!("Public directory unavailable: {}", e)
    })?;

    let app = create_app(state, &config.public_dir).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .into_inner(),
    );

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Health check available at http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
