mod api;
mod speech;
mod stream;

use anyhow::Context;
use api::AppState;
use bonsai_core::config::BonsaiConfig;
use bonsai_core::control::StateMachineController;
use bonsai_core::core::SkillRegistry;
use bonsai_core::memory::WorkingMemory;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bonsai_core=info,bonsai_daemon=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => BonsaiConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration '{}'", path))?,
        None => BonsaiConfig::load().context("Failed to load configuration")?,
    };

    let (objects, mut speech_log) =
        speech::core_objects().context("Failed to start speech log")?;
    let controller = Arc::new(
        StateMachineController::from_config(
            &config,
            SkillRegistry::with_builtins(),
            objects,
            WorkingMemory::new(),
        )
        .context("Failed to create controller")?,
    );

    let app = api::router(AppState {
        controller: Arc::clone(&controller),
    })
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let addr = config.daemon.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("BONSAI daemon listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = controller.unload() {
        tracing::warn!("Failed to stop behavior: {}", e);
    }
    let said = speech_log.shutdown();
    tracing::debug!("Speech log stopped after {} utterances", said);
    Ok(())
}
