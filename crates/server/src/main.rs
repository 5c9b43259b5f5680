//! Voice Dialogue Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_dialogue_config::{load_settings, Settings};
use voice_dialogue_llm::{ConversationCache, ConversationalGenerator, OpenAIBackend, OpenAIConfig};
use voice_dialogue_pipeline::{Orchestrator, RemoteRecognizer, RemoteSynthesizer};
use voice_dialogue_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var("VOICE_DIALOGUE_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized
            eprintln!("Loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        },
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&config);

    tracing::info!("Starting Voice Dialogue Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let orchestrator = Arc::new(build_orchestrator(&config)?);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let metrics_enabled = config.observability.metrics_enabled;

    let mut state = AppState::new(config, orchestrator);
    if metrics_enabled {
        match init_metrics() {
            Ok(handle) => {
                state = state.with_metrics(handle);
                tracing::info!("Initialized Prometheus metrics at /metrics");
            },
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Construct collaborators and inject them into the orchestrator
fn build_orchestrator(config: &Settings) -> anyhow::Result<Orchestrator> {
    let recognizer = Arc::new(RemoteRecognizer::new((&config.stt).into())?);
    let synthesizer = Arc::new(RemoteSynthesizer::new((&config.tts).into())?);

    let backend = Arc::new(OpenAIBackend::new(OpenAIConfig::from(&config.llm))?);
    let cache = Arc::new(ConversationCache::from_config(&config.conversation));
    let generator = Arc::new(ConversationalGenerator::new(backend, cache, &config.llm));

    Ok(Orchestrator::new(
        recognizer,
        generator,
        synthesizer,
        config.orchestrator.clone(),
    ))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voice_dialogue={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
