//! Chat relay - WhatsApp webhook in, model-generated reply out
//!
//! Receives inbound chat messages, asks a completion model for a reply,
//! sends the reply back through the messaging provider and keeps a
//! two-way log of every conversation in SQLite.

mod api;
mod config;
mod db;
mod llm;
mod messaging;
mod relay;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use llm::{CompletionProvider, LoggingCompletion, OpenAIService};
use messaging::{MessagingProvider, TwilioWhatsApp};
use relay::{Relay, RelaySettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    tracing::info!(messages = db.count()?, "Database ready");

    let openai = Arc::new(OpenAIService::new(
        &config.completion,
        config.upstream_timeout,
    )?);
    let completion: Arc<dyn CompletionProvider> = Arc::new(LoggingCompletion::new(openai));
    let messaging: Arc<dyn MessagingProvider> = Arc::new(TwilioWhatsApp::new(
        &config.messaging,
        config.upstream_timeout,
    )?);

    tracing::info!(
        model = %completion.model_id(),
        service_number = %config.messaging.whatsapp_number,
        history_depth = config.history_depth,
        "Relay initialized"
    );

    let relay = Relay::new(
        RelaySettings::from(&config),
        Arc::new(db),
        completion,
        messaging,
    );
    let state = AppState::new(Arc::new(relay), &config.service_name);

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("{} listening on {}", config.service_name, addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
