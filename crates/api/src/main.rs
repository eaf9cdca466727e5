use std::sync::Arc;

use anyhow::Context;
use callroom_api::{build_router, state::AppState};
use callroom_config::Settings;
use callroom_services::{CallStore, MemoryCallStore, MongoCallStore};
use callroom_transcription::EngineChain;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Call-room coordination and live transcription relay.
#[derive(Parser, Debug)]
#[command(name = "callroom-api")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file, without extension (defaults to `config/default`)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    if settings.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let store: Arc<dyn CallStore> = match callroom_db::connect(&settings.database).await? {
        Some(db) => {
            callroom_db::indexes::ensure_indexes(&db).await?;
            Arc::new(MongoCallStore::new(&db))
        }
        None => {
            warn!("No database URL configured, using the in-memory store");
            Arc::new(MemoryCallStore::new())
        }
    };

    let engines = EngineChain::from_settings(&settings.transcription);
    if engines.is_empty() {
        warn!("No transcription engines configured, audio chunks will only be acknowledged");
    }

    let addr = settings.bind_addr();
    let state = AppState::new(settings, store, engines);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "callroom-api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
