//! eris-server binary.
//!
//! Reads `eris.toml` (or the path given with `--config`), takes API keys from
//! the environment (`.env` is honoured), opens the SQLite store and serves
//! the debate API over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use eris_core::config::{Config, Secrets};
use eris_core::feedback::OpenAiJudge;
use eris_core::search::{OpenAiVectorStore, SearchService};
use eris_core::speech::OpenAiSpeechGenerator;
use eris_core::voice::{ElevenLabsClient, VoiceService};
use eris_server::{AppState, Services, debates::spawn_phase_clock, router};
use eris_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Eris debate practice server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "eris.toml")]
    config: PathBuf,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

fn build_services(config: &Config, secrets: &Secrets) -> anyhow::Result<Services> {
    let api_base = secrets
        .openai_api_base
        .as_deref()
        .unwrap_or(&config.openai.api_base);
    let timeout = Duration::from_secs(config.openai.request_timeout_secs);
    let retry = config.retry.policy();

    let generator = OpenAiSpeechGenerator::new(api_base, &secrets.openai_api_key, timeout, retry)
        .context("failed to build speech generator")?;
    let judge = OpenAiJudge::new(
        api_base,
        &secrets.openai_api_key,
        &config.openai.feedback_model,
        timeout,
        retry,
    )
    .context("failed to build judge")?;

    let voice: Option<Arc<dyn VoiceService>> = match &secrets.elevenlabs_api_key {
        Some(key) => Some(Arc::new(
            ElevenLabsClient::new(key, config.elevenlabs.clone(), retry)
                .context("failed to build ElevenLabs client")?,
        )),
        None => {
            tracing::warn!("ELEVENLABS_API_KEY not set; voice endpoints are disabled");
            None
        }
    };

    let mut search = SearchService::new(config.search.clone());
    if let Some(id) = &config.openai.vector_store_id {
        let vector = OpenAiVectorStore::new(api_base, &secrets.openai_api_key, id, timeout, retry)
            .context("failed to build vector store client")?;
        search = search.with_vector_store(Arc::new(vector));
        tracing::info!(vector_store_id = %id, "evidence search uses the hosted vector store");
    }

    Ok(Services {
        generator: Arc::new(generator),
        judge: Arc::new(judge),
        voice,
        search,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let secrets = Secrets::from_env();
    let services = build_services(&config, &secrets)?;

    let store = SqliteStore::open(&config.server.database_path)
        .await
        .with_context(|| {
            format!(
                "failed to open store at {}",
                config.server.database_path.display()
            )
        })?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(store, config, services);
    let _clock = spawn_phase_clock(state.clone());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("eris-server listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;

    Ok(())
}
