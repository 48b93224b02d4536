use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use nutri_rag::cli::{parse_args, Command};
use nutri_rag::config::Settings;
use nutri_rag::engine::{QueryPool, RetrievalEngine};
use nutri_rag::error::IndexLoadError;
use nutri_rag::index::IndexBuilder;
use nutri_rag::ingest::load_sources;
use nutri_rag::interactive::run_session;
use nutri_rag::providers::{Embedder, Generator, OllamaEmbedder, OllamaGenerator};
use nutri_rag::server::{start_server, AppState};
use nutri_rag::store::{IndexStore, LoadTier, Representation};

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the best persisted tier and wires it to the providers.
async fn load_engine(
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> Result<(RetrievalEngine, LoadTier), IndexLoadError> {
    let store = IndexStore::new(settings.store_paths());
    let outcome = store.load(embedder.as_ref()).await?;
    let engine =
        RetrievalEngine::new(outcome.artifact, embedder, generator).with_top_k(settings.top_k);
    Ok((engine, outcome.tier))
}

fn providers(settings: &Settings) -> Result<(Arc<dyn Embedder>, Arc<dyn Generator>)> {
    let ollama = settings.ollama_config();
    let embedder =
        OllamaEmbedder::new(ollama.clone()).context("Failed to create the embedding client")?;
    let generator = OllamaGenerator::new(ollama).context("Failed to create the generation client")?;
    Ok((Arc::new(embedder), Arc::new(generator)))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = parse_args();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load configuration from '{}'", path.display()))?,
        None => Settings::load().context("Failed to load configuration")?,
    };
    init_tracing(&settings);

    match cli.command {
        Command::Build { sources, tiers } => {
            let sources = if sources.is_empty() { settings.sources.clone() } else { sources };
            let documents = load_sources(&sources).context("Failed to read any CSV source")?;

            let (embedder, _) = providers(&settings)?;
            let artifact = IndexBuilder::new(embedder.as_ref())
                .build(documents)
                .await
                .context("Failed to build the index")?;

            let representations: Vec<Representation> = tiers.into_iter().map(Into::into).collect();
            IndexStore::new(settings.store_paths())
                .persist(&artifact, &representations)
                .context("Failed to persist the index")?;
            tracing::info!(
                documents = artifact.len(),
                dimension = artifact.dimension(),
                "build complete"
            );
        }
        Command::Ask { no_stream } => {
            let (embedder, generator) = providers(&settings)?;
            let (engine, tier) = load_engine(&settings, embedder, generator)
                .await
                .context("No index could be loaded; run `nutri_rag build` first")?;
            tracing::info!(%tier, documents = engine.document_count(), "index ready");

            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            run_session(&engine, stdin, &mut stdout, settings.streaming && !no_stream)
                .await
                .context("Console session failed")?;
        }
        Command::Serve { port } => {
            let mut settings = settings;
            if let Some(port) = port {
                settings.port = port;
            }
            let addr = settings.socket_addr()?;
            let pool = QueryPool::new(settings.max_concurrent_queries, settings.request_timeout());

            let (embedder, generator) = providers(&settings)?;
            let state = match load_engine(&settings, embedder, generator).await {
                Ok((engine, tier)) => AppState::loaded(engine, tier, pool),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "serving without an index; chat requests will fail"
                    );
                    AppState::unloaded(pool)
                }
            };
            start_server(addr, state).await?;
        }
    }

    Ok(())
}
