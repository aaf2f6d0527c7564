//! stakeflow-indexer entry point.
//!
//! Starts one indexing engine per configured chain and, unless disabled,
//! the Axum read API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stakeflow_indexer::api;
use stakeflow_indexer::app_state::{AppState, ChainDirectory, ChainHandle};
use stakeflow_indexer::chain::{ChainClient, EvmChainClient};
use stakeflow_indexer::config::IndexerConfig;
use stakeflow_indexer::indexer::{EngineSettings, IndexerEngine};
use stakeflow_indexer::persistence::{LedgerReader, LedgerStore, MemoryLedger, PostgresLedger};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = IndexerConfig::from_env().context("loading configuration")?;
    tracing::info!(
        chains = config.chains.len(),
        api = config.api_enabled,
        "starting stakeflow-indexer"
    );

    let (store, reader) = match &config.database {
        Some(database) => ledger_handles(
            PostgresLedger::connect(database)
                .await
                .context("connecting to PostgreSQL")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger");
            ledger_handles(MemoryLedger::new())
        }
    };

    let root = CancellationToken::new();
    let mut engines = JoinSet::new();
    let mut chains = ChainDirectory::new();
    for chain_config in &config.chains {
        let client: Arc<dyn ChainClient> = Arc::new(
            EvmChainClient::connect(chain_config)
                .await
                .with_context(|| format!("connecting to {}", chain_config.name))?,
        );
        let engine = IndexerEngine::new(
            Arc::clone(&client),
            Arc::clone(&store),
            EngineSettings::new(chain_config, &config),
            root.child_token(),
        );
        chains.insert(
            chain_config.name.clone(),
            ChainHandle {
                chain_id: chain_config.chain_id,
                client,
                status: engine.subscribe(),
            },
        );
        engines.spawn(engine.run());
    }

    if config.api_enabled {
        if config.chain(&config.default_chain).is_none() {
            tracing::warn!(
                chain = %config.default_chain,
                "DEFAULT_CHAIN is not configured, requests without ?chain= will get 404"
            );
        }
        let app_state = AppState {
            ledger: reader,
            chains,
            default_chain: config.default_chain.clone(),
        };
        let app = api::build_router()
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                    .layer(CorsLayer::permissive()),
            )
            .with_state(app_state);

        let listener = tokio::net::TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("binding {}", config.listen_addr))?;
        tracing::info!(addr = %config.listen_addr, "server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("serving API")?;
    } else {
        shutdown_signal().await;
    }

    tracing::info!("shutting down indexers");
    root.cancel();
    while let Some(joined) = engines.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "indexer task failed");
        }
    }
    tracing::info!("stopped");
    Ok(())
}

/// Plain text by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn ledger_handles<L>(ledger: L) -> (Arc<dyn LedgerStore>, Arc<dyn LedgerReader>)
where
    L: LedgerStore + LedgerReader + 'static,
{
    let ledger = Arc::new(ledger);
    (Arc::clone(&ledger) as _, ledger)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
